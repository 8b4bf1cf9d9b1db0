use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use log::{LevelFilter, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use video_downloader::config::Config;
use video_downloader::report::{self, LogReporter, Reporter};
use video_downloader::urls::normalize_urls;
use video_downloader::{DownloadOptions, Downloader, default_output_dir, installer, validate};
use ytdlp_driver::YtDlp;
use ytdlp_driver::fetcher::deps;
use ytdlp_driver::model::Progress;

const BAR_LENGTH: u64 = 1000;

#[derive(Parser, Clone)]
#[command(name = "video-downloader", version, about = "Download YouTube and Instagram videos with yt-dlp")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// The URLs to download, one per argument.
    pub urls: Vec<String>,

    /// A file holding more URLs, one per line.
    #[arg(long = "input", short)]
    pub input: Option<PathBuf>,

    #[arg(long = "output-dir", short)]
    pub output_dir: Option<PathBuf>,

    /// A Netscape cookies.txt export.
    #[arg(long = "cookies")]
    pub cookies: Option<PathBuf>,

    #[arg(
        long = "merge-format",
        value_parser = clap::builder::PossibleValuesParser::new(["mp4", "mkv", "webm"])
    )]
    pub merge_format: Option<String>,

    /// A browser whose cookies are tried when Instagram refuses a download. Repeat for more.
    #[arg(long = "browser")]
    pub browsers: Vec<String>,

    #[arg(long = "no-browser-fallback", action = clap::ArgAction::SetTrue)]
    pub no_browser_fallback: bool,

    #[arg(long = "tools-dir", global = true)]
    pub tools_dir: Option<PathBuf>,

    #[arg(
        long = "verbosity",
        short,
        global = true,
        default_value = "info",
        value_parser = clap::builder::PossibleValuesParser::new([
            "info", "debug", "error", "none", "full"
        ])
    )]
    pub verbosity: String,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Manage yt-dlp and ffmpeg.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ToolsAction {
    /// Download yt-dlp again and ffmpeg when it is missing.
    Install,
    /// Let yt-dlp update itself.
    Update,
    /// Print where the tools live.
    Path,
}

/// Shows the download of the current URL as a progress bar.
struct CliReporter {
    bar: ProgressBar,
    current: Mutex<String>,
}

impl CliReporter {
    fn new(multi: &MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new(BAR_LENGTH));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {percent:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(120));

        Self {
            bar,
            current: Mutex::new(String::new()),
        }
    }
}

impl Reporter for CliReporter {
    fn log(&self, message: &str) {
        info!("{}", message);
    }

    fn progress(&self, url: &str, progress: &Progress) {
        if let Ok(mut current) = self.current.lock() {
            if current.as_str() != url {
                *current = url.to_string();
                self.bar.reset();
            }
        }

        match progress.status.as_str() {
            "finished" => self.bar.set_position(BAR_LENGTH),
            "downloading" => {
                if let Some(fraction) = progress.fraction() {
                    self.bar.set_position((fraction * BAR_LENGTH as f64) as u64);
                }
            }
            _ => {}
        }
        self.bar.set_message(report::status_line(url, progress));
    }

    fn finished(&self, _url: &str, path: &Path) {
        self.bar.set_position(BAR_LENGTH);
        self.bar
            .set_message(format!("Processing: {}", report::file_name(path)));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Cli::parse();
    let multi = MultiProgress::new();
    init_logging(&multi, &args.verbosity)?;

    let config = Config::load();
    let tools_dir = args.tools_dir.clone().or_else(|| config.tools_dir.clone());

    if let Some(Command::Tools { action }) = args.command {
        return tools(action, tools_dir).await;
    }

    let mut text = args.urls.join("\n");
    if let Some(input) = &args.input {
        text.push('\n');
        text.push_str(&fs::read_to_string(input)?);
    }
    let urls = normalize_urls(&text);

    let options = DownloadOptions {
        output_dir: args
            .output_dir
            .or(config.output_dir)
            .unwrap_or_else(default_output_dir),
        cookies: args.cookies.or(config.cookies),
        merge_output_format: args.merge_format.or(config.merge_output_format),
        browsers: if args.browsers.is_empty() {
            config.browsers.unwrap_or_default()
        } else {
            args.browsers
        },
        browser_fallback: !args.no_browser_fallback && config.browser_fallback.unwrap_or(true),
        tools_dir,
    };

    if let Err(e) = validate(&urls, &options) {
        error!("{}", e);
        std::process::exit(2);
    }

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancel requested...");
            token.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let reporter = Arc::new(CliReporter::new(&multi));
    let mut downloader = Downloader::new(options, reporter.clone())?;

    let started = Instant::now();
    let result = downloader.download_many(&urls, &cancel).await;
    reporter.bar.finish_and_clear();

    match result {
        Ok(()) => {
            info!("Done in {:.1}s.", started.elapsed().as_secs_f64());
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            warn!("Cancelled.");
            std::process::exit(130);
        }
        Err(e) => {
            error!("Download failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_logging(
    multi: &MultiProgress,
    verbosity: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = match verbosity {
        "debug" => LevelFilter::Debug,
        "error" => LevelFilter::Error,
        "none" => LevelFilter::Off,
        "full" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let logger = env_logger::Builder::new()
        .filter_level(level.min(LevelFilter::Warn))
        .filter_module("video_downloader", level)
        .filter_module("ytdlp_driver", level)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .build();

    LogWrapper::new(multi.clone(), logger).try_init()?;
    log::set_max_level(level);

    Ok(())
}

async fn tools(
    action: ToolsAction,
    tools_dir: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let installer = installer(tools_dir.as_deref(), Arc::new(LogReporter))?;

    match action {
        ToolsAction::Install => {
            std::fs::create_dir_all(&installer.destination)?;
            let ytdlp = installer.install_ytdlp().await?;
            info!("yt-dlp: {}", ytdlp.display());

            match installer.ensure_ffmpeg().await? {
                Some(ffmpeg) => info!("ffmpeg: {}", ffmpeg.display()),
                None => warn!("ffmpeg: not installed"),
            }
        }
        ToolsAction::Update => {
            let ytdlp = YtDlp::new(installer.ensure_tools().await?);
            info!("{}", ytdlp.update().await?);
            info!("yt-dlp version {}", ytdlp.version().await?);
        }
        ToolsAction::Path => {
            println!("tools: {}", installer.destination.display());
            println!("yt-dlp: {}", installer.ytdlp_path()?.display());

            let ffmpeg = deps::ffmpeg_on_path().or_else(|| deps::local_ffmpeg(&installer.destination));
            match ffmpeg {
                Some(dir) => println!("ffmpeg: {}", dir.display()),
                None => println!("ffmpeg: not installed"),
            }
            if let Some(config) = Config::path() {
                println!("config: {}", config.display());
            }
        }
    }

    Ok(())
}
