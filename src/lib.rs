//! Downloads YouTube and Instagram videos with yt-dlp.
//!
//! The tools are installed on first use. Instagram URLs that fail anonymously are retried with the cookies of the
//! local browsers, see [`ladder`].

use {
    crate::error::{DownloadError, Result},
    crate::ladder::climb,
    crate::report::Reporter,
    crate::urls::Site,
    std::path::{Path, PathBuf},
    std::sync::Arc,
    tokio_util::sync::CancellationToken,
    ytdlp_driver::fetcher::deps::{LibraryInstaller, ToolPaths},
    ytdlp_driver::model::{DownloadArgs, Event},
    ytdlp_driver::YtDlp,
};

pub mod config;
pub mod error;
pub mod ladder;
pub mod report;
pub mod urls;

/// What a download needs besides the URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    pub output_dir: PathBuf,
    /// A Netscape `cookies.txt` export used by the direct attempt.
    pub cookies: Option<PathBuf>,
    /// The container of merged downloads, `mp4` when unset.
    pub merge_output_format: Option<String>,
    /// The browsers tried for Instagram, the defaults when empty.
    pub browsers: Vec<String>,
    pub browser_fallback: bool,
    /// The tools root, the per-user default when unset.
    pub tools_dir: Option<PathBuf>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            cookies: None,
            merge_output_format: None,
            browsers: Vec::new(),
            browser_fallback: true,
            tools_dir: None,
        }
    }
}

/// `~/Downloads`, not the localized desktop download folder.
pub fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

/// Checks a batch before anything is started.
pub fn validate(urls: &[String], options: &DownloadOptions) -> Result<()> {
    if urls.iter().all(|url| url.trim().is_empty()) {
        return Err(DownloadError::Validation(
            "Paste a YouTube/Instagram URL first.".to_string(),
        ));
    }

    if options.output_dir.as_os_str().is_empty() {
        return Err(DownloadError::Validation(
            "Choose an output folder.".to_string(),
        ));
    }

    if let Some(cookies) = &options.cookies {
        if !cookies.is_file() {
            return Err(DownloadError::Validation(
                "cookies.txt path does not exist.".to_string(),
            ));
        }
    }

    Ok(())
}

/// Creates the installer of the tools root, reporting its messages to `reporter`.
pub fn installer(tools_dir: Option<&Path>, reporter: Arc<dyn Reporter>) -> Result<LibraryInstaller> {
    let installer = match tools_dir {
        Some(dir) => LibraryInstaller::new(dir.to_path_buf()),
        None => LibraryInstaller::with_default_root()?,
    };

    Ok(installer.with_notifier(move |message| reporter.log(message)))
}

/// Runs downloads one URL at a time.
pub struct Downloader {
    installer: LibraryInstaller,
    ytdlp: Option<YtDlp>,
    options: DownloadOptions,
    reporter: Arc<dyn Reporter>,
}

impl Downloader {
    pub fn new(options: DownloadOptions, reporter: Arc<dyn Reporter>) -> Result<Self> {
        let installer = installer(options.tools_dir.as_deref(), reporter.clone())?;

        Ok(Self {
            installer,
            ytdlp: None,
            options,
            reporter,
        })
    }

    /// Uses already installed tools instead of ensuring them.
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.ytdlp = Some(YtDlp::new(tools));
        self
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Installs the missing tools. Only the first call does any work.
    pub async fn prepare(&mut self) -> Result<&YtDlp> {
        if self.ytdlp.is_none() {
            let tools = self.installer.ensure_tools().await?;
            log::debug!("Using tools {:?}", tools);
            self.ytdlp = Some(YtDlp::new(tools));
        }

        self.ytdlp
            .as_ref()
            .ok_or_else(|| DownloadError::Validation("The tools are not installed.".to_string()))
    }

    /// Installs the missing tools unless `cancel` fires first.
    async fn prepare_until_cancelled(&mut self, cancel: &CancellationToken) -> Result<YtDlp> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            ytdlp = self.prepare() => ytdlp.cloned(),
        }
    }

    /// Downloads a single URL, climbing the retry ladder when needed.
    pub async fn download(&mut self, url: &str, cancel: &CancellationToken) -> Result<()> {
        let url = url.trim();
        validate(&[url.to_string()], &self.options)?;

        let ytdlp = self.prepare_until_cancelled(cancel).await?;
        std::fs::create_dir_all(&self.options.output_dir)?;

        let reporter = self.reporter.clone();
        reporter.log(&format!("Starting: {}", url));

        let site = Site::classify(url);
        let rungs = ladder::plan(
            site,
            self.options.cookies.as_deref(),
            &self.options.browsers,
            self.options.browser_fallback,
        );
        log::debug!("{} URL, {} attempt(s) planned", site, rungs.len());

        let base = DownloadArgs::new(url, &self.options.output_dir)
            .with_merge_output_format(self.options.merge_output_format.clone());

        climb(url, rungs, reporter.as_ref(), |rung| {
            let args = rung.apply(base.clone());
            let ytdlp = ytdlp.clone();
            let reporter = reporter.clone();
            let cancel = cancel.clone();
            let url = url.to_string();

            async move {
                ytdlp
                    .download(args, &cancel, |event| match event {
                        Event::Progress(progress) => reporter.progress(&url, &progress),
                        Event::Saved(path) => {
                            reporter.finished(&url, &path);
                            reporter.log(&format!("Saved: {}", path.display()));
                        }
                        Event::Log(line) => reporter.log(&line),
                    })
                    .await
            }
        })
        .await?;

        reporter.log("Done.");
        Ok(())
    }

    /// Downloads the URLs in order. The first failure stops the batch.
    pub async fn download_many(&mut self, urls: &[String], cancel: &CancellationToken) -> Result<()> {
        validate(urls, &self.options)?;
        self.prepare_until_cancelled(cancel).await?;

        for url in urls.iter().filter(|url| !url.trim().is_empty()) {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            self.download(url, cancel).await?;
        }

        Ok(())
    }
}

/// Downloads a single URL with freshly ensured tools.
pub async fn download(
    url: &str,
    options: DownloadOptions,
    reporter: Arc<dyn Reporter>,
    cancel: &CancellationToken,
) -> Result<()> {
    Downloader::new(options, reporter)?.download(url, cancel).await
}

/// Downloads the URLs in order with freshly ensured tools.
pub async fn download_many(
    urls: &[String],
    options: DownloadOptions,
    reporter: Arc<dyn Reporter>,
    cancel: &CancellationToken,
) -> Result<()> {
    Downloader::new(options, reporter)?
        .download_many(urls, cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(output_dir: &Path) -> DownloadOptions {
        DownloadOptions {
            output_dir: output_dir.to_path_buf(),
            ..DownloadOptions::default()
        }
    }

    #[test]
    fn validation_messages() {
        let temp = tempfile::tempdir().unwrap();
        let urls = vec!["https://youtu.be/a".to_string()];

        let err = validate(&[], &options(temp.path())).unwrap_err();
        assert_eq!(err.to_string(), "Paste a YouTube/Instagram URL first.");

        let err = validate(&urls, &options(Path::new(""))).unwrap_err();
        assert_eq!(err.to_string(), "Choose an output folder.");

        let missing = DownloadOptions {
            cookies: Some(temp.path().join("cookies.txt")),
            ..options(temp.path())
        };
        let err = validate(&urls, &missing).unwrap_err();
        assert_eq!(err.to_string(), "cookies.txt path does not exist.");

        std::fs::write(temp.path().join("cookies.txt"), "# Netscape HTTP Cookie File").unwrap();
        assert!(validate(&urls, &missing).is_ok());
    }

    #[tokio::test]
    async fn cancelled_batch_installs_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let tools_dir = temp.path().join("tools");
        let options = DownloadOptions {
            tools_dir: Some(tools_dir.clone()),
            ..options(temp.path())
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut downloader = Downloader::new(options, Arc::new(report::LogReporter)).unwrap();
        let err = downloader
            .download_many(&["https://youtu.be/a".to_string()], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled), "{err:?}");

        let err = downloader.download("https://youtu.be/a", &cancel).await.unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled), "{err:?}");

        assert!(!tools_dir.exists());
    }

    #[test]
    fn defaults() {
        let options = DownloadOptions::default();

        assert!(options.browser_fallback);
        assert!(options.browsers.is_empty());
        assert!(options.output_dir.ends_with("Downloads"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(options.output_dir, home.join("Downloads"));
        }
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use std::sync::Mutex;
    use ytdlp_driver::model::Progress;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<String>>,
        finished: Mutex<Vec<PathBuf>>,
    }

    impl Reporter for Recorder {
        fn log(&self, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }

        fn progress(&self, _url: &str, _progress: &Progress) {}

        fn finished(&self, _url: &str, path: &Path) {
            self.finished.lock().unwrap().push(path.to_path_buf());
        }
    }

    /// A yt-dlp stand-in logging its last argument, succeeding only with firefox cookies or a YouTube URL.
    fn fake_ytdlp(dir: &Path) -> PathBuf {
        let path = dir.join("yt-dlp");
        let script = format!(
            r#"#!/bin/sh
ok=0
for arg in "$@"; do
  last="$arg"
  if [ "$arg" = "firefox" ]; then ok=1; fi
done
echo "$last" >> "{calls}"
case "$last" in
  *youtu*) ok=1 ;;
esac
if [ $ok -eq 1 ]; then
  echo "__VD_FILE__:/out/clip.mp4"
  exit 0
fi
echo "ERROR: login required"
exit 1
"#,
            calls = dir.join("calls.txt").display()
        );
        std::fs::write(&path, script).unwrap();
        ytdlp_driver::utils::file_system::set_executable(&path).unwrap();
        path
    }

    fn downloader(dir: &Path, reporter: Arc<Recorder>) -> Downloader {
        let options = DownloadOptions {
            output_dir: dir.join("out"),
            browsers: vec!["chrome".to_string(), "firefox".to_string()],
            tools_dir: Some(dir.join("tools")),
            ..DownloadOptions::default()
        };

        Downloader::new(options, reporter)
            .unwrap()
            .with_tools(ToolPaths::new(fake_ytdlp(dir), None))
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.txt"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn instagram_climbs_to_the_working_browser() {
        let temp = tempfile::tempdir().unwrap();
        let reporter = Arc::new(Recorder::default());
        let url = "https://www.instagram.com/reel/abc/";

        downloader(temp.path(), reporter.clone())
            .download(url, &CancellationToken::new())
            .await
            .unwrap();

        assert!(temp.path().join("out").is_dir());
        assert_eq!(calls(temp.path()).len(), 3);
        assert_eq!(
            *reporter.lines.lock().unwrap(),
            vec![
                format!("Starting: {}", url),
                "ERROR: login required".to_string(),
                "Attempt failed (direct): ERROR: login required".to_string(),
                "Retrying with cookies from chrome...".to_string(),
                "ERROR: login required".to_string(),
                "Attempt failed (cookies from chrome): ERROR: login required".to_string(),
                "Retrying with cookies from firefox...".to_string(),
                "Saved: /out/clip.mp4".to_string(),
                "Done.".to_string(),
            ]
        );
        assert_eq!(
            *reporter.finished.lock().unwrap(),
            vec![PathBuf::from("/out/clip.mp4")]
        );
    }

    #[tokio::test]
    async fn first_failure_stops_the_batch() {
        let temp = tempfile::tempdir().unwrap();
        let reporter = Arc::new(Recorder::default());
        let mut downloader = downloader(temp.path(), reporter);
        downloader.options.browser_fallback = false;

        let urls = vec![
            "https://youtu.be/a".to_string(),
            "https://www.instagram.com/p/b/".to_string(),
            "https://youtu.be/c".to_string(),
        ];
        let err = downloader
            .download_many(&urls, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Driver(_)));
        assert_eq!(err.to_string(), "ERROR: login required");
        assert_eq!(calls(temp.path()), vec![urls[0].clone(), urls[1].clone()]);
    }

    #[tokio::test]
    async fn cancelled_batch_starts_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = downloader(temp.path(), Arc::new(Recorder::default()))
            .download_many(&["https://youtu.be/a".to_string()], &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(calls(temp.path()).is_empty());
    }
}
