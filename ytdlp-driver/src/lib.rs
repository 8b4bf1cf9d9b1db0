//! Installs and drives the `yt-dlp` and `ffmpeg` executables.
//!
//! The [`fetcher::deps::LibraryInstaller`] downloads the official binaries on first use, and [`YtDlp`] runs downloads
//! while turning the process output into [`model::Event`]s.

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::fetcher::deps::ToolPaths;
use crate::model::{DownloadArgs, Event, OutputLine};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod error;
pub mod executor;
pub mod fetcher;
pub mod model;
pub mod utils;

/// How many of the last output lines are kept to explain a failure.
pub const RECENT_LINES: usize = 20;

/// A runner of the yt-dlp executable.
///
/// # Examples
///
/// ```rust, no_run
/// # use ytdlp_driver::YtDlp;
/// # use ytdlp_driver::fetcher::deps::LibraryInstaller;
/// # use ytdlp_driver::model::{DownloadArgs, Event};
/// # use tokio_util::sync::CancellationToken;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tools = LibraryInstaller::with_default_root()?.ensure_tools().await?;
/// let ytdlp = YtDlp::new(tools);
///
/// let args = DownloadArgs::new("https://www.youtube.com/watch?v=dQw4w9WgXcQ", "downloads");
/// ytdlp
///     .download(args, &CancellationToken::new(), |event| {
///         if let Event::Saved(path) = event {
///             println!("Saved: {}", path.display());
///         }
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct YtDlp {
    /// The installed tools.
    pub tools: ToolPaths,
    /// The timeout of short commands such as `--version`.
    pub timeout: Duration,
}

impl fmt::Display for YtDlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "YtDlp: executable={:?}, ffmpeg={:?}",
            self.tools.ytdlp, self.tools.ffmpeg_location
        )
    }
}

impl YtDlp {
    /// Creates a runner for the given tools.
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            tools,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the timeout of short commands.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn executor(&self, args: Vec<String>) -> Executor {
        Executor {
            executable_path: self.tools.ytdlp.clone(),
            timeout: self.timeout,
            args,
        }
    }

    /// Returns the version printed by yt-dlp.
    pub async fn version(&self) -> Result<String> {
        let output = self
            .executor(utils::to_owned(vec!["--version"]))
            .execute()
            .await?;

        Ok(output.stdout.trim().to_string())
    }

    /// Updates the yt-dlp executable in place.
    /// Be careful, this function may take a while to execute.
    pub async fn update(&self) -> Result<String> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Updating the downloader");

        let output = self
            .executor(utils::to_owned(vec!["--update"]))
            .execute()
            .await?;

        Ok(output.stdout.trim().to_string())
    }

    /// Runs a download and reports what yt-dlp prints through `on_event`.
    ///
    /// The ffmpeg location of the tools is added to the arguments.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] when `cancel` fired, [`Error::Process`] carrying the last output lines when yt-dlp failed.
    pub async fn download<F>(
        &self,
        args: DownloadArgs,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<()>
    where
        F: FnMut(Event),
    {
        let args = args.with_ffmpeg_location(self.tools.ffmpeg_location.clone());
        let mut recent = VecDeque::with_capacity(RECENT_LINES);

        let code = self
            .executor(args.to_args())
            .stream(cancel, |line| match OutputLine::parse(&line) {
                OutputLine::Progress(Some(progress)) => on_event(Event::Progress(progress)),
                OutputLine::Progress(None) | OutputLine::Blank => {}
                OutputLine::File(path) => on_event(Event::Saved(path)),
                OutputLine::Message(message) => {
                    if recent.len() == RECENT_LINES {
                        recent.pop_front();
                    }
                    recent.push_back(message.clone());
                    on_event(Event::Log(message));
                }
            })
            .await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if code != 0 {
            return Err(Error::Process {
                code,
                details: failure_details(&recent, code),
            });
        }

        Ok(())
    }

    /// The path of the yt-dlp executable.
    pub fn executable(&self) -> &PathBuf {
        &self.tools.ytdlp
    }
}

fn failure_details(recent: &VecDeque<String>, code: i32) -> String {
    if recent.is_empty() {
        return format!("yt-dlp exited with code {}.", code);
    }

    recent.iter().cloned().collect::<Vec<_>>().join("\n")
}
