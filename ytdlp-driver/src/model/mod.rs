//! The data exchanged with a yt-dlp process: its command line and its output.

pub mod args;
pub mod progress;

pub use args::DownloadArgs;
pub use progress::{OutputLine, Progress};

use std::path::PathBuf;

/// Something that happened during a download, as reported by yt-dlp.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The file being downloaded progressed.
    Progress(Progress),
    /// A file was moved to its final location.
    Saved(PathBuf),
    /// yt-dlp printed a log line.
    Log(String),
}
