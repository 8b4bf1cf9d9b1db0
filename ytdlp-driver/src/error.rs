//! The errors that can occur.

use crate::utils::platform::{Architecture, Platform};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The possible errors that can occur.
#[derive(Debug, Error)]
pub enum Error {
    /// An error occurred while running the runtime.
    #[error("An error occurred while running the runtime: {0}")]
    Runtime(#[from] tokio::task::JoinError),
    /// An error occurred while interacting with the file system.
    #[error("An IO error occurred: {0}")]
    IO(#[from] std::io::Error),
    /// An error occurred while zipping or unzipping a file.
    #[error("An error occurred while extracting the archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// An error occurred while fetching a file.
    #[error("An error occurred while fetching: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// No yt-dlp release asset is published for this platform.
    #[error("No yt-dlp release found for platform {0}/{1}")]
    Github(Platform, Architecture),
    /// No ffmpeg build is published for this platform.
    #[error("No ffmpeg binary found for platform {0}/{1}")]
    Binary(Platform, Architecture),
    /// The installation of a tool did not produce the expected files.
    #[error("{0}")]
    Install(String),
    /// A downloaded file did not match its published checksum.
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    Checksum {
        /// The file that was verified.
        path: PathBuf,
        /// The published SHA-256 digest.
        expected: String,
        /// The digest of the downloaded file.
        actual: String,
    },

    /// An error occurred while running a command.
    #[error("Failed to execute command: {0}")]
    Command(String),
    /// The process exited with a non-zero code.
    ///
    /// `details` holds the last lines the process printed, or a generic message when it printed nothing.
    #[error("{details}")]
    Process {
        /// The exit code of the process, `-1` when it was killed by a signal.
        code: i32,
        /// The recent output of the process.
        details: String,
    },
    /// The operation was cancelled by the user.
    #[error("Cancelled by user")]
    Cancelled,

    /// An error occurred manipulating a path.
    #[error("An invalid path was provided: {0}")]
    Path(String),
    /// An error occurred due to a timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// An unknown error occurred.
    #[error("An unknown error occurred: {0}")]
    Unknown(String),
}

impl Error {
    /// Returns true if this error is a user cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
