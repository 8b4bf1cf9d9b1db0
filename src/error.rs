use thiserror::Error;

/// The errors returned by a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The tools or yt-dlp failed.
    #[error(transparent)]
    Driver(#[from] ytdlp_driver::error::Error),
    /// The request was rejected before anything started.
    #[error("{0}")]
    Validation(String),
    /// Every rung of the ladder failed.
    ///
    /// `summary` holds one `label: error` line per rung.
    #[error("All download attempts failed for {url}:\n{summary}")]
    AllAttemptsFailed { url: String, summary: String },
    #[error("Cancelled by user")]
    Cancelled,
    #[error("An IO error occurred: {0}")]
    IO(#[from] std::io::Error),
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            DownloadError::Cancelled => true,
            DownloadError::Driver(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
