//! Tools for fetching data from a URL.
//!
//! The `deps` module uses the [`Fetcher`] to install the yt-dlp and ffmpeg binaries.

use crate::error::{Error, Result};
use crate::utils::file_system;
use futures_util::StreamExt;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

pub mod deps;

/// The user agent sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0";
/// The default timeout of a request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A callback receiving the downloaded size and the total size, `0` when unknown.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// The fetcher is responsible for downloading data from a URL.
///
/// Files are streamed into a `.part` sibling which replaces the destination only once the download completed.
#[derive(Clone)]
pub struct Fetcher {
    /// The URL from which to download the data.
    url: String,
    /// The timeout of connecting, and of every read once connected.
    timeout: Duration,
    /// Callback optional for tracking download progress
    progress_callback: Option<ProgressCallback>,
}

impl fmt::Display for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fetcher(url={})", self.url)
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a new fetcher for the given URL.
    pub fn new(url: impl AsRef<str>) -> Self {
        Self {
            url: url.as_ref().to_string(),
            timeout: DEFAULT_TIMEOUT,
            progress_callback: None,
        }
    }

    /// Configures the timeout of connecting and of each read.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure a callback for tracking download progress.
    ///
    /// # Arguments
    ///
    /// * `callback` - A function that will be called with the downloaded size and total size.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    fn client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(self.timeout)
            .build()?;

        Ok(client)
    }

    /// Fetches the body of the URL as text.
    ///
    /// # Errors
    ///
    /// This function will return an error if the request failed or the server answered with an error status.
    pub async fn fetch_text(&self) -> Result<String> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Fetching text from {}", self.url);

        let request = self.client()?.get(&self.url).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Timeout(self.timeout))??
            .error_for_status()?;

        let text = tokio::time::timeout(self.timeout, response.text())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        Ok(text)
    }

    /// Downloads the asset at the given URL and writes it to the given destination.
    ///
    /// The parent directories are created. The partial file is removed when the download fails.
    ///
    /// # Errors
    ///
    /// This function will return an error if the asset cannot be downloaded or written to the destination.
    pub async fn fetch_asset(&self, destination: impl AsRef<Path> + std::fmt::Debug) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Fetching asset from {} to {:?}", self.url, destination);

        file_system::create_parent_dir(&destination)?;
        let part = file_system::part_path(&destination);

        if let Err(e) = self.fetch_into(&part).await {
            file_system::remove_temp_file(&part).await;
            return Err(e);
        }

        if destination.as_ref().exists() {
            tokio::fs::remove_file(destination.as_ref()).await?;
        }
        if let Err(e) = tokio::fs::rename(&part, destination.as_ref()).await {
            file_system::remove_temp_file(&part).await;
            return Err(e.into());
        }

        Ok(())
    }

    async fn fetch_into(&self, part: &Path) -> Result<()> {
        let request = self.client()?.get(&self.url).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Timeout(self.timeout))??
            .error_for_status()?;

        let total = response.content_length().unwrap_or(0);
        let mut file = file_system::create_file(part).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        loop {
            let chunk = match tokio::time::timeout(self.timeout, stream.next()).await {
                Ok(Some(chunk)) => chunk?,
                Ok(None) => break,
                Err(_) => return Err(Error::Timeout(self.timeout)),
            };
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(callback) = &self.progress_callback {
                callback(downloaded, total);
            }
        }

        file.flush().await?;
        Ok(())
    }
}

/// Turns a stream of byte counts into whole percentages, one every `step` percent.
///
/// A percentage is reported the first time the download crosses each threshold; a single chunk crossing
/// several thresholds reports once.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentSteps {
    step: u64,
    next: u64,
}

impl PercentSteps {
    /// Creates a tracker reporting every `step` percent.
    pub fn new(step: u64) -> Self {
        let step = step.max(1);
        Self { step, next: step }
    }

    /// Records progress and returns the percentage to report, if a threshold was crossed.
    pub fn advance(&mut self, downloaded: u64, total: u64) -> Option<u64> {
        if total == 0 {
            return None;
        }

        let percent = downloaded.saturating_mul(100) / total;
        if percent < self.next {
            return None;
        }

        while self.next <= percent {
            self.next += self.step;
        }

        Some(percent)
    }
}

impl Default for PercentSteps {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_each_ten_percent_threshold_once() {
        let mut steps = PercentSteps::default();

        assert_eq!(steps.advance(5, 100), None);
        assert_eq!(steps.advance(10, 100), Some(10));
        assert_eq!(steps.advance(15, 100), None);
        assert_eq!(steps.advance(34, 100), Some(34));
        assert_eq!(steps.advance(39, 100), None);
        assert_eq!(steps.advance(40, 100), Some(40));
        assert_eq!(steps.advance(100, 100), Some(100));
        assert_eq!(steps.advance(100, 100), None);
    }

    #[test]
    fn unknown_total_never_reports() {
        let mut steps = PercentSteps::default();

        assert_eq!(steps.advance(1 << 20, 0), None);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_partial_file() {
        let temp = tempfile::tempdir().unwrap();
        let destination = temp.path().join("tools").join("yt-dlp_linux");

        // nothing listens on the discard port
        let result = Fetcher::new("http://127.0.0.1:9/yt-dlp_linux")
            .with_timeout(Duration::from_secs(5))
            .fetch_asset(&destination)
            .await;

        assert!(result.is_err());
        assert!(!destination.exists());
        assert!(!file_system::part_path(&destination).exists());
        assert!(destination.parent().unwrap().is_dir());
    }
}
