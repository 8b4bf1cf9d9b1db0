//! Fetch the latest release of 'yt-dlp' from its GitHub repository.

use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::fetcher::deps::WantedRelease;
use crate::utils::platform::{Architecture, Platform};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// The download root of the latest yt-dlp release.
pub const RELEASE_URL: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download";
/// The checksum file published with every release.
pub const CHECKSUMS_ASSET: &str = "SHA2-256SUMS";

/// The release fetcher selects the yt-dlp build for a platform, and verifies downloads against the published checksums.
///
/// # Example
///
/// ```rust, no_run
/// # use ytdlp_driver::fetcher::deps::youtube::ReleaseFetcher;
/// # use ytdlp_driver::fetcher::Fetcher;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = ReleaseFetcher::new();
/// let release = fetcher.fetch_release()?;
///
/// let path = PathBuf::from("tools").join(&release.name);
/// Fetcher::new(&release.url).fetch_asset(&path).await?;
/// fetcher.verify(&release, &path).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ReleaseFetcher {
    base_url: String,
}

impl fmt::Display for ReleaseFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReleaseFetcher(base={})", self.base_url)
    }
}

impl Default for ReleaseFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseFetcher {
    /// Creates a fetcher for the official latest release.
    pub fn new() -> Self {
        Self::with_base_url(RELEASE_URL)
    }

    /// Creates a fetcher for a mirror laid out like the GitHub release downloads.
    pub fn with_base_url(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
        }
    }

    /// The name of the yt-dlp release asset for the given platform and architecture.
    ///
    /// Windows always uses the 32-bit build, which runs everywhere.
    pub fn asset_name(platform: &Platform, architecture: &Architecture) -> Option<&'static str> {
        match (platform, architecture) {
            (Platform::Windows, _) => Some("yt-dlp_x86.exe"),

            (Platform::Linux, Architecture::X64) => Some("yt-dlp_linux"),
            (Platform::Linux, Architecture::Aarch64) => Some("yt-dlp_linux_aarch64"),
            (Platform::Linux, Architecture::Armv7l) => Some("yt-dlp_linux_armv7l"),

            (Platform::Mac, _) => Some("yt-dlp_macos"),

            _ => None,
        }
    }

    /// The asset name for the running platform.
    pub fn current_asset_name() -> Result<&'static str> {
        let platform = Platform::detect();
        let architecture = Architecture::detect();

        Self::asset_name(&platform, &architecture).ok_or(Error::Github(platform, architecture))
    }

    /// Selects the release asset for the running platform.
    pub fn fetch_release(&self) -> Result<WantedRelease> {
        self.fetch_release_for_platform(Platform::detect(), Architecture::detect())
    }

    /// Selects the release asset for the given platform and architecture.
    pub fn fetch_release_for_platform(
        &self,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<WantedRelease> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Selecting yt-dlp release for platform: {:?}, architecture: {:?}",
            platform,
            architecture
        );

        let name = Self::asset_name(&platform, &architecture)
            .ok_or(Error::Github(platform, architecture))?;

        Ok(WantedRelease {
            url: format!("{}/{}", self.base_url, name),
            name: name.to_string(),
        })
    }

    /// Fetches the published checksums and returns the digest of the given release.
    pub async fn fetch_checksum(&self, release: &WantedRelease) -> Result<Option<String>> {
        let url = format!("{}/{}", self.base_url, CHECKSUMS_ASSET);
        let sums = Fetcher::new(url).fetch_text().await?;

        Ok(parse_checksums(&sums, &release.name))
    }

    /// Verifies a downloaded release against the published checksums.
    ///
    /// # Errors
    ///
    /// This function will return [`Error::Checksum`] when the digests differ, or an error if the checksums could not be
    /// fetched or the file could not be read.
    ///
    /// # Returns
    ///
    /// `false` when the release has no published checksum.
    pub async fn verify(&self, release: &WantedRelease, path: impl AsRef<Path>) -> Result<bool> {
        let Some(expected) = self.fetch_checksum(release).await? else {
            return Ok(false);
        };

        let actual = sha256_file(&path).await?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(Error::Checksum {
                path: path.as_ref().to_path_buf(),
                expected,
                actual,
            });
        }

        Ok(true)
    }
}

/// Finds the digest of `asset` in a `sha256sum` style listing.
///
/// Lines look like `<hex digest>  <name>`, binary-mode entries prefix the name with `*`.
pub fn parse_checksums(listing: &str, asset: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');

        (name == asset).then(|| digest.to_lowercase())
    })
}

/// Computes the lowercase hex SHA-256 digest of a file.
pub async fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
