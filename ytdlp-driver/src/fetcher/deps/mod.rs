//! The fetchers for required dependencies.

use crate::error::{Error, Result};
use crate::fetcher::deps::ffmpeg::BuildFetcher;
use crate::fetcher::deps::youtube::ReleaseFetcher;
use crate::fetcher::{Fetcher, PercentSteps};
use crate::utils;
use crate::utils::file_system;
use derive_more::Constructor;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub mod ffmpeg;
pub mod youtube;

/// The directory name of the tools root under the local application data directory.
pub const APP_DIR_NAME: &str = "VideoDownloader";
/// The fallback directory name of the tools root under the home directory.
pub const HOME_DIR_NAME: &str = ".video_downloader";
/// The directory receiving the ffmpeg binaries.
pub const FFMPEG_BIN_DIR: &str = "ffmpeg-bin";
/// The scratch directory used while extracting ffmpeg.
pub const FFMPEG_EXTRACT_DIR: &str = "ffmpeg-extract";

/// A callback receiving the human readable installation messages.
pub type Notifier = Arc<dyn Fn(&str) + Send + Sync>;

/// Returns the default directory holding the downloaded tools.
///
/// This is `%LOCALAPPDATA%/VideoDownloader/tools` when `LOCALAPPDATA` is set, `~/.video_downloader/tools` otherwise.
/// The directory is not created.
pub fn default_tools_root() -> Result<PathBuf> {
    if let Some(local_app_data) = std::env::var_os("LOCALAPPDATA").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(local_app_data)
            .join(APP_DIR_NAME)
            .join("tools"));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| Error::Path("Could not find the home directory".to_string()))?;
    Ok(home.join(HOME_DIR_NAME).join("tools"))
}

/// Installs required libraries.
///
/// # Examples
///
/// ```rust,no_run
/// # use ytdlp_driver::fetcher::deps::LibraryInstaller;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let installer = LibraryInstaller::new(PathBuf::from("tools"))
///     .with_notifier(|message| println!("{message}"));
///
/// let tools = installer.ensure_tools().await?;
/// println!("yt-dlp: {}", tools.ytdlp.display());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LibraryInstaller {
    /// The destination directory for the libraries.
    pub destination: PathBuf,
    notifier: Option<Notifier>,
    release_fetcher: ReleaseFetcher,
}

impl fmt::Debug for LibraryInstaller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryInstaller")
            .field("destination", &self.destination)
            .field("release_fetcher", &self.release_fetcher)
            .finish_non_exhaustive()
    }
}

/// The installed tools.
///
/// # Examples
///
/// ```rust,no_run
/// # use ytdlp_driver::fetcher::deps::ToolPaths;
/// # use std::path::PathBuf;
/// let tools = ToolPaths::new(PathBuf::from("tools/yt-dlp_x86.exe"), Some(PathBuf::from("tools/ffmpeg-bin")));
/// ```
#[derive(Constructor, Clone, Debug, PartialEq)]
pub struct ToolPaths {
    /// The path to the yt-dlp binary.
    pub ytdlp: PathBuf,
    /// The directory holding the ffmpeg binary, `None` when no build could be found.
    pub ffmpeg_location: Option<PathBuf>,
}

impl LibraryInstaller {
    /// Creates an installer placing the tools in `destination`.
    pub fn new(destination: PathBuf) -> Self {
        Self {
            destination,
            notifier: None,
            release_fetcher: ReleaseFetcher::new(),
        }
    }

    /// Creates an installer for the default tools root.
    pub fn with_default_root() -> Result<Self> {
        Ok(Self::new(default_tools_root()?))
    }

    /// Sets the callback receiving the installation messages.
    pub fn with_notifier<F>(mut self, notifier: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Sets where the yt-dlp release and its checksums are downloaded from.
    pub fn with_release_fetcher(mut self, fetcher: ReleaseFetcher) -> Self {
        self.release_fetcher = fetcher;
        self
    }

    fn notify(&self, message: &str) {
        #[cfg(feature = "tracing")]
        tracing::info!("{}", message);

        if let Some(notifier) = &self.notifier {
            notifier(message);
        }
    }

    /// The path where yt-dlp is installed.
    pub fn ytdlp_path(&self) -> Result<PathBuf> {
        Ok(self.destination.join(ReleaseFetcher::current_asset_name()?))
    }

    /// Ensures both tools are installed.
    pub async fn ensure_tools(&self) -> Result<ToolPaths> {
        file_system::create_dir(&self.destination)?;

        let ytdlp = self.ensure_ytdlp().await?;
        let ffmpeg_location = self.ensure_ffmpeg().await?;

        Ok(ToolPaths::new(ytdlp, ffmpeg_location))
    }

    /// Returns the installed yt-dlp, downloading the official binary when missing.
    pub async fn ensure_ytdlp(&self) -> Result<PathBuf> {
        let path = self.ytdlp_path()?;
        if path.is_file() {
            return Ok(path);
        }

        self.install_ytdlp().await
    }

    /// Downloads the official yt-dlp binary, replacing any installed one.
    ///
    /// The binary is checked against the published checksums. A mismatch removes it and fails; checksums that cannot
    /// be fetched are only reported.
    pub async fn install_ytdlp(&self) -> Result<PathBuf> {
        let release = self.release_fetcher.fetch_release()?;
        let path = self.destination.join(&release.name);

        self.notify(&format!(
            "{} not found. Downloading official binary...",
            release.name
        ));
        self.download_with_progress(&release, &path).await?;

        match self.release_fetcher.verify(&release, &path).await {
            Ok(true) => {}
            Ok(false) => self.notify(&format!(
                "No published checksum for {}, skipping verification.",
                release.name
            )),
            Err(e @ Error::Checksum { .. }) => {
                file_system::remove_temp_file(&path).await;
                return Err(e);
            }
            Err(e) => self.notify(&format!("Could not verify {}: {}", release.name, e)),
        }

        file_system::set_executable(&path)?;
        Ok(path)
    }

    /// Returns the directory holding ffmpeg.
    ///
    /// An ffmpeg on the `PATH` wins, then a previous installation in the tools root. Otherwise the official build
    /// for this platform is downloaded; platforms without a build get `None`.
    pub async fn ensure_ffmpeg(&self) -> Result<Option<PathBuf>> {
        if let Some(dir) = ffmpeg_on_path() {
            return Ok(Some(dir));
        }

        if let Some(dir) = local_ffmpeg(&self.destination) {
            return Ok(Some(dir));
        }

        let fetcher = BuildFetcher::new();
        let (release, build) = match fetcher.fetch_binary() {
            Ok(selected) => selected,
            Err(Error::Binary(platform, architecture)) => {
                self.notify(&format!(
                    "No FFmpeg build available for {}/{}. Install ffmpeg to merge video and audio.",
                    platform, architecture
                ));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let archive = self
            .destination
            .join(format!("ffmpeg-{}.{}", build.target, build.kind.extension()));

        self.notify("FFmpeg not found. Downloading official FFmpeg build...");
        if let Err(e) = self.download_with_progress(&release, &archive).await {
            file_system::remove_temp_file(&archive).await;
            return Err(e);
        }

        let bin = fetcher
            .extract_binary(
                &archive,
                build.kind,
                self.destination.join(FFMPEG_EXTRACT_DIR),
                self.destination.join(FFMPEG_BIN_DIR),
            )
            .await?;

        Ok(Some(bin))
    }

    async fn download_with_progress(&self, release: &WantedRelease, destination: &Path) -> Result<()> {
        let mut fetcher = Fetcher::new(&release.url);

        if let Some(notifier) = self.notifier.clone() {
            let steps = Mutex::new(PercentSteps::default());
            fetcher = fetcher.with_progress_callback(move |downloaded, total| {
                let percent = match steps.lock() {
                    Ok(mut steps) => steps.advance(downloaded, total),
                    Err(_) => None,
                };

                if let Some(percent) = percent {
                    notifier(&format!("Downloading tools... {}%", percent));
                }
            });
        }

        fetcher.fetch_asset(destination).await
    }
}

/// Returns the canonical directory of the ffmpeg found on the `PATH`.
pub fn ffmpeg_on_path() -> Option<PathBuf> {
    which::which("ffmpeg").ok().and_then(executable_dir)
}

/// The directory of an executable, resolved without the `\\?\` prefix Windows adds to canonical paths.
fn executable_dir(executable: PathBuf) -> Option<PathBuf> {
    let resolved = dunce::canonicalize(&executable).unwrap_or(executable);

    resolved.parent().map(Path::to_path_buf)
}

/// Returns the ffmpeg directory of a previous installation in `root`.
pub fn local_ffmpeg(root: impl AsRef<Path>) -> Option<PathBuf> {
    let bin = root.as_ref().join(FFMPEG_BIN_DIR);

    bin.join(utils::find_executable("ffmpeg"))
        .is_file()
        .then_some(bin)
}

/// A release asset that has been selected for the current platform.
#[derive(Debug, Clone, PartialEq)]
pub struct WantedRelease {
    /// The URL of the release asset.
    pub url: String,
    /// The name of the release asset.
    pub name: String,
}

impl fmt::Display for WantedRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WantedRelease: asset={}, url={};", self.name, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `routes` over plain HTTP, answering 404 for anything else, and returns the base URL.
    async fn serve(routes: Vec<(String, Vec<u8>)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buffer = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buffer).await {
                            Ok(0) | Err(_) => break,
                            Ok(read) => request.extend_from_slice(&buffer[..read]),
                        }
                    }

                    let request = String::from_utf8_lossy(&request);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = match routes.iter().find(|(route, _)| *route == path) {
                        Some((_, body)) => ("200 OK", body.clone()),
                        None => ("404 Not Found", b"not found".to_vec()),
                    };

                    let head = format!(
                        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", address)
    }

    fn asset_route() -> String {
        format!("/{}", ReleaseFetcher::current_asset_name().unwrap())
    }

    fn installer_for(root: &Path, base_url: &str, messages: Arc<Mutex<Vec<String>>>) -> LibraryInstaller {
        LibraryInstaller::new(root.to_path_buf())
            .with_release_fetcher(ReleaseFetcher::with_base_url(base_url))
            .with_notifier(move |message| messages.lock().unwrap().push(message.to_string()))
    }

    #[tokio::test]
    async fn verified_ytdlp_is_installed() {
        let binary = b"#!/bin/sh\necho 2025.01.01\n".to_vec();
        let sums = format!(
            "{}  {}\n",
            hex::encode(Sha256::digest(&binary)),
            ReleaseFetcher::current_asset_name().unwrap()
        );
        let base = serve(vec![
            (asset_route(), binary.clone()),
            ("/SHA2-256SUMS".to_string(), sums.into_bytes()),
        ])
        .await;

        let temp = tempfile::tempdir().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let path = installer_for(temp.path(), &base, messages.clone())
            .install_ytdlp()
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), binary);
        assert!(!file_system::part_path(&path).exists());
        assert!(
            !messages
                .lock()
                .unwrap()
                .iter()
                .any(|m| m.starts_with("Could not verify"))
        );
    }

    #[tokio::test]
    async fn checksum_mismatch_removes_the_binary() {
        let sums = format!(
            "{}  {}\n",
            "0".repeat(64),
            ReleaseFetcher::current_asset_name().unwrap()
        );
        let base = serve(vec![
            (asset_route(), b"tampered".to_vec()),
            ("/SHA2-256SUMS".to_string(), sums.into_bytes()),
        ])
        .await;

        let temp = tempfile::tempdir().unwrap();
        let installer = installer_for(temp.path(), &base, Arc::new(Mutex::new(Vec::new())));
        let err = installer.install_ytdlp().await.unwrap_err();

        assert!(matches!(err, Error::Checksum { .. }), "{err:?}");
        assert!(!installer.ytdlp_path().unwrap().exists());
    }

    #[tokio::test]
    async fn missing_checksums_keep_the_binary() {
        let base = serve(vec![(asset_route(), b"binary".to_vec())]).await;

        let temp = tempfile::tempdir().unwrap();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let path = installer_for(temp.path(), &base, messages.clone())
            .install_ytdlp()
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"binary");
        assert!(
            messages
                .lock()
                .unwrap()
                .iter()
                .any(|m| m.starts_with("Could not verify"))
        );
    }

    #[tokio::test]
    async fn installed_ytdlp_is_reused_without_network() {
        let temp = tempfile::tempdir().unwrap();
        let installer = LibraryInstaller::new(temp.path().to_path_buf());
        let path = installer.ytdlp_path().unwrap();
        std::fs::write(&path, b"binary").unwrap();

        assert_eq!(installer.ensure_ytdlp().await.unwrap(), path);
    }

    #[test]
    fn finds_a_previous_ffmpeg_installation() {
        let temp = tempfile::tempdir().unwrap();
        assert_eq!(local_ffmpeg(temp.path()), None);

        let bin = temp.path().join(FFMPEG_BIN_DIR);
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(utils::find_executable("ffmpeg")), b"binary").unwrap();

        assert_eq!(local_ffmpeg(temp.path()), Some(bin));
    }

    #[test]
    fn executable_dir_is_a_plain_canonical_path() {
        let temp = tempfile::tempdir().unwrap();
        let ffmpeg = temp.path().join(utils::find_executable("ffmpeg"));
        std::fs::write(&ffmpeg, b"binary").unwrap();

        let dir = executable_dir(ffmpeg).unwrap();

        assert!(!dir.to_string_lossy().starts_with(r"\\?\"), "{dir:?}");
        assert_eq!(dir, dunce::canonicalize(temp.path()).unwrap());
    }

    #[test]
    fn tools_root_ends_with_tools() {
        let root = default_tools_root().unwrap();

        assert!(root.ends_with("tools"));
    }
}
