//! Fetch the latest 'ffmpeg' build published for yt-dlp.

use crate::error::{Error, Result};
use crate::fetcher::deps::WantedRelease;
use crate::utils;
use crate::utils::file_system;
use crate::utils::platform::{Architecture, Platform};
use std::fmt;
use std::path::{Path, PathBuf};

/// The download root of the latest ffmpeg builds.
pub const BUILDS_URL: &str = "https://github.com/yt-dlp/FFmpeg-Builds/releases/latest/download";

/// The archive format of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// A zip archive, used for Windows builds.
    Zip,
    /// A tar archive compressed with xz, used for Linux builds.
    TarXz,
}

impl ArchiveKind {
    /// The file extension of the archive.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::TarXz => "tar.xz",
        }
    }
}

/// A build selected for a platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Build {
    /// The build name, without extension, e.g. `ffmpeg-master-latest-win64-gpl`.
    pub name: String,
    /// The platform tag inside the name, e.g. `win64`.
    pub target: &'static str,
    /// The archive format.
    pub kind: ArchiveKind,
}

impl Build {
    /// The file name of the archive.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.kind.extension())
    }
}

/// The ffmpeg fetcher is responsible for selecting the ffmpeg build for the current platform and architecture.
/// It also extracts the directory holding the binaries from the downloaded archive.
///
/// # Example
///
/// ```rust, no_run
/// # use ytdlp_driver::fetcher::deps::ffmpeg::BuildFetcher;
/// # use ytdlp_driver::fetcher::Fetcher;
/// # use std::path::PathBuf;
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tools = PathBuf::from("tools");
/// let fetcher = BuildFetcher::new();
///
/// let (release, build) = fetcher.fetch_binary()?;
/// let archive = tools.join(format!("ffmpeg-{}.{}", build.target, build.kind.extension()));
/// Fetcher::new(&release.url).fetch_asset(&archive).await?;
///
/// let bin = fetcher
///     .extract_binary(&archive, build.kind, tools.join("ffmpeg-extract"), tools.join("ffmpeg-bin"))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BuildFetcher {
    base_url: String,
}

impl fmt::Display for BuildFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BuildFetcher(base={})", self.base_url)
    }
}

impl Default for BuildFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildFetcher {
    /// Create a new fetcher for the official ffmpeg builds.
    pub fn new() -> Self {
        Self {
            base_url: BUILDS_URL.to_string(),
        }
    }

    /// Select the build published for the given platform and architecture.
    pub fn select_build(platform: &Platform, architecture: &Architecture) -> Option<Build> {
        let (target, kind) = match (platform, architecture) {
            (Platform::Windows, Architecture::X86) => ("win32", ArchiveKind::Zip),
            (Platform::Windows, Architecture::Aarch64) => ("winarm64", ArchiveKind::Zip),
            (Platform::Windows, _) => ("win64", ArchiveKind::Zip),

            (Platform::Linux, Architecture::X64) => ("linux64", ArchiveKind::TarXz),
            (Platform::Linux, Architecture::Aarch64) => ("linuxarm64", ArchiveKind::TarXz),

            _ => return None,
        };

        Some(Build {
            name: format!("ffmpeg-master-latest-{}-gpl", target),
            target,
            kind,
        })
    }

    /// Fetch the ffmpeg build for the current platform and architecture.
    pub fn fetch_binary(&self) -> Result<(WantedRelease, Build)> {
        self.fetch_binary_for_platform(Platform::detect(), Architecture::detect())
    }

    /// Fetch the ffmpeg build for the given platform and architecture.
    pub fn fetch_binary_for_platform(
        &self,
        platform: Platform,
        architecture: Architecture,
    ) -> Result<(WantedRelease, Build)> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Selecting ffmpeg build for platform: {:?}, architecture: {:?}",
            platform,
            architecture
        );

        let build = Self::select_build(&platform, &architecture)
            .ok_or(Error::Binary(platform, architecture))?;

        let release = WantedRelease {
            url: format!("{}/{}", self.base_url, build.file_name()),
            name: build.file_name(),
        };

        Ok((release, build))
    }

    /// Extract the archive, and move the directory holding the ffmpeg executable to `local_bin`.
    ///
    /// `extract_dir` is wiped before extraction. It is removed afterwards along with the archive, whether the
    /// installation succeeded or not. A previous `local_bin` is replaced.
    ///
    /// # Returns
    ///
    /// The path of `local_bin`.
    pub async fn extract_binary(
        &self,
        archive: impl AsRef<Path> + std::fmt::Debug,
        kind: ArchiveKind,
        extract_dir: impl AsRef<Path> + std::fmt::Debug,
        local_bin: impl AsRef<Path> + std::fmt::Debug,
    ) -> Result<PathBuf> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Extracting ffmpeg from archive: {:?} into {:?}",
            archive.as_ref(),
            local_bin.as_ref()
        );

        let result = self
            .move_binary_dir(archive.as_ref(), kind, extract_dir.as_ref(), local_bin.as_ref())
            .await;

        file_system::remove_temp_dir(extract_dir.as_ref());
        if archive.as_ref().exists() {
            file_system::remove_temp_file(archive.as_ref()).await;
        }
        result?;

        let executable = local_bin.as_ref().join(utils::find_executable("ffmpeg"));
        if !executable.is_file() {
            return Err(Error::Install(format!(
                "FFmpeg installation failed: {} not found after extraction.",
                utils::find_executable("ffmpeg")
            )));
        }

        file_system::set_executable(&executable)?;
        let probe = local_bin.as_ref().join(utils::find_executable("ffprobe"));
        if probe.is_file() {
            file_system::set_executable(&probe)?;
        }

        Ok(local_bin.as_ref().to_path_buf())
    }

    async fn move_binary_dir(
        &self,
        archive: &Path,
        kind: ArchiveKind,
        extract_dir: &Path,
        local_bin: &Path,
    ) -> Result<()> {
        file_system::recreate_dir(extract_dir)?;

        match kind {
            ArchiveKind::Zip => file_system::extract_zip(archive, extract_dir).await?,
            ArchiveKind::TarXz => file_system::extract_tar_xz(archive, extract_dir).await?,
        }

        let executable = utils::find_executable("ffmpeg");
        let bin_dir = file_system::find_parent_of(extract_dir, &executable)?.ok_or_else(|| {
            Error::Install(format!(
                "Downloaded FFmpeg archive did not contain {}.",
                executable
            ))
        })?;

        if local_bin.exists() {
            std::fs::remove_dir_all(local_bin)?;
        }
        file_system::create_parent_dir(local_bin)?;
        std::fs::rename(&bin_dir, local_bin)?;

        Ok(())
    }
}
