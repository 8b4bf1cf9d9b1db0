//! Tools for working with the file system.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tar::Archive;
use tokio::fs::{File, OpenOptions};
use xz2::read::XzDecoder;
use zip::ZipArchive;

/// Returns the path used while a download to `destination` is in flight.
///
/// `.part` is appended to the full file name, so `yt-dlp_linux` becomes `yt-dlp_linux.part`
/// and `ffmpeg.zip` becomes `ffmpeg.zip.part`.
pub fn part_path(destination: impl AsRef<Path>) -> PathBuf {
    let mut raw = OsString::from(destination.as_ref().as_os_str());
    raw.push(".part");

    PathBuf::from(raw)
}

/// Creates a new file at the given destination, truncating any previous content.
pub async fn create_file(destination: impl AsRef<Path>) -> Result<File> {
    let mut open_options = OpenOptions::new();
    open_options.write(true);
    open_options.create(true);
    open_options.truncate(true);

    #[cfg(not(target_os = "windows"))]
    {
        open_options.mode(0o755);
    }

    let file = open_options.open(destination).await?;
    Ok(file)
}

/// Creates a new directory at the given destination.
/// If the directory already exists, nothing is done.
pub fn create_dir(destination: impl AsRef<Path>) -> Result<()> {
    std::fs::create_dir_all(destination)?;
    Ok(())
}

/// Creates the parent directory of the given destination.
/// If the parent directory already exists, nothing is done.
pub fn create_parent_dir(destination: impl AsRef<Path>) -> Result<()> {
    if let Some(parent) = destination.as_ref().parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(())
}

/// Removes the directory and its content, then creates it again empty.
pub fn recreate_dir(destination: impl AsRef<Path>) -> Result<()> {
    let destination = destination.as_ref();
    if destination.exists() {
        std::fs::remove_dir_all(destination)?;
    }

    std::fs::create_dir_all(destination)?;
    Ok(())
}

/// Extracts a zip file to the given destination.
///
/// # Arguments
///
/// * `zip_path` - The path to the zip file.
/// * `destination` - The path to extract the zip file to.
pub async fn extract_zip(
    zip_path: impl AsRef<Path> + std::fmt::Debug,
    destination: impl AsRef<Path> + std::fmt::Debug,
) -> Result<()> {
    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Extracting zip file: {:?} to {:?}",
        zip_path.as_ref(),
        destination.as_ref()
    );

    let file = File::open(zip_path).await?;
    let file = file.into_std().await;
    let destination = destination.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut archive = ZipArchive::new(file)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let target = destination.join(
                entry
                    .enclosed_name()
                    .ok_or(Error::Path("Archive entry escapes the destination".to_string()))?,
            );

            if entry.is_dir() {
                std::fs::create_dir_all(&target)?;
                continue;
            }

            create_parent_dir(&target)?;
            let mut out = std::fs::File::create(&target)?;
            std::io::copy(&mut entry, &mut out)?;
        }

        Ok(())
    })
    .await?
}

/// Extracts a tar.xz file to the given destination.
///
/// # Arguments
///
/// * `tar_path` - The path to the tar.xz file.
/// * `destination` - The path to extract the tar.xz file to.
pub async fn extract_tar_xz(
    tar_path: impl AsRef<Path> + std::fmt::Debug,
    destination: impl AsRef<Path> + std::fmt::Debug,
) -> Result<()> {
    #[cfg(feature = "tracing")]
    tracing::debug!(
        "Extracting tar.xz file: {:?} to {:?}",
        tar_path.as_ref(),
        destination.as_ref()
    );

    let tar_xz = File::open(tar_path).await?;
    let tar_xz = tar_xz.into_std().await;
    let destination = destination.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let decompressor = XzDecoder::new(tar_xz);
        let mut archive = Archive::new(decompressor);

        archive.unpack(destination)?;
        Ok(())
    })
    .await?
}

/// Searches `root` recursively for a file called `file_name`, and returns the directory holding it.
///
/// Entries are visited in name order so the result is stable across runs.
pub fn find_parent_of(root: impl AsRef<Path>, file_name: &str) -> Result<Option<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Ok(None);
    }

    let mut entries = std::fs::read_dir(root)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    if entries
        .iter()
        .any(|path| path.is_file() && path.file_name().is_some_and(|name| name == file_name))
    {
        return Ok(Some(root.to_path_buf()));
    }

    for path in entries.iter().filter(|path| path.is_dir()) {
        if let Some(found) = find_parent_of(path, file_name)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

/// Sets the executable bit on the given file.
#[cfg(not(target_os = "windows"))]
pub fn set_executable(executable: impl AsRef<Path>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(executable.as_ref())?.permissions();

    perms.set_mode(0o755);
    std::fs::set_permissions(executable, perms)?;

    Ok(())
}

/// No-op implementation for Windows, as Windows doesn't use executable bits.
#[cfg(target_os = "windows")]
pub fn set_executable(_executable: impl AsRef<Path>) -> Result<()> {
    Ok(())
}

/// Removes a temporary file and logs any errors.
/// Does not propagate errors to avoid interrupting the execution flow.
///
/// # Returns
///
/// `true` if the file was successfully deleted, `false` otherwise
pub async fn remove_temp_file(file_path: impl AsRef<Path> + std::fmt::Debug) -> bool {
    let result = tokio::fs::remove_file(&file_path).await;

    #[cfg(feature = "tracing")]
    if let Err(ref e) = result {
        tracing::warn!("Failed to remove temporary file {:?}: {}", file_path, e);
    }

    result.is_ok()
}

/// Removes a temporary directory, ignoring errors.
pub fn remove_temp_dir(dir_path: impl AsRef<Path> + std::fmt::Debug) {
    if !dir_path.as_ref().exists() {
        return;
    }

    let _result = std::fs::remove_dir_all(&dir_path);

    #[cfg(feature = "tracing")]
    if let Err(ref e) = _result {
        tracing::warn!("Failed to remove temporary directory {:?}: {}", dir_path, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_to_the_full_name() {
        assert_eq!(
            part_path("tools/yt-dlp_linux"),
            PathBuf::from("tools/yt-dlp_linux.part")
        );
        assert_eq!(
            part_path("tools/ffmpeg-win64.zip"),
            PathBuf::from("tools/ffmpeg-win64.zip.part")
        );
    }

    #[test]
    fn finds_the_shallowest_directory_holding_the_file() {
        let temp = tempfile::tempdir().unwrap();
        let bin = temp.path().join("ffmpeg-master-latest/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("ffmpeg.exe"), b"binary").unwrap();
        std::fs::write(temp.path().join("LICENSE.txt"), b"gpl").unwrap();

        let found = find_parent_of(temp.path(), "ffmpeg.exe").unwrap();
        assert_eq!(found, Some(bin));
    }

    #[test]
    fn missing_file_yields_none() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("doc")).unwrap();

        assert_eq!(find_parent_of(temp.path(), "ffmpeg").unwrap(), None);
        assert_eq!(
            find_parent_of(temp.path().join("absent"), "ffmpeg").unwrap(),
            None
        );
    }

    #[test]
    fn recreate_dir_wipes_previous_content() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("ffmpeg-extract");
        std::fs::create_dir_all(dir.join("stale")).unwrap();

        recreate_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }
}
