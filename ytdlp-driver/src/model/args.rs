//! The command line of a yt-dlp download.

use crate::model::progress;
use std::path::{Path, PathBuf};

/// The format selector: best video with best audio, or the best single file.
pub const FORMAT_SELECTOR: &str = "bv*+ba/b";
/// The container used when none is requested.
pub const DEFAULT_MERGE_FORMAT: &str = "mp4";
/// The output name template, relative to the output directory.
pub const OUTPUT_TEMPLATE: &str = "%(title).200s [%(id)s].%(ext)s";

/// The arguments of a single yt-dlp invocation.
///
/// # Examples
///
/// ```rust
/// # use ytdlp_driver::model::args::DownloadArgs;
/// let args = DownloadArgs::new("https://youtu.be/dQw4w9WgXcQ", "downloads")
///     .with_cookies_from_browser("firefox");
///
/// let argv = args.to_args();
/// assert_eq!(argv.last().unwrap(), "https://youtu.be/dQw4w9WgXcQ");
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DownloadArgs {
    /// The URL to download.
    pub url: String,
    /// The directory receiving the file.
    pub output_dir: PathBuf,
    /// The container of the merged file, `mp4` when unset.
    pub merge_output_format: Option<String>,
    /// A Netscape cookies file.
    pub cookies: Option<PathBuf>,
    /// A browser to extract cookies from.
    pub cookies_from_browser: Option<String>,
    /// The directory holding the ffmpeg executable.
    pub ffmpeg_location: Option<PathBuf>,
}

impl DownloadArgs {
    /// Creates the arguments downloading `url` into `output_dir`.
    pub fn new(url: impl Into<String>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            url: url.into(),
            output_dir: output_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Forces the container of the merged file.
    pub fn with_merge_output_format(mut self, format: Option<String>) -> Self {
        self.merge_output_format = format;
        self
    }

    /// Authenticates with a Netscape cookies file.
    pub fn with_cookies(mut self, cookies: impl AsRef<Path>) -> Self {
        self.cookies = Some(cookies.as_ref().to_path_buf());
        self
    }

    /// Authenticates with the cookies of an installed browser.
    pub fn with_cookies_from_browser(mut self, browser: impl Into<String>) -> Self {
        self.cookies_from_browser = Some(browser.into());
        self
    }

    /// Points yt-dlp at the directory holding ffmpeg.
    pub fn with_ffmpeg_location(mut self, location: Option<PathBuf>) -> Self {
        self.ffmpeg_location = location;
        self
    }

    /// Builds the argument list, URL last.
    pub fn to_args(&self) -> Vec<String> {
        let merge_format = self
            .merge_output_format
            .as_deref()
            .unwrap_or(DEFAULT_MERGE_FORMAT);
        let output = self.output_dir.join(OUTPUT_TEMPLATE);

        let mut args = vec![
            "-f".to_string(),
            FORMAT_SELECTOR.to_string(),
            "--merge-output-format".to_string(),
            merge_format.to_string(),
            "--no-playlist".to_string(),
            "--retries".to_string(),
            "10".to_string(),
            "--fragment-retries".to_string(),
            "10".to_string(),
            "--concurrent-fragments".to_string(),
            "4".to_string(),
            "--windows-filenames".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            progress::progress_template(),
            "--print".to_string(),
            progress::file_template(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        if let Some(cookies) = &self.cookies {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }

        if let Some(browser) = &self.cookies_from_browser {
            args.push("--cookies-from-browser".to_string());
            args.push(browser.clone());
        }

        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string_lossy().into_owned());
        }

        args.push(self.url.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_the_fixed_argument_list() {
        let args = DownloadArgs::new("https://www.youtube.com/watch?v=abc", "out").to_args();
        let output = Path::new("out").join(OUTPUT_TEMPLATE);

        assert_eq!(
            args,
            vec![
                "-f".to_string(),
                "bv*+ba/b".to_string(),
                "--merge-output-format".to_string(),
                "mp4".to_string(),
                "--no-playlist".to_string(),
                "--retries".to_string(),
                "10".to_string(),
                "--fragment-retries".to_string(),
                "10".to_string(),
                "--concurrent-fragments".to_string(),
                "4".to_string(),
                "--windows-filenames".to_string(),
                "--newline".to_string(),
                "--progress-template".to_string(),
                progress::progress_template(),
                "--print".to_string(),
                "after_move:__VD_FILE__:%(filepath)s".to_string(),
                "-o".to_string(),
                output.to_string_lossy().into_owned(),
                "https://www.youtube.com/watch?v=abc".to_string(),
            ]
        );
    }

    #[test]
    fn optional_flags_come_before_the_url_in_order() {
        let args = DownloadArgs::new("https://www.instagram.com/reel/xyz/", "out")
            .with_merge_output_format(Some("mkv".to_string()))
            .with_cookies("cookies.txt")
            .with_cookies_from_browser("edge")
            .with_ffmpeg_location(Some(PathBuf::from("tools/ffmpeg-bin")))
            .to_args();

        let tail = &args[args.len() - 7..];
        assert_eq!(
            tail,
            &[
                "--cookies",
                "cookies.txt",
                "--cookies-from-browser",
                "edge",
                "--ffmpeg-location",
                "tools/ffmpeg-bin",
                "https://www.instagram.com/reel/xyz/",
            ]
        );
        assert_eq!(args[3], "mkv");
    }
}
