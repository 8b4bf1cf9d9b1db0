//! Where the user-facing download messages go.

use std::path::Path;
use ytdlp_driver::model::Progress;

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Receives what happens during a download.
///
/// Implementations must be cheap, they are called for every line yt-dlp prints.
pub trait Reporter: Send + Sync {
    /// A line for the log pane.
    fn log(&self, message: &str);

    /// A progress update of `url`.
    fn progress(&self, url: &str, progress: &Progress);

    /// yt-dlp moved the final file of `url` into place.
    fn finished(&self, url: &str, path: &Path);
}

/// A reporter sending everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn log(&self, message: &str) {
        log::info!("{}", message);
    }

    fn progress(&self, url: &str, progress: &Progress) {
        log::debug!("{}", status_line(url, progress));
    }

    fn finished(&self, _url: &str, path: &Path) {
        log::debug!("Processing: {}", file_name(path));
    }
}

/// Formats a byte count with a 1024 base.
pub fn format_bytes(bytes: Option<u64>) -> String {
    let bytes = match bytes {
        Some(bytes) if bytes > 0 => bytes,
        _ => return "-".to_string(),
    };

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, UNITS[unit])
}

/// Formats a remaining time in seconds as `m:ss` or `h:mm:ss`.
pub fn format_eta(seconds: Option<f64>) -> String {
    let seconds = match seconds {
        Some(seconds) if seconds.is_finite() && seconds >= 0.0 => seconds as u64,
        _ => return "-".to_string(),
    };

    let (hours, minutes, seconds) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// The one line summary shown next to the progress bar.
///
/// Only `downloading` updates carry sizes. A `finished` update names the file being processed, any other status is
/// shown with the URL.
pub fn status_line(url: &str, progress: &Progress) -> String {
    match progress.status.as_str() {
        "downloading" => {}
        "finished" => {
            let name = match &progress.filename {
                Some(path) => file_name(path),
                None => url.to_string(),
            };
            return format!("Processing: {}", name);
        }
        status => return format!("{}: {}", status, url),
    }

    let speed = progress.speed.map(|speed| speed.max(0.0) as u64);
    format!(
        "Downloading: {} | {}/{} | {}/s | ETA {}",
        url,
        format_bytes(progress.downloaded_bytes),
        format_bytes(progress.total()),
        format_bytes(speed),
        format_eta(progress.eta)
    )
}

/// The file name of `path`, or the whole path when it has none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
