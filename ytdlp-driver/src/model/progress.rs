//! The line protocol spoken by a yt-dlp run.
//!
//! yt-dlp is started with a progress template and a print template that prefix their lines with
//! markers, so progress updates and final file paths can be told apart from ordinary log output.

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

/// The marker that starts every progress line.
pub const PROGRESS_PREFIX: &str = "__VD_PROGRESS__:";
/// The marker that starts the line carrying the final path of a downloaded file.
pub const FILE_PREFIX: &str = "__VD_FILE__:";

/// The value of `--progress-template`.
pub fn progress_template() -> String {
    format!(
        "download:{PROGRESS_PREFIX}%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.filename)s"
    )
}

/// The value of `--print`, emitted once a file reached its final location.
pub fn file_template() -> String {
    format!("after_move:{FILE_PREFIX}%(filepath)s")
}

static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<status>[^|]*)\|(?P<downloaded>[^|]*)\|(?P<total>[^|]*)\|(?P<estimate>[^|]*)\|(?P<speed>[^|]*)\|(?P<eta>[^|]*)(?:\|(?P<filename>.*))?$",
    )
    .expect("progress pattern is valid")
});

/// A progress update of the file being downloaded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Progress {
    /// The status reported by yt-dlp, `downloading` when it reported none.
    pub status: String,
    /// The bytes downloaded so far.
    pub downloaded_bytes: Option<u64>,
    /// The exact size of the file.
    pub total_bytes: Option<u64>,
    /// The estimated size of the file, only kept when the exact size is unknown.
    pub total_bytes_estimate: Option<u64>,
    /// The download speed in bytes per second.
    pub speed: Option<f64>,
    /// The estimated remaining time in seconds.
    pub eta: Option<f64>,
    /// The file being written.
    pub filename: Option<PathBuf>,
}

impl Progress {
    /// Parses the payload of a progress line, the part after [`PROGRESS_PREFIX`].
    pub fn parse(payload: &str) -> Option<Self> {
        let captures = PROGRESS_LINE.captures(payload.trim())?;
        let field = |name: &str| captures.name(name).map_or("", |m| m.as_str());

        let status = match field("status").trim() {
            "" => "downloading".to_string(),
            status => status.to_string(),
        };

        let total_bytes = parse_int(field("total"));
        let total_bytes_estimate = match total_bytes {
            Some(_) => None,
            None => parse_int(field("estimate")),
        };

        Some(Self {
            status,
            downloaded_bytes: parse_int(field("downloaded")),
            total_bytes,
            total_bytes_estimate,
            speed: parse_float(field("speed")),
            eta: parse_float(field("eta")),
            filename: Some(field("filename").trim())
                .filter(|name| !is_missing(name))
                .map(PathBuf::from),
        })
    }

    /// The best known size of the file, exact or estimated.
    pub fn total(&self) -> Option<u64> {
        self.total_bytes.or(self.total_bytes_estimate)
    }

    /// The completed fraction between 0 and 1, when the size is known.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total().filter(|total| *total > 0)?;
        let downloaded = self.downloaded_bytes.unwrap_or(0);

        Some((downloaded as f64 / total as f64).min(1.0))
    }
}

/// A classified line of yt-dlp output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    /// A progress update, or `None` when the payload was malformed.
    Progress(Option<Progress>),
    /// The final path of a downloaded file.
    File(PathBuf),
    /// Any other non-empty line.
    Message(String),
    /// A line holding only whitespace.
    Blank,
}

impl OutputLine {
    /// Classifies a single line of output.
    pub fn parse(line: &str) -> Self {
        let cleaned = line.trim();

        if cleaned.is_empty() {
            return OutputLine::Blank;
        }
        if let Some(payload) = cleaned.strip_prefix(PROGRESS_PREFIX) {
            return OutputLine::Progress(Progress::parse(payload));
        }
        if let Some(path) = cleaned.strip_prefix(FILE_PREFIX) {
            return OutputLine::File(PathBuf::from(path));
        }

        OutputLine::Message(cleaned.to_string())
    }
}

fn is_missing(value: &str) -> bool {
    matches!(value, "" | "NA" | "None")
}

/// Parses an integer field; yt-dlp prints some of them as floats.
fn parse_int(value: &str) -> Option<u64> {
    let value = value.trim();
    if is_missing(value) {
        return None;
    }

    let parsed = value.parse::<f64>().ok()?;
    (parsed.is_finite() && parsed >= 0.0).then_some(parsed as u64)
}

fn parse_float(value: &str) -> Option<f64> {
    let value = value.trim();
    if is_missing(value) {
        return None;
    }

    value.parse::<f64>().ok()
}
