//! The retry ladder: the ordered yt-dlp invocations tried for one URL.

use crate::error::{DownloadError, Result};
use crate::report::Reporter;
use crate::urls::Site;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use ytdlp_driver::model::DownloadArgs;

/// The browsers whose cookies are tried, in order, when none are configured.
pub const DEFAULT_BROWSERS: [&str; 3] = ["chrome", "edge", "firefox"];

/// One way of invoking yt-dlp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rung {
    /// A plain run, authenticated with the cookies file when one was given.
    Direct { cookies: Option<PathBuf> },
    /// A run reading the cookies of a local browser profile.
    BrowserCookies(String),
}

impl Rung {
    pub fn label(&self) -> String {
        match self {
            Rung::Direct { cookies: None } => "direct".to_string(),
            Rung::Direct { cookies: Some(_) } => "direct with cookies.txt".to_string(),
            Rung::BrowserCookies(browser) => format!("cookies from {}", browser),
        }
    }

    /// The line logged before this rung runs as a retry.
    pub fn retry_message(&self) -> Option<String> {
        match self {
            Rung::Direct { .. } => None,
            Rung::BrowserCookies(browser) => {
                Some(format!("Retrying with cookies from {}...", browser))
            }
        }
    }

    /// Adds the authentication flags of this rung.
    pub fn apply(&self, args: DownloadArgs) -> DownloadArgs {
        match self {
            Rung::Direct { cookies: Some(cookies) } => args.with_cookies(cookies),
            Rung::Direct { cookies: None } => args,
            Rung::BrowserCookies(browser) => args.with_cookies_from_browser(browser),
        }
    }
}

impl fmt::Display for Rung {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Plans the rungs for a URL of `site`.
///
/// Browser rungs are only planned for sites that need them and when `fallback` is on. An empty `browsers` list
/// means [`DEFAULT_BROWSERS`].
pub fn plan(site: Site, cookies: Option<&Path>, browsers: &[String], fallback: bool) -> Vec<Rung> {
    let mut rungs = vec![Rung::Direct {
        cookies: cookies.map(Path::to_path_buf),
    }];

    if !fallback || !site.wants_browser_cookies() {
        return rungs;
    }

    if browsers.is_empty() {
        rungs.extend(
            DEFAULT_BROWSERS
                .iter()
                .map(|browser| Rung::BrowserCookies(browser.to_string())),
        );
    } else {
        rungs.extend(browsers.iter().cloned().map(Rung::BrowserCookies));
    }

    rungs
}

/// Runs `attempt` for each rung until one succeeds.
///
/// A cancellation stops the climb at once. When the only rung fails its error is returned as is, otherwise the
/// error lists what every rung reported.
pub async fn climb<F, Fut>(
    url: &str,
    rungs: Vec<Rung>,
    reporter: &dyn Reporter,
    mut attempt: F,
) -> Result<()>
where
    F: FnMut(Rung) -> Fut,
    Fut: Future<Output = ytdlp_driver::error::Result<()>>,
{
    let mut failures: Vec<(String, ytdlp_driver::error::Error)> = Vec::new();

    for (index, rung) in rungs.into_iter().enumerate() {
        if index > 0 {
            if let Some(message) = rung.retry_message() {
                reporter.log(&message);
            }
        }

        let label = rung.label();
        log::debug!("Trying {} for {}", label, url);

        match attempt(rung).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_cancelled() => return Err(DownloadError::Cancelled),
            Err(e) => {
                reporter.log(&format!("Attempt failed ({}): {}", label, last_line(&e.to_string())));
                failures.push((label, e));
            }
        }
    }

    if failures.len() == 1 {
        if let Some((_, e)) = failures.pop() {
            return Err(DownloadError::Driver(e));
        }
    }

    let summary = failures
        .iter()
        .map(|(label, e)| format!("{}: {}", label, last_line(&e.to_string())))
        .collect::<Vec<_>>()
        .join("\n");

    Err(DownloadError::AllAttemptsFailed {
        url: url.to_string(),
        summary,
    })
}

fn last_line(message: &str) -> &str {
    message
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(message)
}
