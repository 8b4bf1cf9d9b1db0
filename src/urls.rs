use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

const YOUTUBE_PATTERNS: [&str; 2] = [
    r"(?i)^(https?://)?((www|m|music)\.)?youtube\.com/.+",
    r"(?i)^(https?://)?youtu\.be/.+",
];

const INSTAGRAM_PATTERNS: [&str; 2] = [
    r"(?i)^(https?://)?((www|m)\.)?instagram\.com/.+",
    r"(?i)^(https?://)?instagr\.am/.+",
];

static YOUTUBE: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(&YOUTUBE_PATTERNS));
static INSTAGRAM: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(&INSTAGRAM_PATTERNS));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("site pattern is valid"))
        .collect()
}

/// The site a URL points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    YouTube,
    Instagram,
    Other,
}

impl Site {
    pub fn classify(url: &str) -> Self {
        let url = url.trim();

        if YOUTUBE.iter().any(|re| re.is_match(url)) {
            Site::YouTube
        } else if INSTAGRAM.iter().any(|re| re.is_match(url)) {
            Site::Instagram
        } else {
            Site::Other
        }
    }

    /// Instagram often refuses anonymous requests, so only it gets the browser cookie retries.
    pub fn wants_browser_cookies(&self) -> bool {
        matches!(self, Site::Instagram)
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Site::YouTube => write!(f, "YouTube"),
            Site::Instagram => write!(f, "Instagram"),
            Site::Other => write!(f, "other"),
        }
    }
}

/// Splits pasted text into URLs.
///
/// One URL per line is expected, but space separated pastes are split too. Empty entries are dropped and
/// duplicates removed, keeping the first occurrence.
pub fn normalize_urls(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    text.lines()
        .flat_map(str::split_whitespace)
        .filter(|url| seen.insert(*url))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_and_spaces_and_dedupes_in_order() {
        let text = "
            https://youtu.be/a  https://www.instagram.com/p/b/

            https://youtu.be/a
            https://youtu.be/c\r
        ";

        assert_eq!(
            normalize_urls(text),
            vec![
                "https://youtu.be/a",
                "https://www.instagram.com/p/b/",
                "https://youtu.be/c",
            ]
        );
    }

    #[test]
    fn blank_text_has_no_urls() {
        assert!(normalize_urls("").is_empty());
        assert!(normalize_urls(" \n\t\n").is_empty());
    }

    #[test]
    fn classifies_sites() {
        assert_eq!(Site::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), Site::YouTube);
        assert_eq!(Site::classify("https://music.youtube.com/watch?v=x"), Site::YouTube);
        assert_eq!(Site::classify("youtu.be/dQw4w9WgXcQ"), Site::YouTube);
        assert_eq!(Site::classify("HTTPS://WWW.INSTAGRAM.COM/reel/Cabc/"), Site::Instagram);
        assert_eq!(Site::classify("https://instagr.am/p/xyz"), Site::Instagram);
        assert_eq!(Site::classify("https://vimeo.com/123"), Site::Other);
        assert_eq!(Site::classify("https://notinstagram.com/p/xyz"), Site::Other);
    }

    #[test]
    fn only_instagram_retries_with_browser_cookies() {
        assert!(Site::Instagram.wants_browser_cookies());
        assert!(!Site::YouTube.wants_browser_cookies());
        assert!(!Site::Other.wants_browser_cookies());
    }
}
