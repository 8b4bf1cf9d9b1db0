//! The optional settings file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The directory name under the user config directory.
pub const CONFIG_DIR_NAME: &str = "VideoDownloader";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Settings read from `config.toml`. Every key is optional and command line flags win over them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: Option<PathBuf>,
    pub cookies: Option<PathBuf>,
    pub merge_output_format: Option<String>,
    pub browsers: Option<Vec<String>>,
    pub tools_dir: Option<PathBuf>,
    pub browser_fallback: Option<bool>,
}

impl Config {
    /// The location of the settings file, when the platform has a config directory.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads the settings file, falling back to the defaults when it is missing or unreadable.
    pub fn load() -> Self {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Loads the settings at `path`.
    ///
    /// A malformed file is logged and ignored; it is left on disk for the user to fix.
    pub fn load_from(path: &Path) -> Self {
        if !path.is_file() {
            return Self::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::error!("Could not read config file {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match Self::parse(&content) {
            Ok(config) => {
                log::debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::error!("Malformed config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_files() {
        let config = Config::parse(
            r#"
            output_dir = "/videos"
            browsers = ["firefox"]
            browser_fallback = false
            "#,
        )
        .unwrap();

        assert_eq!(config.output_dir, Some(PathBuf::from("/videos")));
        assert_eq!(config.browsers, Some(vec!["firefox".to_string()]));
        assert_eq!(config.browser_fallback, Some(false));
        assert_eq!(config.cookies, None);
        assert_eq!(config.merge_output_format, None);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();

        assert_eq!(Config::load_from(&temp.path().join(CONFIG_FILE_NAME)), Config::default());
    }

    #[test]
    fn malformed_file_is_ignored_and_kept() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "output_dir = [not toml").unwrap();

        assert_eq!(Config::load_from(&path), Config::default());
        assert!(path.exists());
    }

    #[test]
    fn path_ends_with_the_app_directory() {
        if let Some(path) = Config::path() {
            assert!(path.ends_with(Path::new(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)));
        }
    }
}
