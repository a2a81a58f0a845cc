// Application settings
// Loaded from ~/.config/tabula/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What `tabula run` prints after the script when no `--print` is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintMode {
    /// Print nothing
    #[default]
    None,
    /// Evaluated values
    Values,
    /// Raw cell texts
    Texts,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Output
    #[serde(rename = "print.mode")]
    pub print_mode: PrintMode,

    #[serde(rename = "print.showSize")]
    pub show_size: bool,

    // Diagnostics
    #[serde(rename = "log.level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            print_mode: PrintMode::None,
            show_size: false,
            log_level: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tabula")
            .join("settings.json")
    }

    /// Load settings from the default location.
    ///
    /// A missing file yields defaults. An unreadable or invalid file also
    /// yields defaults, together with the error so the caller can warn once
    /// logging is set up.
    pub fn load() -> (Self, Option<ConfigError>) {
        let path = Self::config_path();
        if !path.exists() {
            return (Self::default(), None);
        }

        match Self::load_from(&path) {
            Ok(settings) => (settings, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Load settings from an explicit path.
    ///
    /// Lines starting with `//` are treated as comments.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save settings to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        // Serializing a plain struct of strings/bools cannot fail
        let json = serde_json::to_string_pretty(self).unwrap_or_default();
        fs::write(path, json).map_err(write_err)
    }
}
