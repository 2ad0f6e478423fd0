use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration for a course-store archive directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Timeout, in seconds, for textbook table-of-contents fetches.
    ///
    /// The fetch is a blocking external-network call; it must fail fast
    /// rather than hang.
    toc_timeout_secs: u64,

    /// Whether to allow the archive directory to contain YAML files that
    /// are not valid course archives.
    pub allow_unrecognised: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            toc_timeout_secs: default_toc_timeout_secs(),
            allow_unrecognised: false,
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content
    /// is invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML
    /// or if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// The table-of-contents fetch timeout.
    #[must_use]
    pub const fn toc_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.toc_timeout_secs)
    }
}

const fn default_toc_timeout_secs() -> u64 {
    10
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the
/// domain type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_toc_timeout_secs")]
        toc_timeout_secs: u64,

        #[serde(default)]
        allow_unrecognised: bool,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                toc_timeout_secs,
                allow_unrecognised,
            } => Self {
                toc_timeout_secs,
                allow_unrecognised,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            toc_timeout_secs: config.toc_timeout_secs,
            allow_unrecognised: config.allow_unrecognised,
        }
    }
}
