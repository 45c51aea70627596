//! Cook run configuration, read from a TOML file.
//!
//! ```toml
//! [sandbox]
//! max_memory_bytes = 8388608
//! timeout_ms = 300
//!
//! [snapshot]
//! max_parallel_collections = 4
//!
//! [events]
//! window_days = 30
//!
//! [run]
//! branch_lock = true
//! ```
//!
//! Every field is optional. A missing file means defaults; an unreadable or
//! malformed one also means defaults, with a warning.

use cookline_sandbox::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Collections duplicated at the same time.
    pub max_parallel_collections: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_parallel_collections: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Length of the rolling occurrence window, starting at the run's `now`.
    pub window_days: i64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Refuse a second concurrent run against the same target branch.
    pub branch_lock: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { branch_lock: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookConfig {
    pub sandbox: ResourceLimits,
    pub snapshot: SnapshotConfig,
    pub events: EventsConfig,
    pub run: RunConfig,
}

impl CookConfig {
    /// Loads configuration from `path`, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No cook config found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<CookConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded cook config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse cook config {:?}: {}. Falling back to defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read cook config {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_from_str(contents: &str) -> CookConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cook.toml");
        std::fs::write(&path, contents).unwrap();
        CookConfig::load_from(&path)
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CookConfig::load_from(&dir.path().join("absent.toml"));
        assert_eq!(config, CookConfig::default());
        assert_eq!(config.sandbox.timeout_ms, 300);
        assert_eq!(config.snapshot.max_parallel_collections, 4);
        assert_eq!(config.events.window_days, 30);
        assert!(config.run.branch_lock);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = load_from_str(
            r#"
[sandbox]
timeout_ms = 50

[run]
branch_lock = false
"#,
        );
        assert_eq!(config.sandbox.timeout_ms, 50);
        assert_eq!(config.sandbox.max_memory_bytes, 8 * 1024 * 1024);
        assert!(!config.run.branch_lock);
        assert_eq!(config.events, EventsConfig::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let config = load_from_str("this is not valid toml {{{{");
        assert_eq!(config, CookConfig::default());
    }

    #[test]
    fn unreadable_path_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CookConfig::load_from(dir.path());
        assert_eq!(config, CookConfig::default());
    }
}
