//! Detector configuration
//!
//! Loaded from an optional TOML file; every section has working defaults
//! and the command line overrides individual values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpoofmonError};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub prefixes: PrefixSettings,
    pub symmetry: SymmetrySettings,
    pub newflow: NewFlowSettings,
}

/// Prefix file locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefixSettings {
    /// Bogon prefix file. Mandatory; the detector refuses to start
    /// without it.
    pub bogons: Option<PathBuf>,

    /// Operator network prefixes watched by the own-network and new-flow
    /// checks. Optional; without it those checks match nothing.
    pub networks: Option<PathBuf>,
}

/// Symmetric-route filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetrySettings {
    /// Seconds before a witness entry is rewritten instead of extended.
    pub rewrite_window_secs: u64,
}

impl Default for SymmetrySettings {
    fn default() -> Self {
        Self {
            rewrite_window_secs: 45,
        }
    }
}

/// New-flow counter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewFlowSettings {
    /// Distinct aggregated sources allowed per watched prefix and window
    /// before records are flagged.
    pub threshold: u64,

    /// Window, in record-time seconds, between filter rotations.
    pub swap_window_secs: u64,

    /// Projected distinct sources per window, sizing each Bloom filter.
    pub projected_flows: usize,

    /// Target Bloom false-positive probability at the projected load.
    pub false_positive_rate: f64,
}

impl Default for NewFlowSettings {
    fn default() -> Self {
        Self {
            threshold: 1000,
            swap_window_secs: 3600,
            projected_flows: 1_000_000,
            false_positive_rate: 0.01,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SpoofmonError::Config(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SpoofmonError::Config(format!("failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.prefixes.bogons.is_none());
        assert_eq!(config.symmetry.rewrite_window_secs, 45);
        assert_eq!(config.newflow.threshold, 1000);
        assert_eq!(config.newflow.swap_window_secs, 3600);
        assert_eq!(config.newflow.projected_flows, 1_000_000);
        assert_eq!(config.newflow.false_positive_rate, 0.01);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml(
            r#"
[prefixes]
bogons = "/etc/spoofmon/bogons.txt"

[newflow]
threshold = 500
"#,
        )
        .unwrap();

        assert_eq!(
            config.prefixes.bogons.as_deref(),
            Some(Path::new("/etc/spoofmon/bogons.txt"))
        );
        assert_eq!(config.newflow.threshold, 500);
        // untouched sections keep their defaults
        assert_eq!(config.symmetry.rewrite_window_secs, 45);
        assert_eq!(config.newflow.projected_flows, 1_000_000);
    }

    #[test]
    fn test_parse_error() {
        assert!(Config::from_toml("prefixes = 3").is_err());
    }
}
