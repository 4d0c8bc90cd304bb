//! Vault configuration.
//!
//! Everything the coordinator needs arrives through this struct — there is
//! no implicit root directory or process-global environment.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Configuration for one vault: where snapshots live and the opaque
/// environment handed through to ingest routines (credentials, retry
/// counts — the coordinator never interprets these).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub environ: BTreeMap<String, String>,
}

fn default_root() -> PathBuf {
    PathBuf::from("vault")
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            environ: BTreeMap::new(),
        }
    }
}

impl VaultConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml(s: &str) -> Result<Self, IngestError> {
        toml::from_str(s).map_err(|e| IngestError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Insert or replace one environment entry.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.environ.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_absent() {
        let config = VaultConfig::from_toml("").unwrap();
        assert_eq!(config.root, PathBuf::from("vault"));
        assert!(config.environ.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = VaultConfig::from_toml(
            r#"
root = "/srv/marketdata"

[environ]
CSVDIR = "/srv/csv"
API_KEY = "secret"
"#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/marketdata"));
        assert_eq!(config.environ["CSVDIR"], "/srv/csv");
        assert_eq!(config.environ["API_KEY"], "secret");
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = VaultConfig::from_toml("root = [").unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let mut config = VaultConfig::with_root("/data");
        config.set_env("CSVDIR", "/csv");
        let serialized = toml::to_string(&config).unwrap();
        let back = VaultConfig::from_toml(&serialized).unwrap();
        assert_eq!(back, config);
    }
}
