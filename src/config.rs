// src/config.rs

//! Engine configuration
//!
//! Configuration is read once and bound into the objects that need it; there
//! is no process-wide settings store.
//!
//! # Example repository.toml
//!
//! ```toml
//! [repository]
//! id = "sabayon-weekly"
//! branch = "5"
//!
//! [cache]
//! enabled = true
//! path = "/var/lib/entropy/caches/match.json"
//!
//! [masking]
//! # Accepted system keywords
//! keywords = ["amd64"]
//!
//! package_mask = ["<dev-lang/python-2.7"]
//! package_unmask = ["=dev-lang/python-2.6.8"]
//! repository_mask = ["app-misc/broken"]
//! license_mask = ["EULA"]
//!
//! # User package.keywords; `repository` narrows a rule to one repository
//! # and a missing `atom` applies it to every package
//! [[masking.package_keywords]]
//! atom = "app-misc/foo"
//! keywords = ["~amd64"]
//!
//! [[masking.package_keywords]]
//! repository = "sabayon-limbo"
//! keywords = ["**"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default path for the engine configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/entropy/repository.toml";

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid atom '{atom}' in [masking].{list}: {reason}")]
    InvalidAtom {
        list: &'static str,
        atom: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub repository: RepositorySettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub masking: MaskingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySettings {
    /// Identifier of the repository, part of every cache key
    #[serde(default = "default_repository_id")]
    pub id: String,

    /// Branch recorded with new packages and treeupdates directives
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            id: default_repository_id(),
            branch: default_branch(),
        }
    }
}

fn default_repository_id() -> String {
    "main".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Where the match cache is persisted between runs
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Masking lists, all atoms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// Accepted system keywords; empty accepts everything
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub package_mask: Vec<String>,

    #[serde(default)]
    pub package_unmask: Vec<String>,

    #[serde(default)]
    pub package_keywords: Vec<KeywordRule>,

    /// Masks shipped with the repository itself
    #[serde(default)]
    pub repository_mask: Vec<String>,

    /// Keyword unmasks shipped with the repository itself
    #[serde(default)]
    pub repository_keywords: Vec<KeywordRule>,

    /// Licenses the user refuses
    #[serde(default)]
    pub license_mask: Vec<String>,

    #[serde(default)]
    pub live_mask: Vec<String>,

    #[serde(default)]
    pub live_unmask: Vec<String>,
}

/// Extra keywords accepted for some packages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    /// `None` applies the rule to every package
    #[serde(default)]
    pub atom: Option<String>,

    /// `None` applies the rule to every repository
    #[serde(default)]
    pub repository: Option<String>,

    pub keywords: Vec<String>,
}

/// Load configuration from the default or specified path
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    if !path.exists() {
        tracing::debug!("No configuration at {}, using defaults", path.display());
        return Ok(EngineConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.repository.id, "main");
        assert!(config.cache.enabled);
        assert!(config.masking.keywords.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let config = parse_config(
            r#"
            [repository]
            id = "weekly"

            [cache]
            enabled = false

            [masking]
            keywords = ["amd64"]
            package_mask = [">=app-misc/foo-2"]

            [[masking.package_keywords]]
            atom = "app-misc/foo"
            keywords = ["~amd64"]
            "#,
        )
        .unwrap();

        assert_eq!(config.repository.id, "weekly");
        assert_eq!(config.repository.branch, "main");
        assert!(!config.cache.enabled);
        assert_eq!(config.masking.package_mask, vec![">=app-misc/foo-2"]);
        assert_eq!(config.masking.package_keywords[0].atom.as_deref(), Some("app-misc/foo"));
        assert_eq!(config.masking.package_keywords[0].repository, None);
    }

    #[test]
    fn test_missing_file_is_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&temp_dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            parse_config("[masking]\nkeywords = 3"),
            Err(ConfigError::ParseError(_))
        ));
    }
}
