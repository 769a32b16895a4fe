//! Engine configuration
//!
//! Settings are read from TOML, optionally layered with `RAPPORT__SECTION__KEY`
//! environment overrides, and validated before use.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{RapportError, Result};
use crate::smart_group::MembershipStrategy;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "RAPPORT";

/// Upper bound on a relationship's health threshold
pub const MAX_THRESHOLD_DAYS: i64 = 365;

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RapportConfig {
    pub health: HealthConfig,
    pub attention: AttentionConfig,
    pub digest: DigestConfig,
    pub smart_groups: SmartGroupConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Threshold used when a relationship has none of its own
    pub default_threshold_days: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            default_threshold_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    /// Needs-attention entries embedded in the weekly digest
    pub digest_limit: usize,

    /// Needs-attention entries embedded in the health summary
    pub summary_limit: usize,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            digest_limit: 10,
            summary_limit: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    pub period_days: i64,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self { period_days: 7 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartGroupConfig {
    /// TTL applied to cached membership sets
    pub cache_ttl_secs: u64,

    /// Budget for a single cache round-trip before failing open
    pub cache_timeout_ms: u64,

    pub default_strategy: MembershipStrategy,
}

impl SmartGroupConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }
}

impl Default for SmartGroupConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_timeout_ms: 250,
            default_strategy: MembershipStrategy::Cached,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held by the in-process cache
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

impl RapportConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: RapportConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, an optional TOML file and environment overrides
    ///
    /// Environment keys use double underscores between segments, e.g.
    /// `RAPPORT__SMART_GROUPS__CACHE_TTL_SECS=60`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("Loading settings from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: RapportConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let threshold = self.health.default_threshold_days;
        if !(1..=MAX_THRESHOLD_DAYS).contains(&threshold) {
            return Err(RapportError::InvalidSettings(format!(
                "health.default_threshold_days must be between 1 and {}",
                MAX_THRESHOLD_DAYS
            )));
        }

        if self.attention.digest_limit == 0 || self.attention.summary_limit == 0 {
            return Err(RapportError::InvalidSettings(
                "attention limits must be at least 1".to_string(),
            ));
        }

        if self.digest.period_days != 7 {
            return Err(RapportError::InvalidSettings(
                "digest.period_days must be 7".to_string(),
            ));
        }

        if self.smart_groups.cache_ttl_secs == 0 {
            return Err(RapportError::InvalidSettings(
                "smart_groups.cache_ttl_secs must be at least 1".to_string(),
            ));
        }

        if self.smart_groups.cache_timeout_ms == 0 {
            return Err(RapportError::InvalidSettings(
                "smart_groups.cache_timeout_ms must be at least 1".to_string(),
            ));
        }

        if self.cache.capacity == 0 {
            return Err(RapportError::InvalidSettings(
                "cache.capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| RapportError::InvalidSettings(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = RapportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.smart_groups.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.health.default_threshold_days, 30);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RapportConfig::from_toml(
            r#"
            [health]
            default_threshold_days = 14

            [smart_groups]
            default_strategy = "lazy"
            "#,
        )
        .unwrap();

        assert_eq!(config.health.default_threshold_days, 14);
        assert_eq!(config.smart_groups.default_strategy, MembershipStrategy::Lazy);
        assert_eq!(config.smart_groups.cache_ttl_secs, 300);
        assert_eq!(config.attention.digest_limit, 10);
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let mut config = RapportConfig::default();
        config.health.default_threshold_days = 0;
        let result = config.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("default_threshold_days must be between"));

        config.health.default_threshold_days = 366;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_period_is_fixed() {
        let result = RapportConfig::from_toml("[digest]\nperiod_days = 14\n");
        assert!(matches!(result, Err(RapportError::InvalidSettings(_))));
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = RapportConfig::default();
        config.smart_groups.cache_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let result = RapportConfig::from_toml("[health\ndefault_threshold_days = ");
        assert!(matches!(result, Err(RapportError::Toml(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rapport.toml");

        let mut config = RapportConfig::default();
        config.attention.summary_limit = 5;
        config.to_file(&path).unwrap();

        let loaded = RapportConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    #[serial]
    fn test_load_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rapport.toml");
        std::fs::write(&path, "[smart_groups]\ncache_ttl_secs = 120\n").unwrap();

        env::set_var("RAPPORT__SMART_GROUPS__CACHE_TTL_SECS", "60");
        let config = RapportConfig::load(Some(&path));
        env::remove_var("RAPPORT__SMART_GROUPS__CACHE_TTL_SECS");

        let config = config.unwrap();
        assert_eq!(config.smart_groups.cache_ttl_secs, 60);
        assert_eq!(config.health.default_threshold_days, 30);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RapportConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, RapportConfig::default());
    }
}
