//! Engine Configuration
//!
//! Cache lifetime, legacy migration switch and storage key names.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration parse failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of a cached enrolment/access envelope in seconds (default: none)
    #[serde(default)]
    pub results_ttl_secs: Option<u64>,

    /// Whether the manual provider may run the legacy enrolment migration (default: true)
    #[serde(default = "default_legacy_enrolment_migration")]
    pub legacy_enrolment_migration: bool,

    /// Option holding the enrolment site salt
    #[serde(default = "default_site_salt_option")]
    pub site_salt_option: String,

    /// Prefix of the learner meta keys holding envelopes
    #[serde(default = "default_results_meta_prefix")]
    pub results_meta_prefix: String,
}

fn default_legacy_enrolment_migration() -> bool {
    true
}

fn default_site_salt_option() -> String {
    "sensei_course_enrolment_site_salt".to_string()
}

fn default_results_meta_prefix() -> String {
    "sensei_course_".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            results_ttl_secs: None,
            legacy_enrolment_migration: default_legacy_enrolment_migration(),
            site_salt_option: default_site_salt_option(),
            results_meta_prefix: default_results_meta_prefix(),
        }
    }
}

impl EngineConfig {
    /// Parse from TOML; missing keys take their defaults
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Parse from JSON; missing keys take their defaults
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Config with an envelope TTL
    pub fn with_results_ttl(secs: u64) -> Self {
        Self {
            results_ttl_secs: Some(secs),
            ..Default::default()
        }
    }

    pub fn results_ttl(&self) -> Option<Duration> {
        self.results_ttl_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(Duration::seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.results_ttl_secs, None);
        assert!(config.legacy_enrolment_migration);
        assert_eq!(config.site_salt_option, "sensei_course_enrolment_site_salt");
        assert!(config.results_ttl().is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str(
            "results_ttl_secs = 3600\nlegacy_enrolment_migration = false\n",
        )
        .unwrap();

        assert_eq!(config.results_ttl(), Some(Duration::hours(1)));
        assert!(!config.legacy_enrolment_migration);
        assert_eq!(config.results_meta_prefix, "sensei_course_");
    }

    #[test]
    fn test_json_config() {
        let config = EngineConfig::from_json_str(r#"{"site_salt_option":"salt"}"#).unwrap();
        assert_eq!(config.site_salt_option, "salt");
        assert!(config.legacy_enrolment_migration);
    }

    #[test]
    fn test_invalid_toml_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("results_ttl_secs = \"soon\""),
            Err(ConfigError::Toml(_))
        ));
    }
}
