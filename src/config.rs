//! Configuration management for Fedigate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{GateError, Result};
use crate::ratelimit::{RuleKind, RuleSet};

/// Prefix for environment overrides, e.g. `FEDIGATE__RATE_LIMITING__DISABLED`.
const ENV_PREFIX: &str = "FEDIGATE";

/// Main configuration for Fedigate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Named rules; each rule's key is its name
    #[serde(default)]
    pub rules: BTreeMap<String, RuleKind>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Turn every limit check into a no-op
    #[serde(default)]
    pub disabled: bool,

    /// Bound on each counter store operation, in milliseconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Interval between sweeps of expired in-memory counters, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            store_timeout_ms: default_store_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_store_timeout() -> u64 {
    500
}

fn default_sweep_interval() -> u64 {
    60
}

impl RateLimitingConfig {
    /// Store timeout as a `Duration`.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl GateConfig {
    /// Load configuration from a YAML file, applying environment overrides.
    ///
    /// Rule names are kept as written. Environment overrides apply to the
    /// `rate_limiting` section only.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path).map_err(|e| {
            GateError::Config(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut loaded = Self::parse(&contents)?;

        let settings = config::Config::builder()
            .add_source(config::File::from_str(&contents, config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GateError::Config(e.to_string()))?;

        match settings.get::<RateLimitingConfig>("rate_limiting") {
            Ok(section) => loaded.rate_limiting = section,
            Err(config::ConfigError::NotFound(_)) => {}
            Err(e) => return Err(GateError::Config(e.to_string())),
        }

        loaded.validate()?;
        Ok(loaded)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Self::parse(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings and rules.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.store_timeout_ms == 0 {
            return Err(GateError::Config(
                "rate_limiting.store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        self.rule_set()?;
        Ok(())
    }

    /// Build the validated rule set.
    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::from_kinds(&self.rules)
    }

    fn parse(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

/// Shared switch that turns rate limiting off process-wide.
///
/// Cloning yields a handle to the same switch, so a configuration reload can
/// flip it for every limiter built from it.
#[derive(Debug, Clone, Default)]
pub struct DisabledFlag(Arc<AtomicBool>);

impl DisabledFlag {
    /// Create a flag with the given initial state.
    pub fn new(disabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(disabled)))
    }

    /// Whether rate limiting is currently disabled.
    pub fn is_disabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Enable or disable rate limiting.
    pub fn set(&self, disabled: bool) {
        self.0.store(disabled, Ordering::Release);
    }
}

impl From<&RateLimitingConfig> for DisabledFlag {
    fn from(config: &RateLimitingConfig) -> Self {
        Self::new(config.disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert!(!config.rate_limiting.disabled);
        assert_eq!(config.rate_limiting.store_timeout(), Duration::from_millis(500));
        assert_eq!(config.rate_limiting.sweep_interval(), Duration::from_secs(60));
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
rate_limiting:
  disabled: true
  store_timeout_ms: 250
rules:
  notes_create:
    type: legacy
    max: 300
    duration: 3600000
    minInterval: 1000
"#;
        let config = GateConfig::from_yaml(yaml).unwrap();
        assert!(config.rate_limiting.disabled);
        assert_eq!(config.rate_limiting.store_timeout_ms, 250);
        assert_eq!(config.rate_limiting.sweep_interval_secs, 60);

        let rules = config.rule_set().unwrap();
        assert!(rules.get("notes_create").is_some());
    }

    #[test]
    fn test_from_yaml_rejects_invalid_rule() {
        let yaml = r#"
rules:
  broken:
    type: bucket
    size: 0
"#;
        let err = GateConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, GateError::InvalidRule { ref key, .. } if key == "broken"));
    }

    #[test]
    fn test_from_yaml_rejects_garbage() {
        assert!(matches!(
            GateConfig::from_yaml("rules: [1, 2"),
            Err(GateError::Config(_))
        ));
    }

    #[test]
    fn test_from_yaml_rejects_zero_store_timeout() {
        let err = GateConfig::from_yaml("rate_limiting:\n  store_timeout_ms: 0\n").unwrap_err();
        assert!(matches!(err, GateError::Config(ref msg) if msg.contains("store_timeout_ms")));
    }

    fn write_temp_config(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "fedigate-{}-{}.yaml",
            name,
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", contents).unwrap();
        path
    }

    #[test]
    fn test_from_file() {
        let yaml = r#"
rate_limiting:
  store_timeout_ms: 100
rules:
  drive:
    type: bucket
    size: 10
"#;
        let path = write_temp_config("basic", yaml);

        let config = GateConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.rate_limiting.store_timeout_ms, 100);
        assert_eq!(config.rule_set().unwrap().len(), 1);
    }

    #[test]
    fn test_from_file_keeps_rule_name_case() {
        let yaml = r#"
rules:
  notesCreate:
    type: legacy
    max: 300
    duration: 3600000
    minInterval: 1000
  driveUpload:
    type: bucket
    size: 10
    dripRate: 500
"#;
        let path = write_temp_config("case", yaml);
        let from_file = GateConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let from_yaml = GateConfig::from_yaml(yaml).unwrap();

        let rules = from_file.rule_set().unwrap();
        assert_eq!(rules.get("notesCreate").unwrap().key, "notesCreate");
        assert_eq!(rules.get("driveUpload").unwrap().key, "driveUpload");
        assert!(rules.get("notescreate").is_none());
        assert_eq!(from_file.rules, from_yaml.rules);
    }

    #[test]
    fn test_from_file_applies_env_overrides() {
        let yaml = r#"
rate_limiting:
  store_timeout_ms: 100
rules:
  notesCreate:
    type: bucket
    size: 1
"#;
        let path = write_temp_config("env", yaml);
        std::env::set_var("FEDIGATE__RATE_LIMITING__SWEEP_INTERVAL_SECS", "5");
        let config = GateConfig::from_file(&path);
        std::env::remove_var("FEDIGATE__RATE_LIMITING__SWEEP_INTERVAL_SECS");
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.rate_limiting.sweep_interval_secs, 5);
        assert_eq!(config.rate_limiting.store_timeout_ms, 100);
        assert!(config.rule_set().unwrap().get("notesCreate").is_some());
    }

    #[test]
    fn test_from_file_missing() {
        let err = GateConfig::from_file("/nonexistent/fedigate.yaml").unwrap_err();
        assert!(matches!(err, GateError::Config(_)));
    }

    #[test]
    fn test_disabled_flag_is_shared() {
        let flag = DisabledFlag::new(false);
        let handle = flag.clone();

        handle.set(true);
        assert!(flag.is_disabled());

        let from_config = DisabledFlag::from(&RateLimitingConfig {
            disabled: true,
            ..Default::default()
        });
        assert!(from_config.is_disabled());
    }
}
