//! Engine configuration

use crate::error::ConfigError;
use apex_scheduler::StrategyKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a batch is executed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Balanced groups, optimistic validation, fallback for the rest
    #[default]
    Speculative,
    /// Conflict-aware plan from predicted footprints
    Partitioned,
    /// Round-based optimistic concurrency control, kept as a baseline
    Occ,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Speculative worker count
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Execution mode
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Grouping strategies the scheduler compares
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,
    /// Reject plans that run a conflicting pair out of tid order
    #[serde(default = "default_true")]
    pub preserve_order: bool,
    /// Re-run serially when an observed footprint escapes its schedule
    #[serde(default = "default_true")]
    pub verify_footprints: bool,
    /// Warm the snapshot cache from the batch's footprints
    #[serde(default = "default_true")]
    pub prefetch: bool,
    /// Fallback log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_workers() -> usize {
    4
}

fn default_strategies() -> Vec<StrategyKind> {
    StrategyKind::ALL.to_vec()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            mode: ExecutionMode::default(),
            strategies: default_strategies(),
            preserve_order: default_true(),
            verify_footprints: default_true(),
            prefetch: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate TOML
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.strategies.is_empty() {
            return Err(ConfigError::Invalid("strategies must not be empty".into()));
        }
        Ok(())
    }

    /// Builder: worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Builder: execution mode
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder: keep conflicting transactions in tid order
    pub fn with_preserve_order(mut self, preserve: bool) -> Self {
        self.preserve_order = preserve;
        self
    }

    /// Builder: scheduler strategies
    pub fn with_strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.strategies = strategies;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.mode, ExecutionMode::Speculative);
        assert_eq!(config.strategies.len(), 3);
        assert!(config.preserve_order);
        assert!(config.verify_footprints);
        assert!(config.prefetch);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            workers = 8
            mode = "partitioned"
            strategies = ["mis", "components"]
            verify_footprints = false
            preserve_order = false
        "#;
        let config = EngineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.mode, ExecutionMode::Partitioned);
        assert_eq!(
            config.strategies,
            vec![StrategyKind::Mis, StrategyKind::Components]
        );
        assert!(!config.verify_footprints);
        assert!(!config.preserve_order);
        assert!(config.prefetch);

        let occ = EngineConfig::from_toml_str("mode = \"occ\"").unwrap();
        assert_eq!(occ.mode, ExecutionMode::Occ);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = EngineConfig::default()
            .with_workers(2)
            .with_mode(ExecutionMode::Partitioned);
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("partitioned"));
        assert_eq!(EngineConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            EngineConfig::from_toml_str("workers = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("strategies = []"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("mode = \"eager\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            EngineConfig::load("/nonexistent/apex.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
