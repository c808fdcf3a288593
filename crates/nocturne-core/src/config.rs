use serde::{Deserialize, Serialize};

use crate::bands::DriftSeverity;
use crate::constants::{
    DEFAULT_DEADLINE_MS, DEFAULT_DRIFT_WARNING, DEFAULT_MEMORY_LIMIT, DEFAULT_TOKEN_BUDGET,
};
use crate::error::ConfigError;

/// Knobs for one compiler instance. Validated once at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Global token budget for the composed preamble.
    pub token_budget: usize,
    /// Subsystems still pending after this many milliseconds are dropped.
    pub deadline_ms: u64,
    /// Lower bound of the drift `warning` band.
    pub drift_warning_threshold: f64,
    /// Shift applied to UTC before mapping the hour to a time of day.
    pub utc_offset_hours: i32,
    /// Notes offered to the memory section.
    pub memory_limit: usize,
    /// Fixed seed for reproducible sampling. `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            token_budget: DEFAULT_TOKEN_BUDGET,
            deadline_ms: DEFAULT_DEADLINE_MS,
            drift_warning_threshold: DEFAULT_DRIFT_WARNING,
            utc_offset_hours: 0,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            rng_seed: None,
        }
    }
}

impl CompileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_budget == 0 {
            return Err(ConfigError::InvalidSetting(
                "token_budget must be positive".into(),
            ));
        }
        if self.deadline_ms == 0 {
            return Err(ConfigError::InvalidSetting(
                "deadline_ms must be positive".into(),
            ));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::InvalidSetting(format!(
                "utc_offset_hours {} is not a real offset",
                self.utc_offset_hours
            )));
        }
        DriftSeverity::table(self.drift_warning_threshold)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CompileConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_budget = CompileConfig {
            token_budget: 0,
            ..Default::default()
        };
        assert!(bad_budget.validate().is_err());

        let bad_drift = CompileConfig {
            drift_warning_threshold: 0.95,
            ..Default::default()
        };
        assert!(matches!(
            bad_drift.validate(),
            Err(ConfigError::InvalidSetting(_))
        ));

        let bad_offset = CompileConfig {
            utc_offset_hours: 30,
            ..Default::default()
        };
        assert!(bad_offset.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: CompileConfig = serde_json::from_str(r#"{"token_budget": 120}"#).unwrap();
        assert_eq!(cfg.token_budget, 120);
        assert_eq!(cfg.deadline_ms, DEFAULT_DEADLINE_MS);
        assert!(cfg.rng_seed.is_none());
    }
}
