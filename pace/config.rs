//! Run configuration, read from TOML.
//!
//! Every section and every field is optional; missing values fall back to the schedules
//! listed in each `Default` impl. `PacerConfig::validate` is called by the loader, so
//! a config obtained from [`load_config`] is always usable.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// How the whole dataset is divided before training.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub training_fraction: f64,
    /// Seed for the permutation. `None` draws a seed from the operating system.
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            training_fraction: 0.6,
            seed: None,
        }
    }
}

/// Schedule of the linear curriculum: the residual threshold grows each round.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinearConfig {
    pub initial_threshold: f64,
    pub threshold_increment: f64,
    pub max_rounds: usize,
    /// Training stops once more than this fraction of the training rows is admitted.
    pub admitted_fraction: f64,
    /// Two consecutive inner fits are equal when no weight moves by more than this.
    pub convergence_tolerance: f64,
    /// Upper bound on refits per round. `1` disables the inner fixed-point search.
    pub max_inner_iterations: usize,
}

impl Default for LinearConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 0.2,
            threshold_increment: 0.2,
            max_rounds: 10,
            admitted_fraction: 0.8,
            convergence_tolerance: 1e-9,
            max_inner_iterations: 100,
        }
    }
}

/// Schedule of the logistic curriculum: the residual threshold shrinks each round.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticConfig {
    pub initial_threshold: f64,
    pub threshold_decrement: f64,
    pub max_rounds: usize,
    pub admitted_fraction: f64,
    /// Training stops once the threshold drops below this value.
    pub min_threshold: f64,
    /// Step size of the gradient ascent.
    pub learning_rate: f64,
    /// Number of gradient ascent steps per fit.
    pub cycles: usize,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 2.0,
            threshold_decrement: 0.1,
            max_rounds: 100,
            admitted_fraction: 0.9,
            min_threshold: 0.001,
            learning_rate: 0.001,
            cycles: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpldConfig {
    /// Base leniency shared by every rank.
    pub lambda: f64,
    /// Diversity bonus, spread over ranks as `gamma / (sqrt(k) + sqrt(k - 1))`.
    pub gamma: f64,
}

impl Default for SpldConfig {
    fn default() -> Self {
        Self {
            lambda: 0.05,
            gamma: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacerConfig {
    pub split: SplitConfig,
    pub linear: LinearConfig,
    pub logistic: LogisticConfig,
    pub spld: SpldConfig,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} is not within [0, 1]")))
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("{value} must be a finite, non-negative number")))
    }
}

fn check_positive_count(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(invalid(field, "must be at least 1"))
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction("split.training_fraction", self.training_fraction)
    }
}

impl LinearConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("linear.initial_threshold", self.initial_threshold)?;
        check_non_negative("linear.threshold_increment", self.threshold_increment)?;
        check_positive_count("linear.max_rounds", self.max_rounds)?;
        check_fraction("linear.admitted_fraction", self.admitted_fraction)?;
        check_non_negative("linear.convergence_tolerance", self.convergence_tolerance)?;
        check_positive_count("linear.max_inner_iterations", self.max_inner_iterations)
    }
}

impl LogisticConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("logistic.initial_threshold", self.initial_threshold)?;
        check_non_negative("logistic.threshold_decrement", self.threshold_decrement)?;
        check_positive_count("logistic.max_rounds", self.max_rounds)?;
        check_fraction("logistic.admitted_fraction", self.admitted_fraction)?;
        check_non_negative("logistic.min_threshold", self.min_threshold)?;
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid(
                "logistic.learning_rate",
                format!("{} must be positive", self.learning_rate),
            ));
        }
        check_positive_count("logistic.cycles", self.cycles)
    }
}

impl SpldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.lambda.is_finite() {
            return Err(invalid("spld.lambda", "must be finite"));
        }
        check_non_negative("spld.gamma", self.gamma)
    }
}

impl PacerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.split.validate()?;
        self.linear.validate()?;
        self.logistic.validate()?;
        self.spld.validate()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}

/// Reads and validates a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<PacerConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    PacerConfig::from_toml_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_yields_defaults() {
        let config = PacerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PacerConfig::default());
        assert_eq!(config.linear.max_rounds, 10);
        assert_eq!(config.logistic.cycles, 1000);
        assert_eq!(config.split.seed, None);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let text = "
[split]
seed = 7

[logistic]
initial_threshold = 1.5
cycles = 50
";
        let config = PacerConfig::from_toml_str(text).unwrap();
        assert_eq!(config.split.seed, Some(7));
        assert_eq!(config.split.training_fraction, 0.6);
        assert_eq!(config.logistic.initial_threshold, 1.5);
        assert_eq!(config.logistic.cycles, 50);
        assert_eq!(config.logistic.threshold_decrement, 0.1);
        assert_eq!(config.linear, LinearConfig::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = PacerConfig::from_toml_str("[linear]\nadmitted_fraction = 1.2\n").unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "linear.admitted_fraction"),
            other => panic!("Expected Invalid, got {:?}", other),
        }

        let err = PacerConfig::from_toml_str("[logistic]\nlearning_rate = 0.0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "logistic.learning_rate",
                ..
            }
        ));

        let err = PacerConfig::from_toml_str("[linear]\nmax_inner_iterations = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "linear.max_inner_iterations",
                ..
            }
        ));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = PacerConfig::from_toml_str("[linear]\nthreshold = 0.3\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[spld]\nlambda = 0.0\ngamma = 0.285").unwrap();
        file.flush().unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.spld.lambda, 0.0);
        assert_eq!(config.spld.gamma, 0.285);
    }
}
