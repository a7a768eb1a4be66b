//! Configuration for ranked and scored sets.
//!
//! Configuration is layered:
//! 1. Built-in defaults
//! 2. A TOML file, when one is given
//! 3. `TALLY_*` environment variables
//!
//! ```toml
//! [ranked_set]
//! levels = 6
//! level_fan_pow = 4
//! scan_batch_size = 256
//!
//! [retry]
//! max_retries = 100
//! initial_backoff_ms = 1
//! max_backoff_ms = 128
//! ```

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use snafu::Snafu;
use tally_kv::RetryPolicy;
use tally_kv::RetryPolicyError;

use crate::constants::DEFAULT_LEVEL_FAN_POW;
use crate::constants::DEFAULT_LEVELS;
use crate::constants::DEFAULT_SCAN_BATCH_SIZE;
use crate::constants::LEVEL_HASH_BITS;
use crate::constants::MAX_LEVEL_FAN_POW;
use crate::constants::MAX_LEVELS;
use crate::constants::MAX_SCAN_BATCH_SIZE;
use crate::constants::MIN_LEVELS;

/// Errors loading or validating configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to read config file {}: {source}", path.display()))]
    ReadFile { path: PathBuf, source: std::io::Error },

    #[snafu(display("failed to parse TOML config {}: {source}", path.display()))]
    ParseToml { path: PathBuf, source: toml::de::Error },

    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue { key: String, value: String, reason: String },

    #[snafu(display("invalid retry policy: {source}"))]
    InvalidRetry { source: RetryPolicyError },
}

mod defaults {
    use crate::constants::DEFAULT_LEVEL_FAN_POW;
    use crate::constants::DEFAULT_LEVELS;
    use crate::constants::DEFAULT_SCAN_BATCH_SIZE;

    pub fn levels() -> u8 {
        DEFAULT_LEVELS
    }

    pub fn level_fan_pow() -> u8 {
        DEFAULT_LEVEL_FAN_POW
    }

    pub fn scan_batch_size() -> u32 {
        DEFAULT_SCAN_BATCH_SIZE
    }
}

/// Geometry of a ranked set's level index.
///
/// Every process opening the same set must use the same `levels` and
/// `level_fan_pow`; they determine which records exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedSetConfig {
    /// Number of levels including the membership level 0.
    #[serde(default = "defaults::levels")]
    pub levels: u8,

    /// An element reaches level `l` with probability `2^-(l * level_fan_pow)`.
    #[serde(default = "defaults::level_fan_pow")]
    pub level_fan_pow: u8,

    /// Page size used when walking one level.
    #[serde(default = "defaults::scan_batch_size")]
    pub scan_batch_size: u32,
}

impl Default for RankedSetConfig {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS,
            level_fan_pow: DEFAULT_LEVEL_FAN_POW,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }
}

impl RankedSetConfig {
    /// Probability that an element present at level `l` also reaches `l + 1`.
    pub fn branching_probability(&self) -> f64 {
        0.5f64.powi(i32::from(self.level_fan_pow))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_LEVELS..=MAX_LEVELS).contains(&self.levels) {
            return Err(invalid(
                "ranked_set.levels",
                self.levels,
                format!("must be between {MIN_LEVELS} and {MAX_LEVELS}"),
            ));
        }
        if !(1..=MAX_LEVEL_FAN_POW).contains(&self.level_fan_pow) {
            return Err(invalid(
                "ranked_set.level_fan_pow",
                self.level_fan_pow,
                format!("must be between 1 and {MAX_LEVEL_FAN_POW}"),
            ));
        }
        let hash_bits = u32::from(self.levels - 1) * u32::from(self.level_fan_pow);
        if hash_bits > LEVEL_HASH_BITS {
            return Err(invalid(
                "ranked_set.level_fan_pow",
                self.level_fan_pow,
                format!("levels and level_fan_pow need {hash_bits} hash bits, only {LEVEL_HASH_BITS} available"),
            ));
        }
        if !(1..=MAX_SCAN_BATCH_SIZE).contains(&self.scan_batch_size) {
            return Err(invalid(
                "ranked_set.scan_batch_size",
                self.scan_batch_size,
                format!("must be between 1 and {MAX_SCAN_BATCH_SIZE}"),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default)]
    pub ranked_set: RankedSetConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl LayerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).context(ParseTomlSnafu { path: "<inline>" })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        let config: Self = toml::from_str(&content).context(ParseTomlSnafu { path })?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `TALLY_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    ///
    /// Recognized: `TALLY_LEVELS`, `TALLY_LEVEL_FAN_POW`,
    /// `TALLY_SCAN_BATCH_SIZE`, `TALLY_MAX_RETRIES`,
    /// `TALLY_INITIAL_BACKOFF_MS`, `TALLY_MAX_BACKOFF_MS`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where F: Fn(&str) -> Option<String> {
        override_from(&lookup, "TALLY_LEVELS", &mut self.ranked_set.levels)?;
        override_from(&lookup, "TALLY_LEVEL_FAN_POW", &mut self.ranked_set.level_fan_pow)?;
        override_from(&lookup, "TALLY_SCAN_BATCH_SIZE", &mut self.ranked_set.scan_batch_size)?;
        override_from(&lookup, "TALLY_MAX_RETRIES", &mut self.retry.max_retries)?;
        override_from(&lookup, "TALLY_INITIAL_BACKOFF_MS", &mut self.retry.initial_backoff_ms)?;
        override_from(&lookup, "TALLY_MAX_BACKOFF_MS", &mut self.retry.max_backoff_ms)?;
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ranked_set.validate()?;
        self.retry.validate().context(InvalidRetrySnafu)
    }
}

fn invalid(key: &str, value: impl ToString, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn override_from<F, T>(lookup: &F, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *target = raw.trim().parse().map_err(|e: T::Err| invalid(name, &raw, e.to_string()))?;
    }
    Ok(())
}
