//! Runtime configuration for persona agents.
//!
//! Values resolve in three layers: built-in defaults, an optional JSON file,
//! then `AGENT_*` environment variables. Call [`RuntimeConfig::validate`]
//! once the layers are applied.

#![warn(missing_docs, clippy::pedantic)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "AGENT_";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read config file `{path}`: {source}")]
    ReadFile {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration document is not valid JSON for [`RuntimeConfig`].
    #[error("could not parse config: {source}")]
    Parse {
        /// Underlying decoder error.
        #[from]
        source: serde_json::Error,
    },
    /// An environment variable held a value of the wrong type.
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// A value is out of range.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Tunables consumed by the agent runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Size of the recent dialogue window.
    pub recent_message_count: usize,
    /// Maximum in-progress goals placed in context.
    pub goal_count: usize,
    /// Similarity floor for background lore.
    pub lore_match_threshold: f32,
    /// Number of lore snippets placed in context.
    pub lore_match_count: usize,
    /// Similarity floor for general memory searches.
    pub match_threshold: f32,
    /// Similarity at which two memories in one room are duplicates.
    pub duplicate_threshold: f32,
    /// Generation attempts before falling back.
    pub completion_attempts: usize,
    /// Deadline for each backend call, in seconds.
    pub request_timeout_secs: u64,
    /// Pause between successive evaluator writes, in milliseconds.
    pub evaluator_write_delay_ms: u64,
    /// Turns processed concurrently by the scheduler.
    pub max_concurrent_turns: usize,
    /// Sampling temperature passed to the generation backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap passed to the generation backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recent_message_count: 32,
            goal_count: 10,
            lore_match_threshold: 0.5,
            lore_match_count: 5,
            match_threshold: 0.1,
            duplicate_threshold: 0.95,
            completion_attempts: 3,
            request_timeout_secs: 60,
            evaluator_write_delay_ms: 0,
            max_concurrent_turns: 32,
            temperature: None,
            max_output_tokens: None,
        }
    }
}

impl RuntimeConfig {
    /// Parses a JSON document. Omitted fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields.
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadFile`] or [`ConfigError::Parse`].
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Applies `AGENT_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvOverride`] when a variable does not parse.
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides_from(|key| env::var(key).ok())
    }

    /// Applies overrides read through `lookup`, keyed by the full variable
    /// name (for example `AGENT_RECENT_MESSAGE_COUNT`). Blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnvOverride`] when a value does not parse.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (key, value))
        };

        if let Some((key, value)) = read("RECENT_MESSAGE_COUNT") {
            self.recent_message_count = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("GOAL_COUNT") {
            self.goal_count = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("LORE_MATCH_THRESHOLD") {
            self.lore_match_threshold = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("LORE_MATCH_COUNT") {
            self.lore_match_count = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("MATCH_THRESHOLD") {
            self.match_threshold = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("DUPLICATE_THRESHOLD") {
            self.duplicate_threshold = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("COMPLETION_ATTEMPTS") {
            self.completion_attempts = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("EVALUATOR_WRITE_DELAY_MS") {
            self.evaluator_write_delay_ms = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("MAX_CONCURRENT_TURNS") {
            self.max_concurrent_turns = parse(&key, &value)?;
        }
        if let Some((key, value)) = read("TEMPERATURE") {
            self.temperature = Some(parse(&key, &value)?);
        }
        if let Some((key, value)) = read("MAX_OUTPUT_TOKENS") {
            self.max_output_tokens = Some(parse(&key, &value)?);
        }
        Ok(self)
    }

    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        let nonzero = [
            ("recent_message_count", self.recent_message_count),
            ("completion_attempts", self.completion_attempts),
            ("max_concurrent_turns", self.max_concurrent_turns),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be greater than zero".to_owned(),
            ));
        }

        let similarities = [
            ("lore_match_threshold", self.lore_match_threshold),
            ("match_threshold", self.match_threshold),
            ("duplicate_threshold", self.duplicate_threshold),
        ];
        for (name, value) in similarities {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "{name} must be within [-1, 1], got {value}"
                )));
            }
        }

        if let Some(temperature) = self
            .temperature
            .filter(|value| !(0.0..=2.0).contains(value))
        {
            return Err(ConfigError::Validation(format!(
                "temperature must be within [0, 2], got {temperature}"
            )));
        }
        Ok(())
    }

    /// Deadline applied to every backend call.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Pause inserted between evaluator writes.
    #[must_use]
    pub const fn evaluator_write_delay(&self) -> Duration {
        Duration::from_millis(self.evaluator_write_delay_ms)
    }

    /// Bound used for derived-memory windows: half the dialogue window, at least one.
    #[must_use]
    pub fn derived_memory_count(&self) -> usize {
        (self.recent_message_count / 2).max(1)
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride {
            key: key.to_owned(),
            value: value.to_owned(),
        })
}
