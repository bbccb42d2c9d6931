//! Engine configuration.

use crate::errors::DraftflowError;
use crate::pipeline::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Environment variable overriding `max_revisions`.
pub const ENV_MAX_REVISIONS: &str = "DRAFTFLOW_MAX_REVISIONS";
/// Environment variable overriding `retry.max_attempts`.
pub const ENV_MAX_RETRIES: &str = "DRAFTFLOW_MAX_RETRIES";
/// Environment variable overriding `retry.retry_delay_ms`.
pub const ENV_RETRY_DELAY_MS: &str = "DRAFTFLOW_RETRY_DELAY_MS";
/// Environment variable selecting [`FailurePolicy::Halt`].
pub const ENV_HALT_ON_STAGE_ERROR: &str = "DRAFTFLOW_HALT_ON_STAGE_ERROR";

/// What a run does when a stage fails after its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the error and keep going; finalize assembles what it can.
    #[default]
    Continue,
    /// End the run as failed, naming the stage.
    Halt,
}

fn default_max_revisions() -> u32 {
    2
}

fn default_event_channel_capacity() -> usize {
    256
}

/// Configuration of an [`Orchestrator`](crate::pipeline::Orchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Revision loops allowed per run; fixed when a run starts.
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Retry policy of every stage.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Handling of stage errors.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Buffer of channel subscribers.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults overridden by `DRAFTFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`DraftflowError::Config`] if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, DraftflowError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads defaults overridden by whatever `lookup` returns per variable.
    ///
    /// # Errors
    ///
    /// Returns [`DraftflowError::Config`] if a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DraftflowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_MAX_REVISIONS) {
            config.max_revisions = parse_var(ENV_MAX_REVISIONS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            let attempts: u32 = parse_var(ENV_MAX_RETRIES, &value)?;
            if attempts == 0 {
                return Err(DraftflowError::Config(format!(
                    "{ENV_MAX_RETRIES} must be at least 1"
                )));
            }
            config.retry.max_attempts = attempts;
        }
        if let Some(value) = lookup(ENV_RETRY_DELAY_MS) {
            config.retry.retry_delay_ms = parse_var(ENV_RETRY_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_HALT_ON_STAGE_ERROR) {
            config.failure_policy = if parse_flag(ENV_HALT_ON_STAGE_ERROR, &value)? {
                FailurePolicy::Halt
            } else {
                FailurePolicy::Continue
            };
        }

        Ok(config)
    }

    /// Sets the revision ceiling.
    #[must_use]
    pub const fn with_max_revisions(mut self, max_revisions: u32) -> Self {
        self.max_revisions = max_revisions;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the channel subscriber buffer.
    #[must_use]
    pub const fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, DraftflowError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DraftflowError::Config(format!("{key}={value:?}: {e}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, DraftflowError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(DraftflowError::Config(format!(
            "{key}={value:?}: expected a boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_revisions, 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.retry_delay_ms, 1000);
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.event_channel_capacity, 256);
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_revisions": 5}"#).unwrap();
        assert_eq!(config.max_revisions, 5);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.event_channel_capacity, 256);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_MAX_REVISIONS, "4"),
            (ENV_MAX_RETRIES, "5"),
            (ENV_RETRY_DELAY_MS, " 250 "),
            (ENV_HALT_ON_STAGE_ERROR, "true"),
        ]))
        .unwrap();

        assert_eq!(config.max_revisions, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retry_delay_ms, 250);
        assert_eq!(config.failure_policy, FailurePolicy::Halt);
    }

    #[test]
    fn test_from_lookup_rejects_invalid_values() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_MAX_REVISIONS, "two")])).unwrap_err();
        assert!(matches!(err, DraftflowError::Config(msg) if msg.contains(ENV_MAX_REVISIONS)));

        assert!(EngineConfig::from_lookup(lookup(&[(ENV_MAX_RETRIES, "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_HALT_ON_STAGE_ERROR, "maybe")])).is_err());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_max_revisions(0)
            .with_retry(RetryPolicy::no_retry())
            .with_failure_policy(FailurePolicy::Halt)
            .with_event_channel_capacity(8);
        assert_eq!(config.max_revisions, 0);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.failure_policy, FailurePolicy::Halt);
        assert_eq!(config.event_channel_capacity, 8);
    }
}
