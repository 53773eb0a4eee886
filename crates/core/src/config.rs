//! # Lab Configuration
//!
//! Run parameters for the executor plus model selection for the stage
//! workers. Loaded from `ARCSYS_*` environment variables by the server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::models::{LlmProvider, ModelConfig};

/// What the critique gate does when retries run out below the threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Advance with the low score and flag `exhausted_retries`
    #[default]
    SoftPass,
    /// Abort the run with `RETRY_BUDGET_EXHAUSTED`
    Fail,
}

/// Upper bound on the per-stage timeout, in seconds
pub const MAX_STAGE_TIMEOUT_SECS: u64 = 1800;

/// Parameters of a single run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Critique score (0-10) a pass must reach to skip the retry edge
    pub critic_threshold: f64,
    /// Maximum number of times the retry edge may fire
    pub max_retries: u32,
    /// Deadline for each individual stage invocation
    #[serde(with = "duration_secs")]
    pub per_stage_timeout: Duration,
    #[serde(default)]
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            critic_threshold: 7.0,
            max_retries: 3,
            per_stage_timeout: Duration::from_secs(300),
            on_exhausted: ExhaustionPolicy::SoftPass,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=10.0).contains(&self.critic_threshold) {
            return Err(ConfigError::OutOfRange {
                key: "critic_threshold",
                value: self.critic_threshold.to_string(),
                range: "0-10",
            });
        }
        if self.max_retries > 10 {
            return Err(ConfigError::OutOfRange {
                key: "max_retries",
                value: self.max_retries.to_string(),
                range: "0-10",
            });
        }
        let secs = self.per_stage_timeout.as_secs();
        if self.per_stage_timeout.is_zero() || secs > MAX_STAGE_TIMEOUT_SECS {
            return Err(ConfigError::OutOfRange {
                key: "per_stage_timeout",
                value: format!("{}s", secs),
                range: "1-1800s",
            });
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`{key}` is not valid: `{value}`")]
    Invalid { key: &'static str, value: String },
    #[error("`{key}` = {value} is outside the allowed range {range}")]
    OutOfRange {
        key: &'static str,
        value: String,
        range: &'static str,
    },
}

/// Full configuration: run parameters plus model selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LabConfig {
    #[serde(default)]
    pub run: RunConfig,
    /// Global LLM provider
    #[serde(default)]
    pub global_provider: LlmProvider,
    /// Global model to use for all stages
    pub global_model: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints
    pub base_url: Option<String>,
    /// Per-stage model overrides (stage name -> model)
    #[serde(default)]
    pub per_stage_models: HashMap<String, String>,
    /// Per-stage provider overrides (stage name -> provider)
    #[serde(default)]
    pub per_stage_providers: HashMap<String, LlmProvider>,
}

impl LabConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = LabConfig::default();

        if let Some(v) = get("ARCSYS_CRITIC_THRESHOLD") {
            config.run.critic_threshold = parse(&v, "critic_threshold")?;
        }
        if let Some(v) = get("ARCSYS_MAX_RETRIES") {
            config.run.max_retries = parse(&v, "max_retries")?;
        }
        if let Some(v) = get("ARCSYS_STAGE_TIMEOUT_SECS") {
            config.run.per_stage_timeout = Duration::from_secs(parse(&v, "per_stage_timeout")?);
        }
        if let Some(v) = get("ARCSYS_ON_EXHAUSTED") {
            config.run.on_exhausted = match v.trim() {
                "soft_pass" => ExhaustionPolicy::SoftPass,
                "fail" => ExhaustionPolicy::Fail,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "on_exhausted",
                        value: v.clone(),
                    })
                }
            };
        }
        if let Some(v) = get("ARCSYS_PROVIDER") {
            config.global_provider = v.parse().map_err(|_| ConfigError::Invalid {
                key: "provider",
                value: v.clone(),
            })?;
        }
        config.global_model = get("ARCSYS_MODEL");
        config.base_url = get("ARCSYS_BASE_URL");

        config.run.validate()?;
        Ok(config)
    }

    /// Get model config for a specific stage
    pub fn model_config_for(&self, stage: &str) -> ModelConfig {
        // Get provider: per-stage override -> global
        let provider = self
            .per_stage_providers
            .get(stage)
            .copied()
            .unwrap_or(self.global_provider);

        // Get model: per-stage override -> global -> default for provider
        let model = self
            .per_stage_models
            .get(stage)
            .or(self.global_model.as_ref())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string());

        let base_url = if provider.supports_base_url() {
            self.base_url.clone()
        } else {
            None
        };

        ModelConfig {
            provider,
            model,
            base_url,
        }
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

mod duration_secs {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        if secs == 0 || secs > super::MAX_STAGE_TIMEOUT_SECS {
            return Err(de::Error::custom(format!(
                "per_stage_timeout must be 1-{}s, got {}s",
                super::MAX_STAGE_TIMEOUT_SECS,
                secs
            )));
        }
        Ok(Duration::from_secs(secs))
    }
}
