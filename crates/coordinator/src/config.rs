//! Runtime configuration.
//!
//! Descriptors and resilience parameters arrive pre-assembled from the
//! host's configuration loader; this module only parses the TOML shape
//! and validates it. Agents referencing an invalid descriptor never
//! start: validation failure is fatal at load, not at dispatch.

use crate::coordination::CoordinationConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use vigil_client::ClientConfig;
use vigil_common::{AgentDescriptor, PriorityTier, Result, VigilError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Configured agents.
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,

    /// Resilience parameters for the shared capability server.
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    /// Per-call deadline handed to the client, in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            client: ClientConfig::default(),
            coordination: CoordinationConfig::default(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the runtime cannot honor.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.is_empty() {
                return Err(VigilError::ConfigurationInvalid(
                    "agent id must not be empty".into(),
                ));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(VigilError::ConfigurationInvalid(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
            if agent.capability.is_empty() {
                return Err(VigilError::ConfigurationInvalid(format!(
                    "agent '{}' has no capability",
                    agent.id
                )));
            }
            // Auto-triggered agents with no include patterns would fire
            // on every edit in the workspace.
            if !agent.trigger.manual_only && agent.trigger.include.is_empty() {
                return Err(VigilError::ConfigurationInvalid(format!(
                    "agent '{}' is auto-triggered but has no include patterns",
                    agent.id
                )));
            }
            // Surfaces bad patterns at load instead of first dispatch.
            agent.trigger.compile(&agent.id)?;
        }

        if self.client.retry.max_attempts == 0 {
            return Err(VigilError::ConfigurationInvalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.client.retry.backoff_multiplier < 1.0 {
            return Err(VigilError::ConfigurationInvalid(
                "retry.backoff_multiplier must be >= 1.0".into(),
            ));
        }
        if self.client.breaker.failure_threshold == 0 || self.client.breaker.success_threshold == 0
        {
            return Err(VigilError::ConfigurationInvalid(
                "breaker thresholds must be at least 1".into(),
            ));
        }
        if self.client.cache_capacity == 0 {
            return Err(VigilError::ConfigurationInvalid(
                "cache_capacity must be at least 1".into(),
            ));
        }
        if self.coordination.max_concurrent == 0 {
            return Err(VigilError::ConfigurationInvalid(
                "coordination.max_concurrent must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
