//! Outbound results delivered to the host editor.

use serde::{Deserialize, Serialize};

/// The result of one completed (or degraded, or rejected) work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent_id: String,

    pub resource: String,

    /// False only for rejected / fully failed work.
    pub success: bool,

    /// Capability result, or the agent's static fallback when degraded.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub result: serde_json::Value,

    /// True when `result` is a fallback produced without the server.
    pub degraded: bool,

    /// Human-readable reason for unsuccessful reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentReport {
    pub fn success(
        agent_id: impl Into<String>,
        resource: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            resource: resource.into(),
            success: true,
            result,
            degraded: false,
            error: None,
        }
    }

    pub fn degraded(
        agent_id: impl Into<String>,
        resource: impl Into<String>,
        fallback: serde_json::Value,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            resource: resource.into(),
            success: true,
            result: fallback,
            degraded: true,
            error: None,
        }
    }

    pub fn failed(
        agent_id: impl Into<String>,
        resource: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            resource: resource.into(),
            success: false,
            result: serde_json::Value::Null,
            degraded: false,
            error: Some(error.into()),
        }
    }
}
