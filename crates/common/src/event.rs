//! Trigger events delivered by the host editor.

use serde::{Deserialize, Serialize};

/// How an event was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A file (or other resource) was edited.
    Edit,
    /// The user explicitly asked for an agent run.
    Manual,
}

/// Project metadata supplied by the host alongside each event.
///
/// The dispatcher only inspects the project-type marker; everything else
/// is passed through to the capability server untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Project-type marker, e.g. "adk". `None` means undetected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,

    /// Free-form metadata forwarded to the capability server.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

/// An inbound event. Immutable once created; consumed exactly once by
/// the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Resource key, typically a workspace-relative file path.
    pub resource: String,

    pub kind: EventKind,

    /// Content snapshot at the time of the event.
    pub content: String,

    pub project: ProjectMetadata,

    /// Unix millis.
    pub timestamp: u64,
}

impl TriggerEvent {
    pub fn edit(resource: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            kind: EventKind::Edit,
            content: content.into(),
            project: ProjectMetadata::default(),
            timestamp: now_millis(),
        }
    }

    pub fn manual(resource: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            kind: EventKind::Manual,
            content: content.into(),
            project: ProjectMetadata::default(),
            timestamp: now_millis(),
        }
    }

    pub fn with_project_type(mut self, marker: impl Into<String>) -> Self {
        self.project.project_type = Some(marker.into());
        self
    }

    pub fn payload_size(&self) -> usize {
        self.content.len()
    }
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_event_defaults() {
        let event = TriggerEvent::edit("src/main.rs", "fn main() {}");
        assert_eq!(event.kind, EventKind::Edit);
        assert_eq!(event.resource, "src/main.rs");
        assert!(event.project.project_type.is_none());
        assert!(event.timestamp > 0);
    }

    #[test]
    fn payload_size_counts_bytes() {
        let event = TriggerEvent::edit("a.rs", "abcd");
        assert_eq!(event.payload_size(), 4);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = TriggerEvent::manual("lib.rs", "code").with_project_type("adk");
        let json = serde_json::to_string(&event).unwrap();
        let back: TriggerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, EventKind::Manual);
        assert_eq!(back.project.project_type.as_deref(), Some("adk"));
    }
}
