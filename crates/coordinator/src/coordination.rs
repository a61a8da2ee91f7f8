//! Coordination manager: slot admission, priority arbitration, and
//! preemption.
//!
//! The manager exclusively owns the slot table. Work items compete for
//! a global concurrency ceiling and, unless an agent allows concurrent
//! work, for a per-resource slot. A higher-priority item preempts a
//! lower-priority holder best-effort: the holder's cancel flag is set
//! and its slot is reassigned; the holder keeps running until its next
//! cancellation check and its result is discarded.

use crate::context::ContextStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;
use vigil_common::{CancelFlag, EventKind, PriorityTier, TriggerEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Global ceiling on concurrently executing work items.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// How long a saturated admission waits for a slot before rejecting.
    #[serde(default = "default_queue_wait_ms")]
    pub queue_wait_ms: u64,

    /// TTL for context records written on completion.
    #[serde(default = "default_context_ttl_ms")]
    pub context_ttl_ms: u64,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_queue_wait_ms() -> u64 {
    250
}

fn default_context_ttl_ms() -> u64 {
    300_000
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_wait_ms: default_queue_wait_ms(),
            context_ttl_ms: default_context_ttl_ms(),
        }
    }
}

/// One admitted unit of (agent, resource, event) work.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: Uuid,
    pub agent_id: String,
    pub priority: PriorityTier,
    pub allow_concurrent: bool,
    pub resource: String,
    pub event: TriggerEvent,
    pub cancel: CancelFlag,
}

impl WorkItem {
    pub fn new(
        agent_id: impl Into<String>,
        priority: PriorityTier,
        allow_concurrent: bool,
        event: TriggerEvent,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            priority,
            allow_concurrent,
            resource: event.resource.clone(),
            event,
            cancel: CancelFlag::default(),
        }
    }
}

/// Outcome of an admission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed; `admitted_at` stamps the item for supersede checks.
    Admitted { admitted_at: Instant },
    /// A sufficiently fresh result already exists; no-op.
    Deferred,
    /// Ceiling saturated with nothing preemptable; surface backpressure.
    Rejected,
}

#[derive(Debug)]
struct ActiveSlot {
    item_id: Uuid,
    resource: String,
    agent_id: String,
    priority: PriorityTier,
    allow_concurrent: bool,
    cancel: CancelFlag,
}

/// Serializes all slot decisions; see module docs.
pub struct CoordinationManager {
    config: CoordinationConfig,
    context: Arc<ContextStore>,
    slots: Mutex<Vec<ActiveSlot>>,
    released: Notify,
}

impl CoordinationManager {
    pub fn new(config: CoordinationConfig, context: Arc<ContextStore>) -> Self {
        Self {
            config,
            context,
            slots: Mutex::new(Vec::new()),
            released: Notify::new(),
        }
    }

    pub fn context_ttl(&self) -> Duration {
        Duration::from_millis(self.config.context_ttl_ms)
    }

    pub fn active_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Admit a work item, waiting briefly for a slot if saturated.
    pub async fn admit(&self, item: &WorkItem) -> Admission {
        // Conflict suppression: a fresh result for this pair makes a
        // non-manual re-run redundant.
        if item.event.kind != EventKind::Manual
            && self.context.get(&item.resource, &item.agent_id).is_some()
        {
            debug!(
                resource = %item.resource,
                agent = %item.agent_id,
                "fresh context record exists, deferring"
            );
            return Admission::Deferred;
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.queue_wait_ms);
        loop {
            if let Some(admitted_at) = self.try_admit(item) {
                return Admission::Admitted { admitted_at };
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                info!(
                    resource = %item.resource,
                    agent = %item.agent_id,
                    "concurrency ceiling saturated, rejecting"
                );
                return Admission::Rejected;
            }
            // Wake on any release, or re-check at the deadline.
            let _ = tokio::time::timeout(remaining, self.released.notified()).await;
        }
    }

    fn try_admit(&self, item: &WorkItem) -> Option<Instant> {
        let mut slots = self.slots.lock();

        // Per-resource exclusivity: the same agent never holds two
        // slots for one resource, and different agents share only when
        // both sides allow concurrency.
        if let Some(idx) = slots.iter().position(|s| {
            s.resource == item.resource
                && (s.agent_id == item.agent_id || !(s.allow_concurrent && item.allow_concurrent))
        }) {
            if item.priority > slots[idx].priority {
                info!(
                    resource = %item.resource,
                    preempted = %slots[idx].agent_id,
                    by = %item.agent_id,
                    "preempting lower-priority work item"
                );
                slots[idx].cancel.cancel();
                slots.remove(idx);
            } else {
                return None;
            }
        }

        if slots.len() >= self.config.max_concurrent {
            // Preempt the lowest-priority active item if it ranks below us.
            let candidate = slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.priority)
                .filter(|(_, s)| s.priority < item.priority)
                .map(|(i, _)| i);
            match candidate {
                Some(idx) => {
                    info!(
                        preempted = %slots[idx].agent_id,
                        resource = %slots[idx].resource,
                        "preempting for ceiling headroom"
                    );
                    slots[idx].cancel.cancel();
                    slots.remove(idx);
                }
                None => return None,
            }
        }

        slots.push(ActiveSlot {
            item_id: item.id,
            resource: item.resource.clone(),
            agent_id: item.agent_id.clone(),
            priority: item.priority,
            allow_concurrent: item.allow_concurrent,
            cancel: item.cancel.clone(),
        });
        Some(Instant::now())
    }

    /// Release a work item's slot. No-op if the item was already
    /// preempted out of the table.
    pub fn release(&self, item_id: Uuid) {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|s| s.item_id != item_id);
        if slots.len() != before {
            drop(slots);
            self.released.notify_waiters();
        }
    }
}
