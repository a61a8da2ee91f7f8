//! Shared context store.
//!
//! The most recent completed result per (resource, agent), bounded by
//! TTL. The coordination manager consults it to suppress redundant
//! dispatch; the runtime invalidates a resource whenever a fresh edit
//! arrives so stale analysis is never presented as current.
//!
//! Writes carry the work item's priority and admission time so that a
//! lower-priority result finishing late can be discarded in favor of a
//! higher-priority result already written for the same resource
//! (last-priority-wins, not last-write-wins).
//!
//! Invalidation leaves a per-resource tombstone: a write whose work
//! item was admitted before the latest invalidation analyzed content
//! that no longer exists, and is discarded even when the store was
//! empty at invalidation time.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use vigil_common::PriorityTier;

/// One live analysis result for a (resource, agent) pair.
#[derive(Debug, Clone)]
pub struct ContextRecord {
    pub agent_id: String,
    pub resource: String,
    pub summary: serde_json::Value,
    pub priority: PriorityTier,
    created_at: Instant,
    expires_at: Instant,
}

impl ContextRecord {
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct ResourceContext {
    records: HashMap<String, ContextRecord>,
    /// Priority and admission-order marker of the newest write,
    /// used to discard superseded late writers.
    last_write: Option<(PriorityTier, Instant)>,
    /// When this resource was last invalidated; writes from work items
    /// admitted before this point are stale.
    invalidated_at: Option<Instant>,
}

/// TTL-bounded store of the latest agent results per resource.
///
/// Exclusively owns its records; reads return clones so a read racing a
/// write observes either the old or the new record, never a torn one.
#[derive(Debug, Default)]
pub struct ContextStore {
    inner: RwLock<HashMap<String, ResourceContext>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live record for a (resource, agent) pair, if any.
    pub fn get(&self, resource: &str, agent_id: &str) -> Option<ContextRecord> {
        let inner = self.inner.read();
        inner
            .get(resource)
            .and_then(|ctx| ctx.records.get(agent_id))
            .filter(|record| !record.is_expired())
            .cloned()
    }

    /// Store a completed result.
    ///
    /// Returns `false` (and stores nothing) when the result is stale:
    /// either the resource was invalidated after the work item was
    /// admitted, or a higher-priority work item already wrote a result
    /// for this resource after `admitted_at`.
    pub fn put(
        &self,
        resource: &str,
        agent_id: &str,
        summary: serde_json::Value,
        ttl: Duration,
        priority: PriorityTier,
        admitted_at: Instant,
    ) -> bool {
        let mut inner = self.inner.write();
        let ctx = inner.entry(resource.to_string()).or_default();

        if let Some(invalidated_at) = ctx.invalidated_at {
            if admitted_at < invalidated_at {
                debug!(
                    resource,
                    agent_id, "discarding result staled by a newer invalidation"
                );
                return false;
            }
        }

        if let Some((last_priority, last_at)) = ctx.last_write {
            if last_priority > priority && last_at > admitted_at {
                debug!(
                    resource,
                    agent_id, "discarding superseded lower-priority result"
                );
                return false;
            }
        }

        let now = Instant::now();
        ctx.records.insert(
            agent_id.to_string(),
            ContextRecord {
                agent_id: agent_id.to_string(),
                resource: resource.to_string(),
                summary,
                priority,
                created_at: now,
                expires_at: now + ttl,
            },
        );
        ctx.last_write = Some((priority, now));
        true
    }

    /// Drop every record for a resource and stamp the tombstone so
    /// in-flight work admitted before this point cannot write. Called
    /// on new edit events.
    pub fn invalidate(&self, resource: &str) {
        let mut inner = self.inner.write();
        let ctx = inner.entry(resource.to_string()).or_default();
        ctx.records.clear();
        ctx.last_write = None;
        ctx.invalidated_at = Some(Instant::now());
        debug!(resource, "context invalidated");
    }

    /// Number of resources with at least one record (including expired
    /// ones not yet swept).
    pub fn tracked_resources(&self) -> usize {
        self.inner
            .read()
            .values()
            .filter(|ctx| !ctx.records.is_empty())
            .count()
    }
}
