//! Trigger dispatcher: predicate evaluation and debounce.
//!
//! Raw host events fan out across every configured agent descriptor.
//! Non-matching descriptors are silent no-ops. Matching edit events are
//! debounced per (resource, agent): events inside the window reset the
//! pending timer, and only the event present when the timer fires is
//! dispatched. Manual events skip the debounce entirely.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use vigil_common::{
    AgentDescriptor, EventKind, PredicateMatcher, Result, TriggerEvent,
};

use crate::coordination::WorkItem;

struct DispatchAgent {
    descriptor: AgentDescriptor,
    matcher: PredicateMatcher,
}

#[derive(Debug)]
struct PendingTrigger {
    /// Bumped on every collapse; a timer only fires for its own generation.
    generation: u64,
    event: TriggerEvent,
}

/// Per-(resource, agent) state: absent = idle, present = pending timer.
type PendingMap = Arc<Mutex<HashMap<(String, String), PendingTrigger>>>;

/// Turns host events into admitted work items on the outbound channel.
pub struct TriggerDispatcher {
    agents: Vec<DispatchAgent>,
    pending: PendingMap,
    tx: mpsc::Sender<WorkItem>,
}

impl TriggerDispatcher {
    /// Compile every descriptor's predicate. Fails with
    /// `ConfigurationInvalid` on a bad pattern.
    pub fn new(descriptors: &[AgentDescriptor], tx: mpsc::Sender<WorkItem>) -> Result<Self> {
        let agents = descriptors
            .iter()
            .map(|descriptor| {
                Ok(DispatchAgent {
                    matcher: descriptor.trigger.compile(&descriptor.id)?,
                    descriptor: descriptor.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            agents,
            pending: Arc::new(Mutex::new(HashMap::new())),
            tx,
        })
    }

    /// Evaluate one event against every descriptor.
    pub async fn on_event(&self, event: TriggerEvent) {
        for agent in &self.agents {
            if !agent.matcher.admits(&event) {
                trace!(
                    resource = %event.resource,
                    agent = %agent.descriptor.id,
                    "predicate mismatch"
                );
                continue;
            }

            let debounce = Duration::from_millis(agent.descriptor.trigger.debounce_ms);
            if event.kind == EventKind::Manual || debounce.is_zero() {
                self.dispatch(agent, event.clone()).await;
            } else {
                self.debounce(agent, event.clone(), debounce);
            }
        }
    }

    /// Number of (resource, agent) pairs with a pending timer.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    async fn dispatch(&self, agent: &DispatchAgent, event: TriggerEvent) {
        let item = WorkItem::new(
            agent.descriptor.id.clone(),
            agent.descriptor.priority,
            agent.descriptor.allow_concurrent,
            event,
        );
        debug!(
            resource = %item.resource,
            agent = %item.agent_id,
            item = %item.id,
            "dispatching work item"
        );
        if self.tx.send(item).await.is_err() {
            warn!("work channel closed, dropping work item");
        }
    }

    fn debounce(&self, agent: &DispatchAgent, event: TriggerEvent, window: Duration) {
        let key = (event.resource.clone(), agent.descriptor.id.clone());
        let generation = {
            let mut pending = self.pending.lock();
            match pending.get_mut(&key) {
                Some(entry) => {
                    // Collapse: keep only the newest event, restart the timer.
                    entry.generation += 1;
                    entry.event = event;
                    entry.generation
                }
                None => {
                    pending.insert(
                        key.clone(),
                        PendingTrigger {
                            generation: 0,
                            event,
                        },
                    );
                    0
                }
            }
        };

        let pending = self.pending.clone();
        let tx = self.tx.clone();
        let descriptor = agent.descriptor.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let fired = {
                let mut map = pending.lock();
                match map.get(&key) {
                    Some(entry) if entry.generation == generation => map.remove(&key),
                    // A newer event restarted the window; let its timer fire.
                    _ => None,
                }
            };

            if let Some(entry) = fired {
                let item = WorkItem::new(
                    descriptor.id.clone(),
                    descriptor.priority,
                    descriptor.allow_concurrent,
                    entry.event,
                );
                debug!(
                    resource = %item.resource,
                    agent = %item.agent_id,
                    "debounce window elapsed, dispatching"
                );
                if tx.send(item).await.is_err() {
                    warn!("work channel closed, dropping debounced work item");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_common::{PriorityTier, TriggerPredicate};

    fn descriptor(id: &str, debounce_ms: u64, include: &[&str]) -> AgentDescriptor {
        AgentDescriptor {
            id: id.into(),
            priority: PriorityTier::Routine,
            capability: format!("{}_capability", id),
            trigger: TriggerPredicate {
                include: include.iter().map(|s| s.to_string()).collect(),
                debounce_ms,
                ..Default::default()
            },
            allow_concurrent: false,
            fallback: None,
        }
    }

    fn dispatcher(
        descriptors: &[AgentDescriptor],
    ) -> (TriggerDispatcher, mpsc::Receiver<WorkItem>) {
        let (tx, rx) = mpsc::channel(32);
        (TriggerDispatcher::new(descriptors, tx).unwrap(), rx)
    }

    #[tokio::test]
    async fn non_matching_event_produces_nothing() {
        let (d, mut rx) = dispatcher(&[descriptor("review", 0, &["*.rs"])]);
        d.on_event(TriggerEvent::edit("README.md", "x")).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn matching_event_fans_out_to_all_matching_agents() {
        let (d, mut rx) = dispatcher(&[
            descriptor("review", 0, &["*.rs"]),
            descriptor("docs", 0, &["*.rs"]),
            descriptor("markdown", 0, &["*.md"]),
        ]);
        d.on_event(TriggerEvent::edit("src/lib.rs", "x")).await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let mut agents = vec![first.agent_id, second.agent_id];
        agents.sort();
        assert_eq!(agents, vec!["docs", "review"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn burst_of_edits_collapses_to_last_event() {
        let (d, mut rx) = dispatcher(&[descriptor("review", 30, &["*.rs"])]);
        for i in 0..5 {
            d.on_event(TriggerEvent::edit("a.rs", format!("rev{}", i)))
                .await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let item = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("debounce timer should fire")
            .unwrap();
        assert_eq!(item.event.content, "rev4");
        assert_eq!(d.pending_count(), 0);

        // Nothing else fires afterwards.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn manual_event_bypasses_debounce() {
        let (d, mut rx) = dispatcher(&[descriptor("review", 10_000, &["*.rs"])]);
        d.on_event(TriggerEvent::manual("a.rs", "x")).await;
        let item = rx.recv().await.unwrap();
        assert_eq!(item.agent_id, "review");
        assert_eq!(d.pending_count(), 0);
    }

    #[tokio::test]
    async fn separate_resources_debounce_independently() {
        let (d, mut rx) = dispatcher(&[descriptor("review", 20, &["*.rs"])]);
        d.on_event(TriggerEvent::edit("a.rs", "a")).await;
        d.on_event(TriggerEvent::edit("b.rs", "b")).await;
        assert_eq!(d.pending_count(), 2);

        let mut resources = Vec::new();
        for _ in 0..2 {
            let item = tokio::time::timeout(Duration::from_millis(500), rx.recv())
                .await
                .unwrap()
                .unwrap();
            resources.push(item.resource);
        }
        resources.sort();
        assert_eq!(resources, vec!["a.rs", "b.rs"]);
    }

    #[tokio::test]
    async fn empty_include_matches_everything() {
        let (d, mut rx) = dispatcher(&[descriptor("catchall", 0, &[])]);
        d.on_event(TriggerEvent::edit("anything.xyz", "x")).await;
        assert!(rx.recv().await.is_some());
    }
}
