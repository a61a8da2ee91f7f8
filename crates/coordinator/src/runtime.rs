//! The runtime that wires the pipeline together.
//!
//! One inbound path: host event → context invalidation (edits) →
//! dispatcher → admission → worker task → resilient client → context
//! update → report channel. The runtime never blocks on a single work
//! item, and no single agent or server failure halts dispatch for the
//! rest.

use crate::config::RuntimeConfig;
use crate::context::ContextStore;
use crate::coordination::{Admission, CoordinationManager, WorkItem};
use crate::dispatch::TriggerDispatcher;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil_client::{BreakerState, CapabilityTransport, ResilientClient};
use vigil_common::{AgentDescriptor, AgentReport, EventKind, Result, TriggerEvent, VigilError};

const DEFAULT_FALLBACK: &str =
    "Capability server unavailable. Basic functionality only; retry later for full analysis.";

/// Central coordinator process for all configured agents.
pub struct Runtime {
    agents: HashMap<String, AgentDescriptor>,
    client: Arc<ResilientClient>,
    context: Arc<ContextStore>,
    coordination: Arc<CoordinationManager>,
    dispatcher: TriggerDispatcher,
    reports: mpsc::Sender<AgentReport>,
    call_timeout: Duration,
    work_rx: Mutex<Option<mpsc::Receiver<WorkItem>>>,
}

impl Runtime {
    /// Build a runtime from validated configuration and a transport to
    /// the capability server. Returns the runtime and the host's end of
    /// the report channel.
    pub fn new(
        config: RuntimeConfig,
        transport: Arc<dyn CapabilityTransport>,
    ) -> Result<(Arc<Self>, mpsc::Receiver<AgentReport>)> {
        config.validate()?;

        let (work_tx, work_rx) = mpsc::channel(64);
        let (report_tx, report_rx) = mpsc::channel(64);

        let context = Arc::new(ContextStore::new());
        let coordination = Arc::new(CoordinationManager::new(
            config.coordination.clone(),
            context.clone(),
        ));
        let dispatcher = TriggerDispatcher::new(&config.agents, work_tx)?;
        let client = Arc::new(ResilientClient::new(transport, config.client.clone()));

        info!(
            agents = config.agents.len(),
            server = client.server_name(),
            "runtime initialized"
        );

        let runtime = Arc::new(Self {
            agents: config
                .agents
                .iter()
                .map(|a| (a.id.clone(), a.clone()))
                .collect(),
            client,
            context,
            coordination,
            dispatcher,
            reports: report_tx,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            work_rx: Mutex::new(Some(work_rx)),
        });
        Ok((runtime, report_rx))
    }

    /// Start the worker loop. Each admitted work item runs on its own
    /// task; the loop itself only pulls from the dispatch channel.
    /// Returns `None` when the loop is already running.
    pub fn start(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let mut work_rx = match self.work_rx.lock().take() {
            Some(rx) => rx,
            None => {
                warn!("worker loop already running, ignoring start");
                return None;
            }
        };
        let runtime = self.clone();
        Some(tokio::spawn(async move {
            while let Some(item) = work_rx.recv().await {
                let runtime = runtime.clone();
                tokio::spawn(async move {
                    runtime.execute(item).await;
                });
            }
            debug!("dispatch channel closed, worker loop ending");
        }))
    }

    /// Feed one host event into the pipeline.
    pub async fn handle_event(&self, event: TriggerEvent) {
        if event.kind == EventKind::Edit {
            // New content makes every existing analysis for this
            // resource stale.
            self.context.invalidate(&event.resource);
        }
        self.dispatcher.on_event(event).await;
    }

    /// Read access for hosts that render analysis state.
    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Circuit state of the shared capability server.
    pub fn server_state(&self) -> BreakerState {
        self.client.breaker_state()
    }

    async fn execute(&self, item: WorkItem) {
        match self.coordination.admit(&item).await {
            Admission::Deferred => {
                debug!(
                    resource = %item.resource,
                    agent = %item.agent_id,
                    "work item deferred"
                );
            }
            Admission::Rejected => {
                self.send_report(AgentReport::failed(
                    item.agent_id.clone(),
                    item.resource.clone(),
                    "rejected: concurrency ceiling saturated",
                ))
                .await;
            }
            Admission::Admitted { admitted_at } => {
                let outcome = self.invoke_agent(&item).await;

                if item.cancel.is_cancelled() {
                    // Preempted by a higher-priority item; the completed
                    // result is discarded, not stored, not reported.
                    debug!(
                        resource = %item.resource,
                        agent = %item.agent_id,
                        "work item preempted, discarding result"
                    );
                } else {
                    match outcome {
                        Ok(value) => {
                            let stored = self.context.put(
                                &item.resource,
                                &item.agent_id,
                                value.clone(),
                                self.coordination.context_ttl(),
                                item.priority,
                                admitted_at,
                            );
                            if stored {
                                self.send_report(AgentReport::success(
                                    item.agent_id.clone(),
                                    item.resource.clone(),
                                    value,
                                ))
                                .await;
                            } else {
                                debug!(
                                    resource = %item.resource,
                                    agent = %item.agent_id,
                                    "result superseded by higher-priority completion"
                                );
                            }
                        }
                        Err(e) => {
                            warn!(
                                resource = %item.resource,
                                agent = %item.agent_id,
                                error = %e,
                                "falling back to degraded response"
                            );
                            let fallback = self.fallback_for(&item.agent_id);
                            self.send_report(AgentReport::degraded(
                                item.agent_id.clone(),
                                item.resource.clone(),
                                fallback,
                            ))
                            .await;
                        }
                    }
                }

                self.coordination.release(item.id);
            }
        }
    }

    async fn invoke_agent(&self, item: &WorkItem) -> Result<serde_json::Value> {
        let descriptor = self
            .agents
            .get(&item.agent_id)
            .ok_or_else(|| VigilError::CallFailed(format!("unknown agent '{}'", item.agent_id)))?;

        let arguments = json!({
            "resource": item.resource,
            "content": item.event.content,
            "kind": item.event.kind,
            "project": item.event.project,
        });

        // The cancel flag travels into the client so a preempted item's
        // completed result never primes the response cache.
        self.client
            .invoke(
                &descriptor.capability,
                &arguments,
                self.call_timeout,
                &item.cancel,
            )
            .await
    }

    fn fallback_for(&self, agent_id: &str) -> serde_json::Value {
        let text = self
            .agents
            .get(agent_id)
            .and_then(|a| a.fallback.as_deref())
            .unwrap_or(DEFAULT_FALLBACK);
        json!({ "message": text })
    }

    async fn send_report(&self, report: AgentReport) {
        if self.reports.send(report).await.is_err() {
            error!("report channel closed, host is gone");
        }
    }
}
