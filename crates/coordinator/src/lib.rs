//! Vigil coordination runtime.
//!
//! The runtime dispatches host editing events to configured agents,
//! arbitrates between them, and shields everything behind one resilient
//! client to the shared capability server:
//!
//! ```text
//! Host event
//!      │
//!      ▼
//! ┌──────────────────┐  predicate match, debounce
//! │ TriggerDispatcher│
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐  ceiling, exclusivity, priority preemption,
//! │ Coordination     │  conflict suppression via the context store
//! │ Manager          │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐  cache → circuit breaker → retry/backoff
//! │ ResilientClient  │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐  TTL records, invalidated on edit,
//! │ ContextStore     │  last-priority-wins on write
//! └────────┬─────────┘
//!          ▼
//!   AgentReport → host
//! ```

pub mod config;
pub mod context;
pub mod coordination;
pub mod dispatch;
pub mod runtime;

pub use config::RuntimeConfig;
pub use context::{ContextRecord, ContextStore};
pub use coordination::{Admission, CoordinationConfig, CoordinationManager, WorkItem};
pub use dispatch::TriggerDispatcher;
pub use runtime::Runtime;
