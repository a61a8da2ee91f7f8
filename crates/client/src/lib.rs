//! Resilient remote-call client for the Vigil runtime.
//!
//! Every agent shares one remote capability server, so every call goes
//! through this crate's [`ResilientClient`]:
//!
//! ```text
//! invoke(capability, args, timeout, cancel)
//!      │
//!      ▼
//! ┌──────────┐  hit   ┌───────────────┐
//! │  cache   ├───────►│ return cached │
//! └────┬─────┘        └───────────────┘
//!      │ miss
//!      ▼
//! ┌──────────┐  open  ┌────────────────────┐
//! │ breaker  ├───────►│ ServerUnavailable  │
//! └────┬─────┘        └────────────────────┘
//!      │ closed / half-open probe
//!      ▼
//! ┌──────────────────────────────┐
//! │ call with deadline, retry    │
//! │ with capped backoff          │
//! └──────────────────────────────┘
//! ```
//!
//! The client exclusively owns the server's circuit state and cache
//! entries; other components only see results.

pub mod breaker;
pub mod cache;
pub mod capability;
pub mod resilient;
pub mod retry;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use cache::ResponseCache;
pub use capability::CapabilityTransport;
pub use resilient::{ClientConfig, ResilientClient};
pub use retry::RetryConfig;
