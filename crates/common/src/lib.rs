//! Common types and traits shared across Vigil crates.
//!
//! This crate provides the foundational types the dispatcher, the
//! coordination manager, and the remote-call client all agree on:
//! trigger events, agent descriptors, outbound reports, and errors.

pub mod cancel;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod report;

pub use cancel::CancelFlag;
pub use descriptor::{AgentDescriptor, PredicateMatcher, PriorityTier, TriggerPredicate};
pub use error::{Result, VigilError};
pub use event::{EventKind, ProjectMetadata, TriggerEvent};
pub use report::AgentReport;
