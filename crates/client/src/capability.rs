//! The transport boundary to the capability server.
//!
//! Vigil treats the server as opaque: a capability name plus arguments
//! go in, a structured result or an error comes out. Hosts implement
//! [`CapabilityTransport`] over whatever wire they use (MCP, HTTP, a
//! local pipe); tests use scripted mocks.

use async_trait::async_trait;
use vigil_common::Result;

/// One raw call to the capability server. No retries, no caching, no
/// circuit breaking; those live in [`crate::ResilientClient`].
#[async_trait]
pub trait CapabilityTransport: Send + Sync {
    async fn call(&self, capability: &str, arguments: &serde_json::Value)
        -> Result<serde_json::Value>;

    /// Identifier for the server behind this transport, used in logs
    /// and `ServerUnavailable` errors.
    fn server_name(&self) -> &str;
}

#[async_trait]
impl CapabilityTransport for Box<dyn CapabilityTransport> {
    async fn call(
        &self,
        capability: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        (**self).call(capability, arguments).await
    }

    fn server_name(&self) -> &str {
        (**self).server_name()
    }
}
