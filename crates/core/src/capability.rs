use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{ContentBlock, Query, QueryResult};

/// Runtime constraints an integration declares about itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFlags {
    /// Can push content through [`StreamingIntegration`]
    pub streaming: bool,
    /// Needs outbound network access to answer
    pub needs_network: bool,
    /// Safe to run when the host reports sandboxed execution
    pub sandbox_compatible: bool,
    /// 0–100, higher wins when several integrations claim an intent
    pub priority: u8,
}

impl Default for CapabilityFlags {
    fn default() -> Self {
        Self {
            streaming: false,
            needs_network: false,
            sandbox_compatible: true,
            priority: 50,
        }
    }
}

/// What an integration is and which intents it answers.
///
/// Descriptors are immutable once the integration is registered; the registry
/// rejects a second integration carrying the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    /// Unique integration id, e.g. `http-browse`, `rtsp-camera`
    pub id: String,
    /// Human readable name
    pub name: String,
    /// Intents this integration can execute, e.g. `browse`, `camera:describe`
    pub intents: Vec<String>,
    pub flags: CapabilityFlags,
}

impl CapabilityDescriptor {
    pub fn new(id: &str, name: &str, intents: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            intents: intents.iter().map(|i| i.to_string()).collect(),
            flags: CapabilityFlags::default(),
        }
    }

    /// Priority is clamped into 0–100.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.flags.priority = priority.min(100);
        self
    }

    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.flags.streaming = streaming;
        self
    }

    pub fn with_network(mut self, needs_network: bool) -> Self {
        self.flags.needs_network = needs_network;
        self
    }

    pub fn with_sandbox_compatible(mut self, compatible: bool) -> Self {
        self.flags.sandbox_compatible = compatible;
        self
    }

    pub fn handles(&self, intent: &str) -> bool {
        self.intents.iter().any(|i| i == intent)
    }
}

/// The contract every data-source integration implements.
///
/// Integrations are dispatched to, never built, by the routing core. The
/// optional `as_*` methods are capability checks for the extended contracts;
/// the defaults report that the contract is not supported.
#[async_trait]
pub trait Integration: Send + Sync {
    fn descriptor(&self) -> &CapabilityDescriptor;

    fn id(&self) -> &str {
        &self.descriptor().id
    }

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn execute(&self, query: &Query) -> Result<QueryResult>;

    async fn dispose(&self) -> Result<()> {
        Ok(())
    }

    fn as_streaming(&self) -> Option<&dyn StreamingIntegration> {
        None
    }

    fn as_scene_describer(&self) -> Option<&dyn SceneDescriber> {
        None
    }

    fn as_reconnecting(&self) -> Option<&dyn Reconnecting> {
        None
    }
}

/// Push-based content delivery (live camera preview, MQTT topics, ...).
#[async_trait]
pub trait StreamingIntegration: Send + Sync {
    async fn subscribe(&self, query: &Query) -> Result<mpsc::Receiver<ContentBlock>>;
}

/// Produces a short natural-language description of what an endpoint shows.
#[async_trait]
pub trait SceneDescriber: Send + Sync {
    async fn describe_scene(&self, endpoint_id: &str) -> Result<String>;
}

/// Integrations holding a persistent connection that can be re-established.
#[async_trait]
pub trait Reconnecting: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn reconnect(&self) -> Result<()>;
}

/// Optional natural-language fallback used when no built-in rule matches.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn detect(&self, text: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let cap = CapabilityDescriptor::new("http-browse", "HTTP Browse", &["browse", "search"])
            .with_priority(250)
            .with_network(true)
            .with_sandbox_compatible(false);

        assert_eq!(cap.flags.priority, 100);
        assert!(cap.flags.needs_network);
        assert!(!cap.flags.sandbox_compatible);
        assert!(cap.handles("search"));
        assert!(!cap.handles("camera:describe"));
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let cap = CapabilityDescriptor::new("cam", "Camera", &["camera:describe"]);
        let json = serde_json::to_value(&cap).unwrap();
        assert_eq!(json["flags"]["sandboxCompatible"], true);
        assert_eq!(json["flags"]["priority"], 50);
    }
}
