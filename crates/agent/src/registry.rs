use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vigil_core::{Error, EventBus, Integration, Result};

/// Lifecycle notifications emitted by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Registered { id: String },
    Unregistered { id: String },
}

/// Installed integrations, kept in registration order.
///
/// One instance per application context; the router, coordinator and
/// reconciler receive it explicitly.
pub struct CapabilityRegistry {
    entries: RwLock<Vec<Arc<dyn Integration>>>,
    events: EventBus<RegistryEvent>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus<RegistryEvent> {
        &self.events
    }

    /// Fails with [`Error::AlreadyRegistered`] when the id is taken; the
    /// existing entry is left untouched.
    pub async fn register(&self, integration: Arc<dyn Integration>) -> Result<()> {
        let id = integration.id().to_string();
        {
            let mut entries = self.entries.write().await;
            if entries.iter().any(|e| e.id() == id) {
                return Err(Error::AlreadyRegistered(id));
            }
            entries.push(integration);
        }

        info!(id = %id, "Integration registered");
        self.events.publish(&RegistryEvent::Registered { id });
        Ok(())
    }

    /// Returns false (and fires nothing) when the id is not registered.
    pub async fn unregister(&self, id: &str) -> bool {
        let removed = {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|e| e.id() != id);
            entries.len() < before
        };

        if removed {
            info!(id = %id, "Integration unregistered");
            self.events.publish(&RegistryEvent::Unregistered { id: id.to_string() });
        }
        removed
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn Integration>> {
        self.entries.read().await.iter().find(|e| e.id() == id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.entries.read().await.iter().map(|e| e.id().to_string()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Integrations declaring `intent`, highest priority first. The sort is
    /// stable, so equal priorities keep registration order.
    pub async fn lookup_by_intent(&self, intent: &str) -> Vec<Arc<dyn Integration>> {
        let mut matches: Vec<Arc<dyn Integration>> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.descriptor().handles(intent))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.descriptor().flags.priority.cmp(&a.descriptor().flags.priority));
        matches
    }

    /// Like [`lookup_by_intent`](Self::lookup_by_intent), minus integrations
    /// that cannot run sandboxed when `sandboxed` is set.
    pub async fn lookup_available(&self, intent: &str, sandboxed: bool) -> Vec<Arc<dyn Integration>> {
        let mut matches = self.lookup_by_intent(intent).await;
        if sandboxed {
            matches.retain(|e| e.descriptor().flags.sandbox_compatible);
        }
        matches
    }

    pub async fn has_available(&self, intent: &str, sandboxed: bool) -> bool {
        !self.lookup_available(intent, sandboxed).await.is_empty()
    }

    /// Runs every `initialize` hook. Maps id → error message, or `None` on success.
    pub async fn initialize_all(&self) -> HashMap<String, Option<String>> {
        let snapshot: Vec<Arc<dyn Integration>> = self.entries.read().await.clone();
        let mut outcome = HashMap::new();

        for integration in snapshot {
            let id = integration.id().to_string();
            match integration.initialize().await {
                Ok(()) => {
                    debug!(id = %id, "Integration initialized");
                    outcome.insert(id, None);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Integration failed to initialize");
                    outcome.insert(id, Some(e.to_string()));
                }
            }
        }
        outcome
    }

    /// Runs every `dispose` hook, then empties the registry regardless of failures.
    pub async fn dispose_all(&self) -> HashMap<String, Option<String>> {
        let drained: Vec<Arc<dyn Integration>> = {
            let mut entries = self.entries.write().await;
            std::mem::take(&mut *entries)
        };
        let mut outcome = HashMap::new();

        for integration in drained {
            let id = integration.id().to_string();
            match integration.dispose().await {
                Ok(()) => {
                    outcome.insert(id, None);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Integration failed to dispose");
                    outcome.insert(id, Some(e.to_string()));
                }
            }
        }
        info!(count = outcome.len(), "Registry disposed");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use vigil_core::{CapabilityDescriptor, ContentBlock, Query, QueryResult};

    struct StubIntegration {
        descriptor: CapabilityDescriptor,
        fail_lifecycle: bool,
    }

    impl StubIntegration {
        fn new(id: &str, intents: &[&str], priority: u8) -> Self {
            Self {
                descriptor: CapabilityDescriptor::new(id, id, intents).with_priority(priority),
                fail_lifecycle: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail_lifecycle = true;
            self
        }

        fn unsandboxed(mut self) -> Self {
            self.descriptor = self.descriptor.with_sandbox_compatible(false);
            self
        }
    }

    #[async_trait]
    impl Integration for StubIntegration {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.descriptor
        }

        async fn initialize(&self) -> Result<()> {
            if self.fail_lifecycle {
                return Err(Error::Integration("init failed".to_string()));
            }
            Ok(())
        }

        async fn execute(&self, _query: &Query) -> Result<QueryResult> {
            Ok(QueryResult::success(self.id(), vec![ContentBlock::text("ok")]))
        }

        async fn dispose(&self) -> Result<()> {
            if self.fail_lifecycle {
                return Err(Error::Integration("dispose failed".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = CapabilityRegistry::new();
        registry.register(Arc::new(StubIntegration::new("web", &["browse"], 50))).await.unwrap();

        let err = registry
            .register(Arc::new(StubIntegration::new("web", &["search"], 90)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(id) if id == "web"));

        // Existing entry untouched
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.lookup_by_intent("browse").await.len(), 1);
        assert!(registry.lookup_by_intent("search").await.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_orders_by_priority_then_registration() {
        let registry = CapabilityRegistry::new();
        registry.register(Arc::new(StubIntegration::new("low", &["browse"], 10))).await.unwrap();
        registry.register(Arc::new(StubIntegration::new("tie-a", &["browse"], 50))).await.unwrap();
        registry.register(Arc::new(StubIntegration::new("high", &["browse"], 90))).await.unwrap();
        registry.register(Arc::new(StubIntegration::new("tie-b", &["browse"], 50))).await.unwrap();
        registry.register(Arc::new(StubIntegration::new("cam", &["camera:describe"], 99))).await.unwrap();

        let ids: Vec<String> = registry
            .lookup_by_intent("browse")
            .await
            .iter()
            .map(|i| i.id().to_string())
            .collect();
        assert_eq!(ids, vec!["high", "tie-a", "tie-b", "low"]);
    }

    #[tokio::test]
    async fn test_lookup_available_filters_sandbox() {
        let registry = CapabilityRegistry::new();
        registry
            .register(Arc::new(StubIntegration::new("scanner", &["network:scan"], 80).unsandboxed()))
            .await
            .unwrap();
        registry.register(Arc::new(StubIntegration::new("mdns", &["network:scan"], 40))).await.unwrap();

        assert_eq!(registry.lookup_available("network:scan", false).await.len(), 2);
        let sandboxed = registry.lookup_available("network:scan", true).await;
        assert_eq!(sandboxed.len(), 1);
        assert_eq!(sandboxed[0].id(), "mdns");
    }

    #[tokio::test]
    async fn test_unregister_absent_fires_nothing() {
        let registry = CapabilityRegistry::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        registry.events().subscribe(move |e: &RegistryEvent| sink.lock().unwrap().push(e.clone()));

        assert!(!registry.unregister("ghost").await);
        assert!(events.lock().unwrap().is_empty());

        registry.register(Arc::new(StubIntegration::new("web", &["browse"], 50))).await.unwrap();
        assert!(registry.unregister("web").await);

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                RegistryEvent::Registered { id: "web".to_string() },
                RegistryEvent::Unregistered { id: "web".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_lifecycle_failures_are_isolated() {
        let registry = CapabilityRegistry::new();
        registry.register(Arc::new(StubIntegration::new("good", &["browse"], 50))).await.unwrap();
        registry
            .register(Arc::new(StubIntegration::new("bad", &["browse"], 50).failing()))
            .await
            .unwrap();
        registry.register(Arc::new(StubIntegration::new("also-good", &["iot:read"], 50))).await.unwrap();

        let init = registry.initialize_all().await;
        assert_eq!(init.len(), 3);
        assert_eq!(init["good"], None);
        assert_eq!(init["also-good"], None);
        assert!(init["bad"].as_deref().unwrap().contains("init failed"));

        let disposed = registry.dispose_all().await;
        assert_eq!(disposed.len(), 3);
        assert!(disposed["bad"].is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_does_not_break_register() {
        let registry = CapabilityRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        registry.events().subscribe(|_| panic!("listener bug"));
        let s = seen.clone();
        registry.events().subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        registry.register(Arc::new(StubIntegration::new("web", &["browse"], 50))).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }
}
