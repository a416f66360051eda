use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use vigil_agent::{CapabilityRegistry, IntentRouter};
use vigil_core::{
    Config, EventBus, QueryOrigin, QueryResult, Result, SnapshotStore, WatchEvent, WatchRuleStore,
};

use crate::coordinator::WatchCoordinator;
use crate::reconciler::ChangeReconciler;

/// Application context: one router, one event bus, one coordinator and one
/// reconciler, wired explicitly.
pub struct WatchService {
    router: Arc<IntentRouter>,
    events: Arc<EventBus<WatchEvent>>,
    coordinator: Arc<WatchCoordinator>,
    reconciler: Arc<ChangeReconciler>,
}

impl WatchService {
    pub fn new(
        router: IntentRouter,
        rules: Arc<dyn WatchRuleStore>,
        snapshots: Arc<dyn SnapshotStore>,
        config: &Config,
    ) -> Self {
        let router = Arc::new(router);
        let events = Arc::new(EventBus::new());
        let coordinator = Arc::new(WatchCoordinator::new(
            rules,
            events.clone(),
            config.watch.clone(),
        ));
        let reconciler = Arc::new(ChangeReconciler::new(
            router.clone(),
            coordinator.clone(),
            snapshots,
            config.reconciler.clone(),
        ));
        Self {
            router,
            events,
            coordinator,
            reconciler,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        self.router.registry()
    }

    pub fn router(&self) -> &Arc<IntentRouter> {
        &self.router
    }

    pub fn events(&self) -> &Arc<EventBus<WatchEvent>> {
        &self.events
    }

    pub fn coordinator(&self) -> &Arc<WatchCoordinator> {
        &self.coordinator
    }

    pub fn reconciler(&self) -> &Arc<ChangeReconciler> {
        &self.reconciler
    }

    /// Interactive entry point: route the text and, when it succeeded, keep
    /// watching the resolved target.
    pub async fn handle(&self, text: &str, origin: QueryOrigin) -> Result<QueryResult> {
        let query = self.router.build_query(text, origin).await;
        let result = self.router.route(&query).await;
        if result.is_error() {
            return Ok(result);
        }

        let endpoint = query
            .target
            .clone()
            .unwrap_or_else(|| text.trim().to_string());
        if endpoint.is_empty() {
            debug!("Nothing to watch for an empty target");
            return Ok(result);
        }

        self.coordinator
            .auto_watch(&endpoint, &query.intent, &result.integration_id, text)
            .await?;
        Ok(result)
    }

    pub fn spawn(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.reconciler.clone().run_loop(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;
    use vigil_core::{CapabilityDescriptor, ContentBlock, Integration, Query};
    use vigil_storage::{MemorySnapshotStore, MemoryWatchStore};

    struct Echo {
        descriptor: CapabilityDescriptor,
    }

    impl Echo {
        fn new(id: &str, intents: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                descriptor: CapabilityDescriptor::new(id, id, intents),
            })
        }
    }

    #[async_trait]
    impl Integration for Echo {
        fn descriptor(&self) -> &CapabilityDescriptor {
            &self.descriptor
        }

        async fn execute(&self, query: &Query) -> vigil_core::Result<QueryResult> {
            let target = query.target.clone().unwrap_or_default();
            Ok(QueryResult::success(self.id(), vec![ContentBlock::text(target)]))
        }
    }

    async fn service(integrations: Vec<Arc<Echo>>) -> WatchService {
        let registry = Arc::new(CapabilityRegistry::new());
        for integration in integrations {
            registry.register(integration).await.unwrap();
        }
        let config = Config::default();
        WatchService::new(
            IntentRouter::new(registry, config.router.clone()),
            Arc::new(MemoryWatchStore::new()),
            Arc::new(MemorySnapshotStore::new()),
            &config,
        )
    }

    #[tokio::test]
    async fn test_handle_auto_watches_resolved_target() {
        let svc = service(vec![Echo::new("web", &["browse"])]).await;
        let result = svc.handle("onet kropka pe el", QueryOrigin::Voice).await.unwrap();

        assert_eq!(result.integration_id, "web");
        assert_eq!(result.text(), "https://onet.pl");

        let watches = svc.coordinator().get_active_watches().await.unwrap();
        assert_eq!(watches.len(), 1);
        assert_eq!(watches[0].endpoint_id, "https://onet.pl");
        assert_eq!(watches[0].intent, "browse");
        assert_eq!(watches[0].integration_id, "web");
        assert_eq!(watches[0].query_text, "onet kropka pe el");
        assert_eq!(watches[0].interval_ms, 300_000);
    }

    #[tokio::test]
    async fn test_handle_does_not_watch_failures_or_searches() {
        let svc = service(vec![Echo::new("ddg", &["search"])]).await;

        // No browse integration: the URL rule falls through to search
        let result = svc.handle("https://example.com", QueryOrigin::Text).await.unwrap();
        assert_eq!(result.integration_id, "ddg");
        // search is not watchable
        assert!(svc.coordinator().get_active_watches().await.unwrap().is_empty());

        let svc = service(vec![]).await;
        let result = svc.handle("what is new", QueryOrigin::Text).await.unwrap();
        assert!(result.is_error());
        assert!(svc.coordinator().get_active_watches().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_polls_new_watch() {
        let svc = service(vec![Echo::new("mqtt", &["iot:read"])]).await;
        let seen = Arc::new(std::sync::Mutex::new(0usize));
        let counter = seen.clone();
        let _sub = svc.events().subscribe(move |_e: &WatchEvent| {
            *counter.lock().unwrap() += 1;
        });

        svc.handle("temperatura w salonie", QueryOrigin::Text).await.unwrap();
        let (tx, rx) = broadcast::channel(1);
        let handle = svc.spawn(rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let watches = svc.coordinator().get_active_watches().await.unwrap();
        assert!(watches[0].last_polled_at_ms.is_some());
        // RuleCreated only; the first poll sets the baseline silently
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
