use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use vigil_core::{EventBus, Result, StopReason, WatchConfig, WatchEvent, WatchRule, WatchRuleStore};

/// Owns the lifecycle of watch rules: creation, re-arming, eviction under the
/// active-watch ceiling, expiry and manual stops.
pub struct WatchCoordinator {
    store: Arc<dyn WatchRuleStore>,
    events: Arc<EventBus<WatchEvent>>,
    config: WatchConfig,
    // Serializes auto_watch so one endpoint never ends up with two active rules
    arming: Mutex<()>,
}

impl WatchCoordinator {
    pub fn new(
        store: Arc<dyn WatchRuleStore>,
        events: Arc<EventBus<WatchEvent>>,
        config: WatchConfig,
    ) -> Self {
        Self {
            store,
            events,
            config,
            arming: Mutex::new(()),
        }
    }

    pub fn events(&self) -> &Arc<EventBus<WatchEvent>> {
        &self.events
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Start watching an endpoint after a successful interactive query.
    ///
    /// Returns `None` for intents that are not watchable. An existing rule for
    /// the endpoint is replaced; at the ceiling the oldest active rule is
    /// evicted first.
    pub async fn auto_watch(
        &self,
        endpoint_id: &str,
        intent: &str,
        integration_id: &str,
        query_text: &str,
    ) -> Result<Option<WatchRule>> {
        if !self.config.is_watchable(intent) {
            debug!(intent, "Intent is not watchable");
            return Ok(None);
        }

        let _guard = self.arming.lock().await;
        if let Some(existing) = self.store.get_for_endpoint(endpoint_id).await? {
            self.store.deactivate(&existing.id).await?;
            debug!(endpoint = endpoint_id, old_rule = %existing.id, "Re-arming watch");
        }

        // Expired rules leave as expired, not as eviction victims
        self.sweep_expired().await?;
        let active = self.store.list_active().await?;
        if active.len() >= self.config.max_active_watches {
            if let Some(oldest) = active.into_iter().min_by_key(|r| r.created_at_ms) {
                self.evict(oldest).await?;
            }
        }

        let interval_ms = self.config.interval_for(intent);
        let duration_ms = self.config.default_duration_secs.saturating_mul(1000);
        let rule = self
            .persist(endpoint_id, intent, integration_id, query_text, interval_ms, duration_ms)
            .await?;
        Ok(Some(rule))
    }

    /// Explicit watch with caller-chosen duration and interval. No dedup and
    /// no ceiling; the interval floor still applies.
    pub async fn create_watch(
        &self,
        endpoint_id: &str,
        intent: &str,
        integration_id: &str,
        query_text: &str,
        duration: Duration,
        interval: Duration,
    ) -> Result<WatchRule> {
        let interval_ms = self.config.clamp_interval(interval.as_millis() as u64);
        self.persist(
            endpoint_id,
            intent,
            integration_id,
            query_text,
            interval_ms,
            duration.as_millis() as u64,
        )
        .await
    }

    /// Expires every rule past its deadline, then returns the remaining active rules.
    pub async fn get_active_watches(&self) -> Result<Vec<WatchRule>> {
        self.sweep_expired().await?;
        self.store.list_active().await
    }

    async fn sweep_expired(&self) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let expired = self.store.expire_before(now).await?;
        for rule in expired {
            info!(endpoint = %rule.endpoint_id, rule = %rule.id, "Watch expired");
            self.events.publish(&WatchEvent::RuleExpired { rule });
        }
        Ok(())
    }

    /// Stop the endpoint's active rule. `None` when nothing was being watched.
    pub async fn stop_watch(&self, endpoint_id: &str) -> Result<Option<WatchRule>> {
        let Some(mut rule) = self.store.get_for_endpoint(endpoint_id).await? else {
            return Ok(None);
        };
        if !self.store.deactivate(&rule.id).await? {
            return Ok(None);
        }
        rule.active = false;

        info!(endpoint = endpoint_id, rule = %rule.id, "Watch stopped");
        self.events.publish(&WatchEvent::RuleStopped {
            rule: rule.clone(),
            reason: StopReason::Manual,
            at_ms: Utc::now().timestamp_millis(),
        });
        Ok(Some(rule))
    }

    pub async fn record_poll(&self, rule_id: &str, at_ms: i64) -> Result<()> {
        self.store.update_poll_time(rule_id, at_ms).await
    }

    async fn evict(&self, mut rule: WatchRule) -> Result<()> {
        self.store.deactivate(&rule.id).await?;
        rule.active = false;
        info!(
            endpoint = %rule.endpoint_id,
            rule = %rule.id,
            ceiling = self.config.max_active_watches,
            "Evicting oldest watch"
        );
        self.events.publish(&WatchEvent::RuleStopped {
            rule,
            reason: StopReason::Evicted,
            at_ms: Utc::now().timestamp_millis(),
        });
        Ok(())
    }

    async fn persist(
        &self,
        endpoint_id: &str,
        intent: &str,
        integration_id: &str,
        query_text: &str,
        interval_ms: u64,
        duration_ms: u64,
    ) -> Result<WatchRule> {
        let now = Utc::now().timestamp_millis();
        let expires_at_ms = now.saturating_add(duration_ms.min(i64::MAX as u64) as i64);
        let rule = WatchRule::new(
            endpoint_id,
            intent,
            query_text,
            integration_id,
            interval_ms,
            expires_at_ms,
        );
        let rule = self.store.create(rule).await?;

        info!(
            endpoint = endpoint_id,
            intent,
            integration = integration_id,
            interval_ms,
            rule = %rule.id,
            "Watch created"
        );
        self.events.publish(&WatchEvent::RuleCreated { rule: rule.clone() });
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vigil_storage::MemoryWatchStore;

    /// Yields to the runtime before every call, so concurrent callers interleave.
    struct SlowStore {
        inner: MemoryWatchStore,
    }

    impl SlowStore {
        async fn pause(&self) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[async_trait]
    impl WatchRuleStore for SlowStore {
        async fn create(&self, rule: WatchRule) -> Result<WatchRule> {
            self.pause().await;
            self.inner.create(rule).await
        }

        async fn list_active(&self) -> Result<Vec<WatchRule>> {
            self.pause().await;
            self.inner.list_active().await
        }

        async fn list_all(&self) -> Result<Vec<WatchRule>> {
            self.inner.list_all().await
        }

        async fn get_for_endpoint(&self, endpoint_id: &str) -> Result<Option<WatchRule>> {
            self.pause().await;
            self.inner.get_for_endpoint(endpoint_id).await
        }

        async fn update_poll_time(&self, rule_id: &str, at_ms: i64) -> Result<()> {
            self.inner.update_poll_time(rule_id, at_ms).await
        }

        async fn deactivate(&self, rule_id: &str) -> Result<bool> {
            self.pause().await;
            self.inner.deactivate(rule_id).await
        }

        async fn expire_before(&self, now_ms: i64) -> Result<Vec<WatchRule>> {
            self.pause().await;
            self.inner.expire_before(now_ms).await
        }
    }

    fn coordinator(config: WatchConfig) -> (WatchCoordinator, Arc<Mutex<Vec<WatchEvent>>>) {
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        // Kept alive for the bus lifetime; dropping a Subscription does not unsubscribe
        let _sub = events.subscribe(move |e: &WatchEvent| sink.lock().unwrap().push(e.clone()));
        (
            WatchCoordinator::new(Arc::new(MemoryWatchStore::new()), events, config),
            seen,
        )
    }

    fn kinds(seen: &Arc<Mutex<Vec<WatchEvent>>>) -> Vec<&'static str> {
        seen.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    #[tokio::test]
    async fn test_non_watchable_intent_is_ignored() {
        let (coord, seen) = coordinator(WatchConfig::default());
        let rule = coord.auto_watch("q", "search", "web", "pierogi").await.unwrap();
        assert!(rule.is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_watch_uses_intent_interval() {
        let (coord, seen) = coordinator(WatchConfig::default());
        let rule = coord
            .auto_watch("cam-1", "camera:describe", "rtsp", "pokaż kamerę")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rule.interval_ms, 3_000);
        assert!(rule.active);
        let window = rule.expires_at_ms - rule.created_at_ms;
        assert!((3_600_000 - 1_000..=3_600_000 + 1_000).contains(&window));
        assert_eq!(kinds(&seen), vec!["rule_created"]);
    }

    #[tokio::test]
    async fn test_double_auto_watch_rearms() {
        let (coord, seen) = coordinator(WatchConfig::default());
        let first = coord
            .auto_watch("cam-1", "camera:describe", "rtsp", "kamera")
            .await
            .unwrap()
            .unwrap();
        let second = coord
            .auto_watch("cam-1", "camera:describe", "rtsp", "kamera")
            .await
            .unwrap()
            .unwrap();

        assert_ne!(first.id, second.id);
        let active = coord.get_active_watches().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
        // Re-arm is silent; only the two creations are published
        assert_eq!(kinds(&seen), vec!["rule_created", "rule_created"]);
    }

    #[tokio::test]
    async fn test_ceiling_evicts_oldest() {
        let (coord, seen) = coordinator(WatchConfig::default());
        let mut created = Vec::new();
        for i in 0..21 {
            let rule = coord
                .auto_watch(&format!("https://site-{}.pl", i), "browse", "web", "news")
                .await
                .unwrap()
                .unwrap();
            created.push(rule);
            // Distinct creation stamps keep "oldest" unambiguous
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let active = coord.get_active_watches().await.unwrap();
        assert_eq!(active.len(), 20);
        assert!(active.iter().all(|r| r.id != created[0].id));

        let events = seen.lock().unwrap();
        let evicted: Vec<&WatchEvent> = events
            .iter()
            .filter(|e| matches!(e, WatchEvent::RuleStopped { reason: StopReason::Evicted, .. }))
            .collect();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].endpoint_id(), "https://site-0.pl");
    }

    #[tokio::test]
    async fn test_ceiling_expires_before_evicting() {
        let config = WatchConfig {
            max_active_watches: 2,
            ..WatchConfig::default()
        };
        let (coord, seen) = coordinator(config);
        coord.auto_watch("kept", "iot:read", "mqtt", "t").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        // Expires on creation; create_watch does not sweep, so it is still marked active
        coord
            .create_watch("stale", "iot:read", "mqtt", "t", Duration::ZERO, Duration::from_secs(1))
            .await
            .unwrap();
        coord.auto_watch("new", "iot:read", "mqtt", "t").await.unwrap();

        let events = seen.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, WatchEvent::RuleExpired { rule } if rule.endpoint_id == "stale")));
        // The expired rule freed the slot, so nothing was evicted
        assert!(!events
            .iter()
            .any(|e| matches!(e, WatchEvent::RuleStopped { .. })));
        drop(events);

        let mut active: Vec<String> = coord
            .get_active_watches()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.endpoint_id)
            .collect();
        active.sort();
        assert_eq!(active, vec!["kept", "new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_auto_watch_keeps_one_rule_per_endpoint() {
        let coord = WatchCoordinator::new(
            Arc::new(SlowStore {
                inner: MemoryWatchStore::new(),
            }),
            Arc::new(EventBus::new()),
            WatchConfig::default(),
        );

        let (a, b) = tokio::join!(
            coord.auto_watch("cam-1", "camera:describe", "rtsp", "kamera"),
            coord.auto_watch("cam-1", "camera:describe", "rtsp", "kamera"),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let active = coord.get_active_watches().await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_create_watch_skips_ceiling_but_clamps_interval() {
        let config = WatchConfig {
            max_active_watches: 1,
            ..WatchConfig::default()
        };
        let (coord, _seen) = coordinator(config);
        coord.auto_watch("a", "iot:read", "mqtt", "temp").await.unwrap();
        let rule = coord
            .create_watch(
                "a",
                "iot:read",
                "mqtt",
                "temp",
                Duration::from_secs(60),
                Duration::from_millis(10),
            )
            .await
            .unwrap();

        assert_eq!(rule.interval_ms, 1_000);
        // Neither dedup nor ceiling applies
        assert_eq!(coord.get_active_watches().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_rules_are_swept() {
        let (coord, seen) = coordinator(WatchConfig::default());
        coord
            .create_watch("gone", "iot:read", "mqtt", "t", Duration::ZERO, Duration::from_secs(1))
            .await
            .unwrap();
        coord
            .create_watch("kept", "iot:read", "mqtt", "t", Duration::from_secs(60), Duration::from_secs(1))
            .await
            .unwrap();

        let active = coord.get_active_watches().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].endpoint_id, "kept");
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, WatchEvent::RuleExpired { rule } if rule.endpoint_id == "gone")));

        // Second sweep finds nothing new
        coord.get_active_watches().await.unwrap();
        assert_eq!(kinds(&seen).iter().filter(|k| **k == "rule_expired").count(), 1);
    }

    #[tokio::test]
    async fn test_stop_watch() {
        let (coord, seen) = coordinator(WatchConfig::default());
        assert!(coord.stop_watch("nothing").await.unwrap().is_none());

        coord.auto_watch("10.0.0.0/24", "network:scan", "nmap", "skanuj").await.unwrap();
        let stopped = coord.stop_watch("10.0.0.0/24").await.unwrap().unwrap();
        assert!(!stopped.active);
        assert!(coord.get_active_watches().await.unwrap().is_empty());
        assert!(matches!(
            seen.lock().unwrap().last(),
            Some(WatchEvent::RuleStopped { reason: StopReason::Manual, .. })
        ));
    }

    #[tokio::test]
    async fn test_record_poll() {
        let (coord, _seen) = coordinator(WatchConfig::default());
        let rule = coord.auto_watch("s", "iot:read", "mqtt", "t").await.unwrap().unwrap();
        coord.record_poll(&rule.id, 1234).await.unwrap();
        let active = coord.get_active_watches().await.unwrap();
        assert_eq!(active[0].last_polled_at_ms, Some(1234));
    }
}
