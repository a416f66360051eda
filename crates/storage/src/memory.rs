use async_trait::async_trait;
use tokio::sync::RwLock;
use vigil_core::{ChangeRecord, Result, Snapshot, SnapshotStore, WatchRule, WatchRuleStore};

/// Process-local watch rule store. Insertion order doubles as creation order.
#[derive(Default)]
pub struct MemoryWatchStore {
    rules: RwLock<Vec<WatchRule>>,
}

impl MemoryWatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatchRuleStore for MemoryWatchStore {
    async fn create(&self, rule: WatchRule) -> Result<WatchRule> {
        self.rules.write().await.push(rule.clone());
        Ok(rule)
    }

    async fn list_active(&self) -> Result<Vec<WatchRule>> {
        let mut active: Vec<WatchRule> =
            self.rules.read().await.iter().filter(|r| r.active).cloned().collect();
        active.sort_by_key(|r| r.created_at_ms);
        Ok(active)
    }

    async fn list_all(&self) -> Result<Vec<WatchRule>> {
        let mut all = self.rules.read().await.clone();
        all.reverse();
        all.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        Ok(all)
    }

    async fn get_for_endpoint(&self, endpoint_id: &str) -> Result<Option<WatchRule>> {
        Ok(self
            .rules
            .read()
            .await
            .iter()
            .rev()
            .find(|r| r.active && r.endpoint_id == endpoint_id)
            .cloned())
    }

    async fn update_poll_time(&self, rule_id: &str, at_ms: i64) -> Result<()> {
        if let Some(rule) = self.rules.write().await.iter_mut().find(|r| r.id == rule_id) {
            rule.last_polled_at_ms = Some(at_ms);
        }
        Ok(())
    }

    async fn deactivate(&self, rule_id: &str) -> Result<bool> {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|r| r.id == rule_id && r.active) {
            Some(rule) => {
                rule.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn expire_before(&self, now_ms: i64) -> Result<Vec<WatchRule>> {
        let mut expired = Vec::new();
        for rule in self.rules.write().await.iter_mut() {
            if rule.active && rule.is_expired(now_ms) {
                rule.active = false;
                expired.push(rule.clone());
            }
        }
        Ok(expired)
    }
}

/// Process-local snapshot and change history.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<Vec<Snapshot>>,
    changes: RwLock<Vec<ChangeRecord>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot_count(&self, endpoint_id: &str) -> usize {
        self.snapshots
            .read()
            .await
            .iter()
            .filter(|s| s.endpoint_id == endpoint_id)
            .count()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        self.snapshots.write().await.push(snapshot);
        Ok(())
    }

    async fn latest_snapshot(&self, endpoint_id: &str) -> Result<Option<Snapshot>> {
        // Later insertions win ties on capture time.
        Ok(self
            .snapshots
            .read()
            .await
            .iter()
            .filter(|s| s.endpoint_id == endpoint_id)
            .fold(None::<&Snapshot>, |best, s| match best {
                Some(b) if b.captured_at_ms > s.captured_at_ms => Some(b),
                _ => Some(s),
            })
            .cloned())
    }

    async fn save_change(&self, record: ChangeRecord) -> Result<()> {
        self.changes.write().await.push(record);
        Ok(())
    }

    async fn list_changes(&self, endpoint_id: Option<&str>, limit: usize) -> Result<Vec<ChangeRecord>> {
        Ok(self
            .changes
            .read()
            .await
            .iter()
            .rev()
            .filter(|c| endpoint_id.map_or(true, |e| c.endpoint_id == e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn acknowledge_change(&self, change_id: &str) -> Result<bool> {
        let mut changes = self.changes.write().await;
        match changes.iter_mut().find(|c| c.id == change_id) {
            Some(change) => {
                change.acknowledged = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
