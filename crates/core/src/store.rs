//! Persistence contracts for watch rules, snapshots and change history.
//!
//! The routing core only talks to these traits; `vigil-storage` provides
//! in-memory and SQLite implementations.

use async_trait::async_trait;

use crate::error::Result;
use crate::watch::{ChangeRecord, Snapshot, WatchRule};

#[async_trait]
pub trait WatchRuleStore: Send + Sync {
    async fn create(&self, rule: WatchRule) -> Result<WatchRule>;

    /// Active rules ordered by creation time, oldest first.
    async fn list_active(&self) -> Result<Vec<WatchRule>>;

    /// Every rule ever created, newest first.
    async fn list_all(&self) -> Result<Vec<WatchRule>>;

    /// The active rule for an endpoint, if any.
    async fn get_for_endpoint(&self, endpoint_id: &str) -> Result<Option<WatchRule>>;

    async fn update_poll_time(&self, rule_id: &str, at_ms: i64) -> Result<()>;

    /// Returns false when the rule was unknown or already inactive.
    async fn deactivate(&self, rule_id: &str) -> Result<bool>;

    /// Deactivates every active rule whose expiry is at or before `now_ms`
    /// and returns them.
    async fn expire_before(&self, now_ms: i64) -> Result<Vec<WatchRule>>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Most recent snapshot for the endpoint by capture time.
    async fn latest_snapshot(&self, endpoint_id: &str) -> Result<Option<Snapshot>>;

    async fn save_change(&self, record: ChangeRecord) -> Result<()>;

    /// Newest first, optionally scoped to one endpoint.
    async fn list_changes(&self, endpoint_id: Option<&str>, limit: usize) -> Result<Vec<ChangeRecord>>;

    async fn acknowledge_change(&self, change_id: &str) -> Result<bool>;
}
