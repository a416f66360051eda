use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use vigil_core::{
    ChangeKind, ChangeRecord, Error, Result, Severity, Snapshot, SnapshotStore, WatchRule,
    WatchRuleStore,
};

fn open_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Storage(format!("Failed to create db directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| Error::Storage(format!("Failed to open watch db: {}", e)))?;

    // Rule and snapshot stores share the file from separate connections
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;").ok();
    Ok(conn)
}

fn lock(inner: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    inner
        .lock()
        .map_err(|e| Error::Storage(format!("Lock error: {}", e)))
}

fn query_err(e: rusqlite::Error) -> Error {
    Error::Storage(format!("Query error: {}", e))
}

const RULE_COLUMNS: &str = "id, endpoint_id, intent, query_text, integration_id, interval_ms,
    expires_at_ms, active, created_at_ms, last_polled_at_ms";

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<WatchRule> {
    Ok(WatchRule {
        id: row.get(0)?,
        endpoint_id: row.get(1)?,
        intent: row.get(2)?,
        query_text: row.get(3)?,
        integration_id: row.get(4)?,
        interval_ms: row.get::<_, i64>(5)?.max(0) as u64,
        expires_at_ms: row.get(6)?,
        active: row.get::<_, i64>(7)? != 0,
        created_at_ms: row.get(8)?,
        last_polled_at_ms: row.get(9)?,
    })
}

/// SQLite-backed watch rule table.
#[derive(Clone)]
pub struct SqliteWatchStore {
    inner: Arc<Mutex<Connection>>,
}

impl SqliteWatchStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let store = Self {
            inner: Arc::new(Mutex::new(open_connection(db_path)?)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = lock(&self.inner)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS watch_rules (
                id TEXT PRIMARY KEY,
                endpoint_id TEXT NOT NULL,
                intent TEXT NOT NULL,
                query_text TEXT NOT NULL,
                integration_id TEXT NOT NULL,
                interval_ms INTEGER NOT NULL,
                expires_at_ms INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at_ms INTEGER NOT NULL,
                last_polled_at_ms INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_watch_endpoint ON watch_rules(endpoint_id, active);
            CREATE INDEX IF NOT EXISTS idx_watch_expires ON watch_rules(active, expires_at_ms);
            ",
        )
        .map_err(|e| Error::Storage(format!("Failed to init watch schema: {}", e)))?;

        debug!("Watch rule schema initialized");
        Ok(())
    }

    fn select(&self, clause: &str, bind: &[&dyn rusqlite::ToSql]) -> Result<Vec<WatchRule>> {
        let conn = lock(&self.inner)?;
        let sql = format!("SELECT {} FROM watch_rules {}", RULE_COLUMNS, clause);
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt.query_map(bind, row_to_rule).map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }
}

#[async_trait]
impl WatchRuleStore for SqliteWatchStore {
    async fn create(&self, rule: WatchRule) -> Result<WatchRule> {
        let conn = lock(&self.inner)?;
        conn.execute(
            "INSERT INTO watch_rules (id, endpoint_id, intent, query_text, integration_id,
                interval_ms, expires_at_ms, active, created_at_ms, last_polled_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                rule.id,
                rule.endpoint_id,
                rule.intent,
                rule.query_text,
                rule.integration_id,
                rule.interval_ms as i64,
                rule.expires_at_ms,
                rule.active as i64,
                rule.created_at_ms,
                rule.last_polled_at_ms
            ],
        )
        .map_err(|e| Error::Storage(format!("Insert error: {}", e)))?;

        debug!(id = %rule.id, endpoint = %rule.endpoint_id, "Watch rule inserted");
        Ok(rule)
    }

    async fn list_active(&self) -> Result<Vec<WatchRule>> {
        self.select("WHERE active = 1 ORDER BY created_at_ms ASC, rowid ASC", &[])
    }

    async fn list_all(&self) -> Result<Vec<WatchRule>> {
        self.select("ORDER BY created_at_ms DESC, rowid DESC", &[])
    }

    async fn get_for_endpoint(&self, endpoint_id: &str) -> Result<Option<WatchRule>> {
        let conn = lock(&self.inner)?;
        let sql = format!(
            "SELECT {} FROM watch_rules WHERE endpoint_id = ?1 AND active = 1
             ORDER BY created_at_ms DESC, rowid DESC LIMIT 1",
            RULE_COLUMNS
        );
        conn.query_row(&sql, params![endpoint_id], row_to_rule)
            .optional()
            .map_err(query_err)
    }

    async fn update_poll_time(&self, rule_id: &str, at_ms: i64) -> Result<()> {
        let conn = lock(&self.inner)?;
        conn.execute(
            "UPDATE watch_rules SET last_polled_at_ms = ?1 WHERE id = ?2",
            params![at_ms, rule_id],
        )
        .map_err(|e| Error::Storage(format!("Update error: {}", e)))?;
        Ok(())
    }

    async fn deactivate(&self, rule_id: &str) -> Result<bool> {
        let conn = lock(&self.inner)?;
        let affected = conn
            .execute(
                "UPDATE watch_rules SET active = 0 WHERE id = ?1 AND active = 1",
                params![rule_id],
            )
            .map_err(|e| Error::Storage(format!("Update error: {}", e)))?;
        Ok(affected > 0)
    }

    async fn expire_before(&self, now_ms: i64) -> Result<Vec<WatchRule>> {
        let mut conn = lock(&self.inner)?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Transaction error: {}", e)))?;

        let expired = {
            let sql = format!(
                "SELECT {} FROM watch_rules WHERE active = 1 AND expires_at_ms <= ?1
                 ORDER BY created_at_ms ASC, rowid ASC",
                RULE_COLUMNS
            );
            let mut stmt = tx.prepare(&sql).map_err(query_err)?;
            let rows = stmt.query_map(params![now_ms], row_to_rule).map_err(query_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)?
        };

        tx.execute(
            "UPDATE watch_rules SET active = 0 WHERE active = 1 AND expires_at_ms <= ?1",
            params![now_ms],
        )
        .map_err(|e| Error::Storage(format!("Update error: {}", e)))?;
        tx.commit()
            .map_err(|e| Error::Storage(format!("Commit error: {}", e)))?;

        Ok(expired
            .into_iter()
            .map(|mut rule| {
                rule.active = false;
                rule
            })
            .collect())
    }
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        endpoint_id: row.get(1)?,
        fingerprint: row.get(2)?,
        text: row.get(3)?,
        size: row.get::<_, i64>(4)?.max(0) as usize,
        captured_at_ms: row.get(5)?,
    })
}

fn row_to_change(row: &Row<'_>) -> rusqlite::Result<ChangeRecord> {
    let kind: String = row.get(2)?;
    let severity: String = row.get(6)?;
    Ok(ChangeRecord {
        id: row.get(0)?,
        endpoint_id: row.get(1)?,
        kind: ChangeKind::from_str(&kind).unwrap_or(ChangeKind::ContentChanged),
        description: row.get(3)?,
        old_fingerprint: row.get(4)?,
        new_fingerprint: row.get(5)?,
        severity: Severity::from_str(&severity).unwrap_or(Severity::Info),
        detected_at_ms: row.get(7)?,
        acknowledged: row.get::<_, i64>(8)? != 0,
    })
}

/// SQLite-backed snapshot and change history.
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    inner: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let store = Self {
            inner: Arc::new(Mutex::new(open_connection(db_path)?)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = lock(&self.inner)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                endpoint_id TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                text TEXT NOT NULL,
                size INTEGER NOT NULL,
                captured_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_snapshot_endpoint
                ON snapshots(endpoint_id, captured_at_ms);

            CREATE TABLE IF NOT EXISTS change_records (
                id TEXT PRIMARY KEY,
                endpoint_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                description TEXT NOT NULL,
                old_fingerprint TEXT,
                new_fingerprint TEXT NOT NULL,
                severity TEXT NOT NULL,
                detected_at_ms INTEGER NOT NULL,
                acknowledged INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_change_endpoint
                ON change_records(endpoint_id, detected_at_ms);
            ",
        )
        .map_err(|e| Error::Storage(format!("Failed to init snapshot schema: {}", e)))?;

        debug!("Snapshot schema initialized");
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let conn = lock(&self.inner)?;
        conn.execute(
            "INSERT INTO snapshots (id, endpoint_id, fingerprint, text, size, captured_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.id,
                snapshot.endpoint_id,
                snapshot.fingerprint,
                snapshot.text,
                snapshot.size as i64,
                snapshot.captured_at_ms
            ],
        )
        .map_err(|e| Error::Storage(format!("Insert error: {}", e)))?;
        Ok(())
    }

    async fn latest_snapshot(&self, endpoint_id: &str) -> Result<Option<Snapshot>> {
        let conn = lock(&self.inner)?;
        conn.query_row(
            "SELECT id, endpoint_id, fingerprint, text, size, captured_at_ms FROM snapshots
             WHERE endpoint_id = ?1 ORDER BY captured_at_ms DESC, rowid DESC LIMIT 1",
            params![endpoint_id],
            row_to_snapshot,
        )
        .optional()
        .map_err(query_err)
    }

    async fn save_change(&self, record: ChangeRecord) -> Result<()> {
        let conn = lock(&self.inner)?;
        conn.execute(
            "INSERT INTO change_records (id, endpoint_id, kind, description, old_fingerprint,
                new_fingerprint, severity, detected_at_ms, acknowledged)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.endpoint_id,
                record.kind.as_str(),
                record.description,
                record.old_fingerprint,
                record.new_fingerprint,
                record.severity.as_str(),
                record.detected_at_ms,
                record.acknowledged as i64
            ],
        )
        .map_err(|e| Error::Storage(format!("Insert error: {}", e)))?;

        debug!(id = %record.id, endpoint = %record.endpoint_id, "Change record inserted");
        Ok(())
    }

    async fn list_changes(&self, endpoint_id: Option<&str>, limit: usize) -> Result<Vec<ChangeRecord>> {
        let conn = lock(&self.inner)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, endpoint_id, kind, description, old_fingerprint, new_fingerprint,
                    severity, detected_at_ms, acknowledged
                 FROM change_records
                 WHERE (?1 IS NULL OR endpoint_id = ?1)
                 ORDER BY detected_at_ms DESC, rowid DESC LIMIT ?2",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![endpoint_id, limit as i64], row_to_change)
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    async fn acknowledge_change(&self, change_id: &str) -> Result<bool> {
        let conn = lock(&self.inner)?;
        let affected = conn
            .execute(
                "UPDATE change_records SET acknowledged = 1 WHERE id = ?1",
                params![change_id],
            )
            .map_err(|e| Error::Storage(format!("Update error: {}", e)))?;
        Ok(affected > 0)
    }
}
