pub mod changes;
pub mod config_cmd;
pub mod intent;
pub mod status;
pub mod watches;

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use vigil_core::{Config, Paths, SnapshotStore, StorageBackend, WatchRuleStore};
use vigil_storage::{MemorySnapshotStore, MemoryWatchStore, SqliteSnapshotStore, SqliteWatchStore};

pub struct Stores {
    pub rules: Arc<dyn WatchRuleStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

/// Opens the stores selected in the config.
pub fn open_stores(paths: &Paths, config: &Config) -> anyhow::Result<Stores> {
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let db = paths.watch_db();
            Ok(Stores {
                rules: Arc::new(SqliteWatchStore::open(&db)?),
                snapshots: Arc::new(SqliteSnapshotStore::open(&db)?),
            })
        }
        StorageBackend::Memory => {
            println!("Note: storage backend is \"memory\"; nothing persists between runs.");
            Ok(Stores {
                rules: Arc::new(MemoryWatchStore::new()),
                snapshots: Arc::new(MemorySnapshotStore::new()),
            })
        }
    }
}

pub fn format_ms(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "invalid".to_string())
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", head)
}
