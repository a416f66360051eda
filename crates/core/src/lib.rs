pub mod capability;
pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod store;
pub mod types;
pub mod watch;

pub use capability::{
    CapabilityDescriptor, CapabilityFlags, Integration, IntentClassifier, Reconnecting,
    SceneDescriber, StreamingIntegration,
};
pub use config::{
    Config, FingerprintAlgorithm, ReconcilerConfig, RouterConfig, StorageBackend, StorageConfig,
    WatchConfig,
};
pub use error::{Error, Result};
pub use event::{EventBus, Subscription};
pub use paths::Paths;
pub use store::{SnapshotStore, WatchRuleStore};
pub use types::{
    ContentBlock, ContentKind, Query, QueryMetadata, QueryOrigin, QueryResult, ResultMetadata,
    ResultStatus, SEARCH_INTENT,
};
pub use watch::{ChangeKind, ChangeRecord, Severity, Snapshot, StopReason, WatchEvent, WatchRule};

/// Truncate a string to at most `max_chars` characters.
pub fn safe_truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}
