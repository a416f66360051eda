pub mod memory;
pub mod sqlite;

pub use memory::{MemorySnapshotStore, MemoryWatchStore};
pub use sqlite::{SqliteSnapshotStore, SqliteWatchStore};
