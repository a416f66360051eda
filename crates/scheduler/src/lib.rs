pub mod coordinator;
pub mod diff;
pub mod reconciler;
pub mod service;
pub mod timer;

pub use coordinator::WatchCoordinator;
pub use diff::{change_ratio, fingerprint};
pub use reconciler::ChangeReconciler;
pub use service::WatchService;
pub use timer::{DueEntry, FireSchedule};
