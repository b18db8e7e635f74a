mod backend;
mod queue;

pub use backend::{ApiReplay, SyncBackend};
pub use queue::OfflineQueue;
