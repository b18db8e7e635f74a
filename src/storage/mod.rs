//! Local key-value persistence.
//!
//! Values are whole JSON documents stored under namespaced string keys. Every
//! write replaces the entire value of its key; there are no field-level updates.

mod local;
mod memory;
mod schema;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use local::{LocalStore, StorageKeys};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Removes several keys at once (logout / reset).
    async fn multi_remove(&self, keys: &[String]) -> Result<()>;
}
