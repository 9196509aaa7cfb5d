//! Index store client contract consumed by the rotation engine.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;

pub mod elastic;
pub mod memory;

pub use elastic::ElasticStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),

    #[error("HTTP {status}: {reason}")]
    Rejected { status: u16, reason: String },

    #[error("index {0} already exists")]
    AlreadyExists(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Operations against the search cluster. Every call is atomic on its own;
/// nothing spans calls.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn create_index(&self, name: &str, spec: &Value) -> StoreResult<()>;

    async fn delete_index(&self, name: &str) -> StoreResult<()>;

    async fn close_index(&self, name: &str) -> StoreResult<()>;

    async fn add_alias(&self, index: &str, alias: &str) -> StoreResult<()>;

    /// Removing an alias the index does not hold succeeds.
    async fn remove_alias(&self, index: &str, alias: &str) -> StoreResult<()>;

    /// Moves `alias` from one index to another. Stores with batched alias
    /// updates override this with a single atomic call; the fallback
    /// removes first, so there is never more than one holder.
    async fn move_alias(&self, from: &str, to: &str, alias: &str) -> StoreResult<()> {
        self.remove_alias(from, alias).await?;
        self.add_alias(to, alias).await
    }

    /// Concrete index names currently holding `alias`.
    async fn list_indices_by_alias(&self, alias: &str) -> StoreResult<BTreeSet<String>>;
}
