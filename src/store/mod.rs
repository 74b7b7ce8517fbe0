//! Storage of the single cluster configuration
//!
//! Writers go through [`ConfigStore::update`], which merges an update into the
//! stored configuration and commits it atomically. Readers always get a full
//! snapshot.

mod file;
mod memory;

use async_trait::async_trait;

use crate::crd::ClusterConfiguration;
use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Snapshot of the current configuration
    async fn get(&self) -> Result<ClusterConfiguration>;

    /// Merge `patch` into the stored configuration and commit it.
    ///
    /// Returns the committed configuration. Nothing is written if the merge
    /// or validation fails.
    async fn update(&self, patch: &ClusterConfiguration) -> Result<ClusterConfiguration>;
}

/// The configuration write path shared by administrative updates and
/// lifecycle hooks that feed values back into the configuration.
#[async_trait]
pub trait ConfigWriter: Send + Sync {
    async fn set(&self, patch: &ClusterConfiguration) -> Result<ClusterConfiguration>;
}
