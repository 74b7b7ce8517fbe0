use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ConfigStore;
use crate::crd::ClusterConfiguration;
use crate::error::Result;

/// Process-local store, mainly for tests and single-node setups
#[derive(Debug, Default)]
pub struct MemoryStore {
    config: RwLock<ClusterConfiguration>,
}

impl MemoryStore {
    /// Create a store holding `initial` with bootstrap defaults applied
    pub fn new(initial: ClusterConfiguration) -> Self {
        Self {
            config: RwLock::new(initial.with_defaults()),
        }
    }

    /// Create a store holding `config` exactly as given
    pub fn raw(config: ClusterConfiguration) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(&self) -> Result<ClusterConfiguration> {
        Ok(self.config.read().await.clone())
    }

    async fn update(&self, patch: &ClusterConfiguration) -> Result<ClusterConfiguration> {
        let mut config = self.config.write().await;
        let merged = config.merge(patch)?;
        *config = merged.clone();
        Ok(merged)
    }
}
