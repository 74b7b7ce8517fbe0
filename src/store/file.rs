//! JSON file backed store
//!
//! Commits write a sibling temporary file and rename it over the state file,
//! so a crash mid-write leaves either the old or the new configuration.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::ConfigStore;
use crate::crd::ClusterConfiguration;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    config: RwLock<ClusterConfiguration>,
}

impl FileStore {
    /// Open the state file, creating it with bootstrap defaults when missing
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice::<ClusterConfiguration>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No cluster configuration at {}, bootstrapping defaults",
                    path.display()
                );
                let config = ClusterConfiguration::default().with_defaults();
                persist(&path, &config).await?;
                config
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            config: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn persist(path: &Path, config: &ClusterConfiguration) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::StoreError(format!("invalid state file {}", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let raw = serde_json::to_vec_pretty(config)?;
    tokio::fs::write(&tmp, raw).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn get(&self) -> Result<ClusterConfiguration> {
        Ok(self.config.read().await.clone())
    }

    async fn update(&self, patch: &ClusterConfiguration) -> Result<ClusterConfiguration> {
        // Holding the write lock across persist keeps readers on the old
        // snapshot until the new one is durable.
        let mut config = self.config.write().await;
        let merged = config.merge(patch)?;
        persist(&self.path, &merged)
            .await
            .map_err(|e| Error::StoreError(format!("failed to commit configuration: {e}")))?;
        *config = merged.clone();
        Ok(merged)
    }
}
