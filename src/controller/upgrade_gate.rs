//! Upgrade block gate
//!
//! While a cluster upgrade rolls nodes, features must not be reconciled
//! unless the upgrade has reached its feature phase.

use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::Client;
use tracing::info;

use crate::crd::{
    ClusterConfiguration, Upgrade, UpgradePhase, ANNOTATION_DISABLE_SEPARATE_FEATURE_UPGRADES,
};
use crate::error::Result;

#[async_trait]
pub trait UpgradeStatusSource: Send + Sync {
    /// Phase of the upgrade in progress, if any
    async fn in_progress(&self) -> Result<Option<UpgradePhase>>;
}

pub struct KubeUpgradeStatus {
    upgrades: Api<Upgrade>,
}

impl KubeUpgradeStatus {
    pub fn new(client: Client) -> Self {
        Self {
            upgrades: Api::all(client),
        }
    }
}

#[async_trait]
impl UpgradeStatusSource for KubeUpgradeStatus {
    async fn in_progress(&self) -> Result<Option<UpgradePhase>> {
        let upgrades = self.upgrades.list(&ListParams::default()).await?;
        Ok(upgrades
            .items
            .iter()
            .find(|u| u.is_in_progress())
            .map(Upgrade::phase))
    }
}

/// Whether an in-progress upgrade forbids reconciling features now
pub async fn is_blocked(
    source: &dyn UpgradeStatusSource,
    config: &ClusterConfiguration,
) -> Result<bool> {
    if config
        .annotation(ANNOTATION_DISABLE_SEPARATE_FEATURE_UPGRADES)
        .is_some()
    {
        return Ok(false);
    }

    match source.in_progress().await? {
        Some(UpgradePhase::FeatureUpgrade) | None => Ok(false),
        Some(phase) => {
            info!("Upgrade in progress in phase {}, skipping features", phase);
            Ok(true)
        }
    }
}
