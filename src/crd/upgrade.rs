//! Cluster upgrade tracking resource
//!
//! Owned by the upgrade controller; the feature engine only reads it to decide
//! whether feature reconciliation is currently allowed.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired upgrade. The engine does not inspect the spec.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "k8sd.io",
    version = "v1alpha",
    kind = "Upgrade",
    plural = "upgrades",
    status = "UpgradeStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeSpec {}

/// Phase of a cluster upgrade
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum UpgradePhase {
    /// Nodes are being upgraded one by one
    #[default]
    NodeUpgrade,
    /// Node upgrades are done; features may now be reconciled
    FeatureUpgrade,
    Completed,
    Failed,
}

impl UpgradePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpgradePhase::Completed | UpgradePhase::Failed)
    }
}

impl std::fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradePhase::NodeUpgrade => write!(f, "NodeUpgrade"),
            UpgradePhase::FeatureUpgrade => write!(f, "FeatureUpgrade"),
            UpgradePhase::Completed => write!(f, "Completed"),
            UpgradePhase::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeStatus {
    #[serde(default)]
    pub phase: UpgradePhase,
}

impl Upgrade {
    /// Current phase, treating a missing status as the initial phase
    pub fn phase(&self) -> UpgradePhase {
        self.status
            .as_ref()
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    pub fn is_in_progress(&self) -> bool {
        !self.phase().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade(status: Option<UpgradePhase>) -> Upgrade {
        let mut upgrade = Upgrade::new("cluster-upgrade", UpgradeSpec::default());
        upgrade.status = status.map(|phase| UpgradeStatus { phase });
        upgrade
    }

    #[test]
    fn test_missing_status_is_in_progress() {
        let upgrade = upgrade(None);
        assert_eq!(upgrade.phase(), UpgradePhase::NodeUpgrade);
        assert!(upgrade.is_in_progress());
    }

    #[test]
    fn test_terminal_phases_are_not_in_progress() {
        assert!(!upgrade(Some(UpgradePhase::Completed)).is_in_progress());
        assert!(!upgrade(Some(UpgradePhase::Failed)).is_in_progress());
        assert!(upgrade(Some(UpgradePhase::FeatureUpgrade)).is_in_progress());
    }

    #[test]
    fn test_status_phase_deserializes() {
        let status: UpgradeStatus =
            serde_json::from_value(serde_json::json!({ "phase": "FeatureUpgrade" })).unwrap();
        assert_eq!(status.phase, UpgradePhase::FeatureUpgrade);
    }
}
