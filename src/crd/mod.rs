//! Data model and Kubernetes custom resources
//!
//! [`ClusterConfiguration`] is the desired state driven by the feature engine;
//! [`Upgrade`] is read to gate reconciliation during cluster upgrades.

mod cluster_config;
pub mod types;
mod upgrade;

pub use cluster_config::{ClusterConfiguration, ANNOTATION_DISABLE_SEPARATE_FEATURE_UPGRADES};
pub use types::*;
pub use upgrade::{Upgrade, UpgradePhase, UpgradeSpec, UpgradeStatus};
