//! Controller module for feature reconciliation
//! This module contains the leader and upgrade gates, the trigger queue,
//! the feature controller loop and the configuration write path.

mod feature_controller;
pub mod leader;
#[cfg(feature = "metrics")]
pub mod metrics;
mod notify;
mod queue;
pub mod upgrade_gate;

pub use feature_controller::{
    error_policy, ControllerSettings, FeatureController, PassOutcome, PassStatus, StatusHandle,
    RETRY_PERMANENT, RETRY_TRANSIENT,
};
pub use leader::{LeaderGate, LeaseLeadership, LeadershipSource};
pub use notify::{ConfigService, NotifySettings, PeerNotifier, NOTIFY_PATH};
pub use queue::{trigger_queue, Trigger, TriggerHandle, TriggerReceiver};
pub use upgrade_gate::{KubeUpgradeStatus, UpgradeStatusSource};
