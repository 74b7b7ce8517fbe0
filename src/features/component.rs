//! Feature component contract
//!
//! A component is one optional cluster add-on installed as a single release.
//! Every lifecycle hook defaults to a no-op that lets reconciliation continue;
//! components override only the hooks they need.

use std::time::Duration;

use async_trait::async_trait;

use crate::crd::ClusterConfiguration;
use crate::error::Result;
use crate::helm::{ChartRef, Values};

/// Outcome of a reconciliation step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconcileSignal {
    /// Continue with the next step
    #[default]
    Done,
    /// Stop this pass and retry as soon as possible
    Requeue,
    /// Stop this pass and retry after the given delay
    RequeueAfter(Duration),
}

impl ReconcileSignal {
    /// True for the terminal "continue" outcome
    pub fn is_done(&self) -> bool {
        matches!(self, ReconcileSignal::Done)
    }

    /// Delay before the next pass, if any was requested
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            ReconcileSignal::Done => None,
            ReconcileSignal::Requeue => Some(Duration::ZERO),
            ReconcileSignal::RequeueAfter(delay) => Some(*delay),
        }
    }
}

#[async_trait]
pub trait Component: Send + Sync {
    /// Release name, namespace and chart of this component
    fn chart(&self) -> &ChartRef;

    fn name(&self) -> &str {
        self.chart().release_name
    }

    /// Whether the configuration asks for this component.
    ///
    /// An unset enablement flag is a configuration error, never `false`.
    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool>;

    /// Installer parameters for the given configuration
    async fn values(&self, config: &ClusterConfiguration) -> Result<Values>;

    /// Runs before the release is looked up
    async fn pre_reconcile(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        Ok(ReconcileSignal::Done)
    }

    async fn pre_install(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        Ok(ReconcileSignal::Done)
    }

    async fn post_install(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        Ok(ReconcileSignal::Done)
    }

    async fn pre_uninstall(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        Ok(ReconcileSignal::Done)
    }

    async fn post_uninstall(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        Ok(ReconcileSignal::Done)
    }

    async fn pre_upgrade(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        Ok(ReconcileSignal::Done)
    }

    async fn post_upgrade(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        Ok(ReconcileSignal::Done)
    }
}
