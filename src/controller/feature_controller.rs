//! Feature controller
//!
//! A single loop per node that runs at most one reconcile pass at a time.
//! Passes start on a queued trigger, on a retry requested by the previous
//! pass, or on a low-frequency fallback tick that catches missed triggers.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::leader::LeaderGate;
use super::queue::{Trigger, TriggerReceiver};
use super::upgrade_gate::{is_blocked, UpgradeStatusSource};
use crate::error::{Error, Result};
use crate::features::{FeatureReconciler, ReconcileSignal};
use crate::store::ConfigStore;

/// Requeue delay after a transient failure
pub const RETRY_TRANSIENT: Duration = Duration::from_secs(15);
/// Requeue delay after a failure that needs operator action
pub const RETRY_PERMANENT: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub fallback_interval: Duration,
    pub pass_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            fallback_interval: Duration::from_secs(5 * 60),
            pass_timeout: Duration::from_secs(10 * 60),
        }
    }
}

/// How the last pass ended
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum PassOutcome {
    Done,
    Requeued {
        #[serde(rename = "afterSecs")]
        after_secs: u64,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassStatus {
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: PassOutcome,
}

/// Shared view of the last pass, read by the REST API
pub type StatusHandle = Arc<RwLock<Option<PassStatus>>>;

/// Delay before retrying a failed pass
pub fn error_policy(error: &Error) -> Duration {
    if error.is_retriable() {
        RETRY_TRANSIENT
    } else {
        RETRY_PERMANENT
    }
}

enum Wake {
    Trigger(Trigger),
    Retry,
    Fallback,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}

pub struct FeatureController {
    store: Arc<dyn ConfigStore>,
    reconciler: FeatureReconciler,
    upgrades: Arc<dyn UpgradeStatusSource>,
    leader: LeaderGate,
    settings: ControllerSettings,
    status: StatusHandle,
}

impl FeatureController {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        reconciler: FeatureReconciler,
        upgrades: Arc<dyn UpgradeStatusSource>,
        leader: LeaderGate,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            reconciler,
            upgrades,
            leader,
            settings,
            status: Arc::new(RwLock::new(None)),
        }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Run until `shutdown` flips or every trigger handle is dropped
    pub async fn run(self, mut triggers: TriggerReceiver, mut shutdown: watch::Receiver<bool>) {
        info!(
            node = self.leader.node_name(),
            "Starting feature controller (fallback every {:?})", self.settings.fallback_interval
        );

        let mut fallback = tokio::time::interval_at(
            Instant::now() + self.settings.fallback_interval,
            self.settings.fallback_interval,
        );
        fallback.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_at: Option<Instant> = None;

        loop {
            let wake = tokio::select! {
                _ = shutdown.changed() => break,
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => Wake::Trigger(trigger),
                    None => break,
                },
                _ = wait_until(retry_at) => Wake::Retry,
                _ = fallback.tick() => Wake::Fallback,
            };
            retry_at = None;

            // Queued triggers were leader-gated by their producer. Timer
            // wakeups are not, so check here.
            match wake {
                Wake::Trigger(trigger) => debug!(?trigger, "Pass triggered"),
                Wake::Retry | Wake::Fallback => match self.leader.is_leader().await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("Not the leader, skipping timed pass");
                        continue;
                    }
                    Err(e) => {
                        warn!("Cannot determine leadership, skipping timed pass: {}", e);
                        continue;
                    }
                },
            }

            // Dropping an unfinished pass kills its installer subprocesses.
            let result = tokio::select! {
                _ = shutdown.changed() => {
                    info!("Shutdown requested, abandoning reconcile pass");
                    break;
                }
                result = self.reconcile_once() => result,
            };
            let delay = match result {
                Ok(signal) => signal.requeue_after(),
                Err(e) => Some(error_policy(&e)),
            };
            retry_at = delay.map(|d| Instant::now() + d);
        }

        info!("Feature controller stopped");
    }

    /// One gated pass over every feature, bounded by the pass timeout
    #[instrument(skip(self), fields(node = self.leader.node_name()))]
    pub async fn reconcile_once(&self) -> Result<ReconcileSignal> {
        let started = std::time::Instant::now();
        let timeout = self.settings.pass_timeout;
        let result = match tokio::time::timeout(timeout, self.gated_pass()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        };

        #[cfg(feature = "metrics")]
        super::metrics::observe_reconcile_duration_seconds(started.elapsed().as_secs_f64());

        let outcome = match &result {
            Ok(None) => PassOutcome::Skipped {
                reason: "upgrade-in-progress".to_string(),
            },
            Ok(Some(ReconcileSignal::Done)) => PassOutcome::Done,
            Ok(Some(signal)) => PassOutcome::Requeued {
                after_secs: signal.requeue_after().unwrap_or_default().as_secs(),
            },
            Err(e) => {
                error!("Feature reconcile failed after {:?}: {}", started.elapsed(), e);
                #[cfg(feature = "metrics")]
                super::metrics::inc_reconcile_error(e.kind());
                PassOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        *self.status.write().await = Some(PassStatus {
            finished_at: Utc::now(),
            outcome,
        });

        result.map(Option::unwrap_or_default)
    }

    /// `None` when the pass was skipped by the upgrade gate
    async fn gated_pass(&self) -> Result<Option<ReconcileSignal>> {
        let config = self.store.get().await?;

        if is_blocked(self.upgrades.as_ref(), &config).await? {
            #[cfg(feature = "metrics")]
            super::metrics::inc_pass_skipped("upgrade-in-progress");
            return Ok(None);
        }

        let signal = self.reconciler.reconcile(&config).await?;
        info!("Feature reconcile pass finished: {:?}", signal);
        Ok(Some(signal))
    }
}
