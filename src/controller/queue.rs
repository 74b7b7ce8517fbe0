//! Local trigger queue
//!
//! A single-slot channel between configuration writers and the feature
//! controller. A signal sent while one is already pending coalesces with it,
//! so writers never block and a pending signal is never lost.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Why a pass was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// The configuration was written on this node
    ConfigChanged,
    /// A peer asked this node to re-evaluate
    PeerNotified,
}

/// Producer side, cheap to clone
#[derive(Clone, Debug)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Trigger>,
}

/// Consumer side, owned by the feature controller
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<Trigger>,
}

pub fn trigger_queue() -> (TriggerHandle, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (TriggerHandle { tx }, TriggerReceiver { rx })
}

impl TriggerHandle {
    /// Request a pass without waiting.
    ///
    /// Returns `false` only if the controller has shut down.
    pub fn trigger(&self, trigger: Trigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(?trigger, "Pass already pending, coalescing trigger");
                true
            }
            Err(TrySendError::Closed(_)) => {
                warn!(?trigger, "Feature controller is not running, dropping trigger");
                false
            }
        }
    }
}

impl TriggerReceiver {
    /// Wait for the next signal; `None` once every handle is dropped
    pub async fn recv(&mut self) -> Option<Trigger> {
        self.rx.recv().await
    }
}
