//! Cluster notification
//!
//! Every configuration write commits first, then fires the local trigger if
//! this node leads, then asks every peer to re-evaluate. Both follow-ups are
//! best effort: failures are logged and never fail the write.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::leader::LeaderGate;
use super::queue::{Trigger, TriggerHandle};
use crate::crd::ClusterConfiguration;
use crate::error::{Error, Result};
use crate::store::{ConfigStore, ConfigWriter};

pub const NOTIFY_PATH: &str = "/1.0/k8sd/cluster/config/notify";

#[derive(Clone, Debug)]
pub struct NotifySettings {
    /// Per-peer request timeout
    pub timeout: Duration,
    /// Peers contacted at once
    pub concurrency: usize,
    /// Accept self-signed peer certificates
    pub insecure_skip_verify: bool,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            concurrency: 8,
            insecure_skip_verify: false,
        }
    }
}

/// Fan-out of "re-evaluate configuration" requests to cluster members
pub struct PeerNotifier {
    client: Client,
    peers: Vec<String>,
    settings: NotifySettings,
}

impl PeerNotifier {
    /// `peers` are `host:port` addresses (HTTPS) or full base URLs
    pub fn new(peers: Vec<String>, settings: NotifySettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.insecure_skip_verify)
            .user_agent(concat!("k8sd-features/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::HttpError)?;
        Ok(Self {
            client,
            peers,
            settings,
        })
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    fn notify_url(peer: &str) -> String {
        let base = peer.trim_end_matches('/');
        if base.contains("://") {
            format!("{base}{NOTIFY_PATH}")
        } else {
            format!("https://{base}{NOTIFY_PATH}")
        }
    }

    async fn notify_one(client: Client, url: String) -> Result<()> {
        let response = client.post(url).send().await?;
        response.error_for_status()?;
        Ok(())
    }

    /// Notify every peer; returns how many failed
    #[instrument(skip(self), fields(peers = self.peers.len()))]
    pub async fn broadcast(&self) -> usize {
        let requests: Vec<_> = self
            .peers
            .iter()
            .map(|peer| {
                let peer = peer.clone();
                let request = Self::notify_one(self.client.clone(), Self::notify_url(&peer));
                async move { (peer, request.await) }
            })
            .collect();

        let results: Vec<(String, Result<()>)> = stream::iter(requests)
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut failures = 0;
        for (peer, result) in results {
            match result {
                Ok(()) => debug!("Notified peer {}", peer),
                Err(e) => {
                    failures += 1;
                    warn!("Failed to notify peer {} of configuration change: {}", peer, e);
                    #[cfg(feature = "metrics")]
                    super::metrics::inc_peer_notify_failure();
                }
            }
        }
        failures
    }
}

/// The configuration write path
pub struct ConfigService {
    store: Arc<dyn ConfigStore>,
    leader: LeaderGate,
    triggers: TriggerHandle,
    peers: Arc<PeerNotifier>,
}

impl ConfigService {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        leader: LeaderGate,
        triggers: TriggerHandle,
        peers: Arc<PeerNotifier>,
    ) -> Self {
        Self {
            store,
            leader,
            triggers,
            peers,
        }
    }

    pub fn node_name(&self) -> &str {
        self.leader.node_name()
    }

    pub async fn get(&self) -> Result<ClusterConfiguration> {
        self.store.get().await
    }

    /// Commit `patch`, then run the best-effort follow-ups
    #[instrument(skip_all, fields(node = self.leader.node_name()))]
    pub async fn update(&self, patch: &ClusterConfiguration) -> Result<ClusterConfiguration> {
        let committed = self.store.update(patch).await?;
        info!("Cluster configuration updated");

        if let Err(e) = self.on_config_changed(Trigger::ConfigChanged).await {
            warn!("Failed to trigger feature reconcile after update: {}", e);
        }
        self.notify_peers();

        Ok(committed)
    }

    /// Fire the local trigger when this node leads. Returns whether it fired.
    pub async fn on_config_changed(&self, trigger: Trigger) -> Result<bool> {
        if !self.leader.is_leader().await? {
            debug!("Not the leader, not triggering feature reconcile");
            return Ok(false);
        }
        Ok(self.triggers.trigger(trigger))
    }

    fn notify_peers(&self) -> Option<JoinHandle<usize>> {
        if self.peers.peers().is_empty() {
            return None;
        }
        let peers = self.peers.clone();
        Some(tokio::spawn(async move {
            let failures = peers.broadcast().await;
            if failures > 0 {
                warn!(
                    "{} of {} peers missed the configuration change notification",
                    failures,
                    peers.peers().len()
                );
            }
            failures
        }))
    }
}

#[async_trait]
impl ConfigWriter for ConfigService {
    async fn set(&self, patch: &ClusterConfiguration) -> Result<ClusterConfiguration> {
        self.update(patch).await
    }
}
