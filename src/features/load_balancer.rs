//! MetalLB and the address pool resources it serves

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::component::{Component, ReconcileSignal};
use super::into_values;
use super::lookup::ClusterLookup;
use crate::crd::ClusterConfiguration;
use crate::error::Result;
use crate::helm::{ChartRef, Values};

const METALLB_CHART: ChartRef = ChartRef::new("metallb", "metallb-system", "metallb");
const POOL_CHART: ChartRef =
    ChartRef::new("metallb-loadbalancer", "metallb-system", "ck-loadbalancer");

const CONTROLLER_IMAGE_REPO: &str = "ghcr.io/canonical/metallb-controller";
const CONTROLLER_IMAGE_TAG: &str = "v0.14.8-ck0";
const SPEAKER_IMAGE_REPO: &str = "ghcr.io/canonical/metallb-speaker";
const SPEAKER_IMAGE_TAG: &str = "v0.14.8-ck0";
const FRR_IMAGE_REPO: &str = "ghcr.io/canonical/frr";
const FRR_IMAGE_TAG: &str = "9.1.0";

const L2_CRDS: [&str; 2] = ["ipaddresspools.metallb.io", "l2advertisements.metallb.io"];
const BGP_CRDS: [&str; 2] = ["bgppeers.metallb.io", "bgpadvertisements.metallb.io"];

/// Retry delay while the MetalLB CRDs are not established
pub const CRD_RETRY_DELAY: Duration = Duration::from_secs(5);

/// The MetalLB controller and speaker
#[derive(Debug, Default)]
pub struct MetalLb;

#[async_trait]
impl Component for MetalLb {
    fn chart(&self) -> &ChartRef {
        &METALLB_CHART
    }

    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool> {
        config.load_balancer.is_enabled()
    }

    async fn values(&self, _config: &ClusterConfiguration) -> Result<Values> {
        Ok(into_values(json!({
            "controller": {
                "image": { "repository": CONTROLLER_IMAGE_REPO, "tag": CONTROLLER_IMAGE_TAG },
                "command": "/controller",
            },
            "speaker": {
                "image": { "repository": SPEAKER_IMAGE_REPO, "tag": SPEAKER_IMAGE_TAG },
                "command": "/speaker",
                "frr": {
                    "enabled": false,
                    "image": { "repository": FRR_IMAGE_REPO, "tag": FRR_IMAGE_TAG },
                },
            },
        })))
    }
}

/// IPAddressPool, L2Advertisement and BGP resources for the configured pool
pub struct LoadBalancerPool {
    lookup: Arc<dyn ClusterLookup>,
}

impl LoadBalancerPool {
    pub fn new(lookup: Arc<dyn ClusterLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl Component for LoadBalancerPool {
    fn chart(&self) -> &ChartRef {
        &POOL_CHART
    }

    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool> {
        config.load_balancer.is_enabled()
    }

    async fn values(&self, config: &ClusterConfiguration) -> Result<Values> {
        let lb = &config.load_balancer;

        let mut pool: Vec<serde_json::Value> =
            lb.cidrs().iter().map(|cidr| json!({ "cidr": cidr })).collect();
        pool.extend(
            lb.ip_ranges()
                .iter()
                .map(|r| json!({ "start": r.start, "stop": r.stop })),
        );

        Ok(into_values(json!({
            "driver": "metallb",
            "l2": {
                "enabled": lb.l2_mode(),
                "interfaces": lb.l2_interfaces(),
            },
            "ipPool": { "cidrs": pool },
            "bgp": {
                "enabled": lb.bgp_mode(),
                "localASN": lb.bgp_local_asn.unwrap_or_default(),
                "neighbors": [{
                    "peerAddress": lb.bgp_peer_address.clone().unwrap_or_default(),
                    "peerASN": lb.bgp_peer_asn.unwrap_or_default(),
                    "peerPort": lb.bgp_peer_port(),
                }],
            },
        })))
    }

    /// Check, without waiting, that the pool CRDs installed by MetalLB are
    /// established. The pass is retried shortly if they are not.
    async fn pre_install(&self, config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        let bgp = config.load_balancer.bgp_mode();
        let required = L2_CRDS
            .iter()
            .chain(BGP_CRDS.iter().filter(|_| bgp));

        for crd in required {
            if !self.lookup.crd_established(crd).await? {
                info!("CRD {} is not established yet, retrying", crd);
                return Ok(ReconcileSignal::RequeueAfter(CRD_RETRY_DELAY));
            }
        }
        Ok(ReconcileSignal::Done)
    }
}
