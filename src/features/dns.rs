//! CoreDNS

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use super::component::{Component, ReconcileSignal};
use super::into_values;
use super::lookup::ClusterLookup;
use crate::crd::{ClusterConfiguration, KubeletConfig};
use crate::error::Result;
use crate::helm::{ChartRef, Values};
use crate::store::ConfigWriter;

const CHART: ChartRef = ChartRef::new("ck-dns", "kube-system", "coredns");

const IMAGE_REPO: &str = "ghcr.io/canonical/coredns";
const IMAGE_TAG: &str = "1.11.3-ck0";

pub const SERVICE_NAME: &str = "coredns";

pub struct Dns {
    lookup: Arc<dyn ClusterLookup>,
    writer: Arc<dyn ConfigWriter>,
}

impl Dns {
    pub fn new(lookup: Arc<dyn ClusterLookup>, writer: Arc<dyn ConfigWriter>) -> Self {
        Self { lookup, writer }
    }
}

#[async_trait]
impl Component for Dns {
    fn chart(&self) -> &ChartRef {
        &CHART
    }

    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool> {
        config.dns.is_enabled()
    }

    async fn values(&self, config: &ClusterConfiguration) -> Result<Values> {
        let cluster_domain = config.kubelet.cluster_domain();
        let forward = format!(". {}", config.dns.upstream_nameservers().join(" "));

        Ok(into_values(json!({
            "image": {
                "repository": IMAGE_REPO,
                "tag": IMAGE_TAG,
            },
            "service": {
                "name": SERVICE_NAME,
                "clusterIP": config.kubelet.cluster_dns(),
            },
            "serviceAccount": {
                "create": true,
                "name": SERVICE_NAME,
            },
            "deployment": { "name": SERVICE_NAME },
            "servers": [{
                "zones": [{ "zone": "." }],
                "port": 53,
                "plugins": [
                    { "name": "errors" },
                    { "name": "health", "configBlock": "lameduck 5s" },
                    { "name": "ready" },
                    {
                        "name": "kubernetes",
                        "parameters": format!("{cluster_domain} in-addr.arpa ip6.arpa"),
                        "configBlock": "pods insecure\nfallthrough in-addr.arpa ip6.arpa\nttl 30",
                    },
                    { "name": "prometheus", "parameters": "0.0.0.0:9153" },
                    { "name": "forward", "parameters": forward },
                    { "name": "cache", "parameters": "30" },
                    { "name": "loop" },
                    { "name": "reload" },
                    { "name": "loadbalance" },
                ],
            }],
            "securityContext": {
                "allowPrivilegeEscalation": true,
                "readOnlyRootFilesystem": false,
                "capabilities": { "drop": [] },
            },
        })))
    }

    /// Retry a write-back that an earlier pass could not finish. Until the
    /// DNS service exists the lookup fails and the pass carries on.
    async fn pre_reconcile(&self, config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        if !config.kubelet.cluster_dns().is_empty() || !config.dns.is_enabled().unwrap_or(false) {
            return Ok(ReconcileSignal::Done);
        }
        if let Err(e) = self.record_service_address(config).await {
            debug!("DNS service address not available yet: {}", e);
        }
        Ok(ReconcileSignal::Done)
    }

    async fn post_install(&self, config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        self.record_service_address(config).await?;
        Ok(ReconcileSignal::Done)
    }
}

impl Dns {
    /// Record the service address the cluster assigned to DNS so kubelets
    /// and later passes see it.
    async fn record_service_address(&self, config: &ClusterConfiguration) -> Result<()> {
        let dns_ip = self
            .lookup
            .service_cluster_ip(SERVICE_NAME, CHART.namespace)
            .await?;
        if config.kubelet.cluster_dns() == dns_ip {
            return Ok(());
        }

        let patch = ClusterConfiguration {
            kubelet: KubeletConfig {
                cluster_dns: Some(dns_ip.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.writer.set(&patch).await?;
        info!("Cluster DNS address set to {}", dns_ip);
        Ok(())
    }
}
