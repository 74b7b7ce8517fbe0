//! The cluster-wide desired configuration
//!
//! Exactly one [`ClusterConfiguration`] exists per cluster. It is written
//! through a [`ConfigStore`](crate::store::ConfigStore) transaction and read as
//! an immutable snapshot by the reconcilers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::*;
use crate::error::Result;

/// Skip separately phased feature upgrades and always reconcile features
pub const ANNOTATION_DISABLE_SEPARATE_FEATURE_UPGRADES: &str =
    "k8sd/v1alpha/lifecycle/disable-separate-feature-upgrades";

/// Cluster-wide desired state for the managed features
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfiguration {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub ingress: IngressConfig,
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,
    #[serde(default)]
    pub local_storage: LocalStorageConfig,
    #[serde(default)]
    pub metrics_server: MetricsServerConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub kubelet: KubeletConfig,
    #[serde(default)]
    pub api_server: ApiServerConfig,
    #[serde(default)]
    pub datastore: DatastoreConfig,

    /// Free-form tuning knobs, read by individual features
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ClusterConfiguration {
    /// Fill every unset field with the bootstrap default.
    ///
    /// Applied by the store when a configuration is first created so that
    /// reconcilers never see an unset `enabled` flag on a bootstrapped cluster.
    pub fn with_defaults(mut self) -> Self {
        fn fill<T>(slot: &mut Option<T>, value: T) {
            if slot.is_none() {
                *slot = Some(value);
            }
        }

        fill(&mut self.network.enabled, true);
        fill(&mut self.network.pod_cidr, DEFAULT_POD_CIDR.to_string());
        fill(&mut self.network.service_cidr, DEFAULT_SERVICE_CIDR.to_string());
        fill(&mut self.gateway.enabled, true);
        fill(&mut self.ingress.enabled, false);
        fill(&mut self.ingress.enable_proxy_protocol, false);
        fill(&mut self.load_balancer.enabled, false);
        fill(&mut self.load_balancer.l2_mode, true);
        fill(&mut self.load_balancer.bgp_mode, false);
        fill(&mut self.local_storage.enabled, false);
        fill(
            &mut self.local_storage.local_path,
            DEFAULT_LOCAL_STORAGE_PATH.to_string(),
        );
        fill(
            &mut self.local_storage.reclaim_policy,
            DEFAULT_RECLAIM_POLICY.to_string(),
        );
        fill(&mut self.local_storage.default, true);
        fill(&mut self.metrics_server.enabled, true);
        fill(&mut self.dns.enabled, true);
        fill(
            &mut self.dns.upstream_nameservers,
            vec![DEFAULT_UPSTREAM_NAMESERVER.to_string()],
        );
        fill(
            &mut self.kubelet.cluster_domain,
            DEFAULT_CLUSTER_DOMAIN.to_string(),
        );
        fill(&mut self.api_server.secure_port, DEFAULT_SECURE_PORT);
        fill(&mut self.datastore.type_, DEFAULT_DATASTORE.to_string());
        self
    }

    /// Apply an administrative update on top of this configuration.
    ///
    /// Fields set in `patch` replace the stored values, unset fields are kept,
    /// annotations are merged key by key. The result is validated.
    pub fn merge(&self, patch: &ClusterConfiguration) -> Result<ClusterConfiguration> {
        let mut annotations = self.annotations.clone();
        annotations.extend(
            patch
                .annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let merged = ClusterConfiguration {
            network: self.network.merge(&patch.network)?,
            gateway: self.gateway.merge(&patch.gateway),
            ingress: self.ingress.merge(&patch.ingress),
            load_balancer: self.load_balancer.merge(&patch.load_balancer),
            local_storage: self.local_storage.merge(&patch.local_storage),
            metrics_server: self.metrics_server.merge(&patch.metrics_server),
            dns: self.dns.merge(&patch.dns),
            kubelet: self.kubelet.merge(&patch.kubelet),
            api_server: self.api_server.merge(&patch.api_server),
            datastore: self.datastore.merge(&patch.datastore)?,
            annotations,
        };
        merged.validate()?;
        Ok(merged)
    }

    /// Reject configuration that no feature could apply
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.load_balancer.validate()?;
        self.local_storage.validate()?;
        Ok(())
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}
