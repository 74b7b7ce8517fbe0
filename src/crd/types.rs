//! Configuration sections of the cluster-wide desired state
//!
//! Every field is optional so that an administrative update can carry only the
//! fields it changes. `enabled` flags are tri-state: `None` means "not set",
//! which is distinct from `Some(false)`.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_POD_CIDR: &str = "10.1.0.0/16";
pub const DEFAULT_SERVICE_CIDR: &str = "10.152.183.0/24";
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
pub const DEFAULT_UPSTREAM_NAMESERVER: &str = "/etc/resolv.conf";
pub const DEFAULT_LOCAL_STORAGE_PATH: &str = "/var/snap/k8s/common/rawfile-storage";
pub const DEFAULT_RECLAIM_POLICY: &str = "Delete";
pub const DEFAULT_SECURE_PORT: u16 = 6443;
pub const DEFAULT_BGP_PEER_PORT: u16 = 179;
pub const DEFAULT_DATASTORE: &str = "k8s-dqlite";

/// Pick the patch value when set, otherwise keep the current value
fn pick<T: Clone>(current: &Option<T>, patch: &Option<T>) -> Option<T> {
    patch.clone().or_else(|| current.clone())
}

/// Read a tri-state flag, rejecting the unset state
fn require(flag: Option<bool>, section: &str) -> Result<bool> {
    flag.ok_or_else(|| Error::ConfigError(format!("{section}.enabled is not set")))
}

/// Parse an `address/prefix` CIDR string
pub fn parse_cidr(cidr: &str) -> Result<(IpAddr, u8)> {
    let (addr, prefix) = cidr
        .trim()
        .split_once('/')
        .ok_or_else(|| Error::ConfigError(format!("invalid CIDR {cidr:?}: missing prefix")))?;
    let addr: IpAddr = addr
        .parse()
        .map_err(|e| Error::ConfigError(format!("invalid CIDR {cidr:?}: {e}")))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|e| Error::ConfigError(format!("invalid CIDR {cidr:?}: {e}")))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(Error::ConfigError(format!(
            "invalid CIDR {cidr:?}: prefix exceeds {max}"
        )));
    }
    Ok((addr, prefix))
}

/// Split a comma separated dual-stack CIDR into its IPv4 and IPv6 parts.
///
/// Either part may be empty, but not both, and each family may appear once.
pub fn split_cidrs(cidrs: &str) -> Result<(String, String)> {
    let mut ipv4 = String::new();
    let mut ipv6 = String::new();

    for cidr in cidrs.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        let (addr, _) = parse_cidr(cidr)?;
        let slot = if addr.is_ipv4() { &mut ipv4 } else { &mut ipv6 };
        if !slot.is_empty() {
            return Err(Error::ConfigError(format!(
                "multiple CIDRs of the same family in {cidrs:?}"
            )));
        }
        *slot = cidr.to_string();
    }

    if ipv4.is_empty() && ipv6.is_empty() {
        return Err(Error::ConfigError(format!("no CIDR found in {cidrs:?}")));
    }
    Ok((ipv4, ipv6))
}

/// CNI configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_cidr: Option<String>,
}

impl NetworkConfig {
    pub fn is_enabled(&self) -> Result<bool> {
        require(self.enabled, "network")
    }

    pub fn pod_cidr(&self) -> &str {
        self.pod_cidr.as_deref().unwrap_or(DEFAULT_POD_CIDR)
    }

    pub fn service_cidr(&self) -> &str {
        self.service_cidr.as_deref().unwrap_or(DEFAULT_SERVICE_CIDR)
    }

    pub(crate) fn merge(&self, patch: &Self) -> Result<Self> {
        // CIDRs are fixed once the cluster is bootstrapped
        for (name, current, new) in [
            ("pod CIDR", &self.pod_cidr, &patch.pod_cidr),
            ("service CIDR", &self.service_cidr, &patch.service_cidr),
        ] {
            if let (Some(current), Some(new)) = (current, new) {
                if current != new {
                    return Err(Error::ConfigError(format!(
                        "{name} cannot be changed from {current} to {new}"
                    )));
                }
            }
        }
        Ok(Self {
            enabled: pick(&self.enabled, &patch.enabled),
            pod_cidr: pick(&self.pod_cidr, &patch.pod_cidr),
            service_cidr: pick(&self.service_cidr, &patch.service_cidr),
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(cidr) = &self.pod_cidr {
            split_cidrs(cidr)?;
        }
        if let Some(cidr) = &self.service_cidr {
            split_cidrs(cidr)?;
        }
        Ok(())
    }
}

/// Gateway API support
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl GatewayConfig {
    pub fn is_enabled(&self) -> Result<bool> {
        require(self.enabled, "gateway")
    }

    pub(crate) fn merge(&self, patch: &Self) -> Self {
        Self {
            enabled: pick(&self.enabled, &patch.enabled),
        }
    }
}

/// Ingress controller, provided by the CNI
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_tls_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_proxy_protocol: Option<bool>,
}

impl IngressConfig {
    pub fn is_enabled(&self) -> Result<bool> {
        require(self.enabled, "ingress")
    }

    pub(crate) fn merge(&self, patch: &Self) -> Self {
        Self {
            enabled: pick(&self.enabled, &patch.enabled),
            default_tls_secret: pick(&self.default_tls_secret, &patch.default_tls_secret),
            enable_proxy_protocol: pick(&self.enable_proxy_protocol, &patch.enable_proxy_protocol),
        }
    }
}

/// An explicit start/stop address range for the load-balancer pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRange {
    pub start: String,
    pub stop: String,
}

/// Load-balancer configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidrs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_ranges: Option<Vec<IpRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_interfaces: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgp_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgp_local_asn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgp_peer_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgp_peer_asn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgp_peer_port: Option<u16>,
}

impl LoadBalancerConfig {
    pub fn is_enabled(&self) -> Result<bool> {
        require(self.enabled, "loadBalancer")
    }

    pub fn cidrs(&self) -> &[String] {
        self.cidrs.as_deref().unwrap_or_default()
    }

    pub fn ip_ranges(&self) -> &[IpRange] {
        self.ip_ranges.as_deref().unwrap_or_default()
    }

    pub fn l2_mode(&self) -> bool {
        self.l2_mode.unwrap_or(true)
    }

    pub fn l2_interfaces(&self) -> &[String] {
        self.l2_interfaces.as_deref().unwrap_or_default()
    }

    pub fn bgp_mode(&self) -> bool {
        self.bgp_mode.unwrap_or(false)
    }

    pub fn bgp_peer_port(&self) -> u16 {
        self.bgp_peer_port.unwrap_or(DEFAULT_BGP_PEER_PORT)
    }

    pub(crate) fn merge(&self, patch: &Self) -> Self {
        Self {
            enabled: pick(&self.enabled, &patch.enabled),
            cidrs: pick(&self.cidrs, &patch.cidrs),
            ip_ranges: pick(&self.ip_ranges, &patch.ip_ranges),
            l2_mode: pick(&self.l2_mode, &patch.l2_mode),
            l2_interfaces: pick(&self.l2_interfaces, &patch.l2_interfaces),
            bgp_mode: pick(&self.bgp_mode, &patch.bgp_mode),
            bgp_local_asn: pick(&self.bgp_local_asn, &patch.bgp_local_asn),
            bgp_peer_address: pick(&self.bgp_peer_address, &patch.bgp_peer_address),
            bgp_peer_asn: pick(&self.bgp_peer_asn, &patch.bgp_peer_asn),
            bgp_peer_port: pick(&self.bgp_peer_port, &patch.bgp_peer_port),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for cidr in self.cidrs() {
            parse_cidr(cidr)?;
        }
        for range in self.ip_ranges() {
            for addr in [&range.start, &range.stop] {
                addr.parse::<IpAddr>().map_err(|e| {
                    Error::ConfigError(format!("invalid load-balancer range address {addr:?}: {e}"))
                })?;
            }
        }
        if let Some(peer) = &self.bgp_peer_address {
            peer.parse::<IpAddr>().map_err(|e| {
                Error::ConfigError(format!("invalid BGP peer address {peer:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Local persistent volume provisioner
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reclaim_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

impl LocalStorageConfig {
    pub fn is_enabled(&self) -> Result<bool> {
        require(self.enabled, "localStorage")
    }

    pub fn local_path(&self) -> &str {
        self.local_path
            .as_deref()
            .unwrap_or(DEFAULT_LOCAL_STORAGE_PATH)
    }

    pub fn reclaim_policy(&self) -> &str {
        self.reclaim_policy.as_deref().unwrap_or(DEFAULT_RECLAIM_POLICY)
    }

    pub fn is_default(&self) -> bool {
        self.default.unwrap_or(true)
    }

    pub(crate) fn merge(&self, patch: &Self) -> Self {
        Self {
            enabled: pick(&self.enabled, &patch.enabled),
            local_path: pick(&self.local_path, &patch.local_path),
            reclaim_policy: pick(&self.reclaim_policy, &patch.reclaim_policy),
            default: pick(&self.default, &patch.default),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self.reclaim_policy.as_deref() {
            None | Some("Retain") | Some("Recycle") | Some("Delete") => Ok(()),
            Some(other) => Err(Error::ConfigError(format!(
                "unsupported reclaim policy {other:?}"
            ))),
        }
    }
}

/// Resource metrics server
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl MetricsServerConfig {
    pub fn is_enabled(&self) -> Result<bool> {
        require(self.enabled, "metricsServer")
    }

    pub(crate) fn merge(&self, patch: &Self) -> Self {
        Self {
            enabled: pick(&self.enabled, &patch.enabled),
        }
    }
}

/// Cluster DNS
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_nameservers: Option<Vec<String>>,
}

impl DnsConfig {
    pub fn is_enabled(&self) -> Result<bool> {
        require(self.enabled, "dns")
    }

    pub fn upstream_nameservers(&self) -> Vec<String> {
        match self.upstream_nameservers.as_deref() {
            Some(servers) if !servers.is_empty() => servers.to_vec(),
            _ => vec![DEFAULT_UPSTREAM_NAMESERVER.to_string()],
        }
    }

    pub(crate) fn merge(&self, patch: &Self) -> Self {
        Self {
            enabled: pick(&self.enabled, &patch.enabled),
            upstream_nameservers: pick(&self.upstream_nameservers, &patch.upstream_nameservers),
        }
    }
}

/// Kubelet settings shared with DNS
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_dns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,
}

impl KubeletConfig {
    pub fn cluster_dns(&self) -> &str {
        self.cluster_dns.as_deref().unwrap_or_default()
    }

    pub fn cluster_domain(&self) -> &str {
        self.cluster_domain
            .as_deref()
            .unwrap_or(DEFAULT_CLUSTER_DOMAIN)
    }

    pub(crate) fn merge(&self, patch: &Self) -> Self {
        Self {
            cluster_dns: pick(&self.cluster_dns, &patch.cluster_dns),
            cluster_domain: pick(&self.cluster_domain, &patch.cluster_domain),
        }
    }
}

/// Kubernetes API server settings the features depend on
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiServerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_port: Option<u16>,
}

impl ApiServerConfig {
    pub fn secure_port(&self) -> u16 {
        self.secure_port.unwrap_or(DEFAULT_SECURE_PORT)
    }

    pub(crate) fn merge(&self, patch: &Self) -> Self {
        Self {
            secure_port: pick(&self.secure_port, &patch.secure_port),
        }
    }
}

/// Cluster datastore. Carried for completeness; no feature reads it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatastoreConfig {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<String>>,
}

impl DatastoreConfig {
    pub(crate) fn merge(&self, patch: &Self) -> Result<Self> {
        if let (Some(current), Some(new)) = (&self.type_, &patch.type_) {
            if current != new {
                return Err(Error::ConfigError(format!(
                    "datastore type cannot be changed from {current} to {new}"
                )));
            }
        }
        Ok(Self {
            type_: pick(&self.type_, &patch.type_),
            servers: pick(&self.servers, &patch.servers),
        })
    }
}
