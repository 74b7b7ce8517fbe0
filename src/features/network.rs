//! Cilium CNI, which also serves ingress and the Gateway API

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::json;

use super::component::Component;
use super::into_values;
use crate::crd::{split_cidrs, ClusterConfiguration};
use crate::error::{Error, Result};
use crate::helm::{ChartRef, Values};

const CHART: ChartRef = ChartRef::new("ck-network", "kube-system", "cilium");

const AGENT_IMAGE_REPO: &str = "ghcr.io/canonical/cilium";
const AGENT_IMAGE_TAG: &str = "1.16.3-ck0";
const OPERATOR_IMAGE_REPO: &str = "ghcr.io/canonical/cilium-operator";
const OPERATOR_IMAGE_TAG: &str = "1.16.3-ck0";

pub const ANNOTATION_DEVICES: &str = "k8sd/v1alpha1/cilium/devices";
pub const ANNOTATION_DIRECT_ROUTING_DEVICE: &str = "k8sd/v1alpha1/cilium/direct-routing-device";
pub const ANNOTATION_VLAN_BPF_BYPASS: &str = "k8sd/v1alpha1/cilium/vlan-bpf-bypass";
pub const ANNOTATION_CNI_EXCLUSIVE: &str = "k8sd/v1alpha1/cilium/cni-exclusive";
pub const ANNOTATION_SCTP_ENABLED: &str = "k8sd/v1alpha1/cilium/sctp/enabled";
pub const ANNOTATION_TUNNEL_PORT: &str = "k8sd/v1alpha1/cilium/tunnel-port";

const DEFAULT_VXLAN_PORT: u16 = 8472;
const MAX_VLAN_ID: u16 = 4094;

/// Tuning read from configuration annotations
#[derive(Debug, PartialEq, Eq)]
struct Tuning {
    devices: String,
    direct_routing_device: String,
    vlan_bpf_bypass: Option<Vec<u16>>,
    cni_exclusive: bool,
    sctp_enabled: bool,
    tunnel_port: u16,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            devices: String::new(),
            direct_routing_device: String::new(),
            vlan_bpf_bypass: None,
            cni_exclusive: false,
            sctp_enabled: false,
            tunnel_port: DEFAULT_VXLAN_PORT,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(Error::ConfigError(format!(
            "annotation {key}: invalid boolean {value:?}"
        ))),
    }
}

/// Parse a VLAN id list like `1,2,3` or `{1, 2}`. Duplicates collapse and
/// the result is sorted. `0` is the wildcard tag.
fn parse_vlan_list(value: &str) -> Result<Vec<u16>> {
    let trimmed = value.trim().trim_start_matches('{').trim_end_matches('}');
    let mut tags = BTreeSet::new();
    for raw in trimmed.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let tag: u16 = raw.parse().map_err(|_| {
            Error::ConfigError(format!(
                "annotation {ANNOTATION_VLAN_BPF_BYPASS}: invalid VLAN tag {raw:?}"
            ))
        })?;
        if tag > MAX_VLAN_ID {
            return Err(Error::ConfigError(format!(
                "annotation {ANNOTATION_VLAN_BPF_BYPASS}: VLAN tag {tag} out of range 0-{MAX_VLAN_ID}"
            )));
        }
        tags.insert(tag);
    }
    Ok(tags.into_iter().collect())
}

impl Tuning {
    fn from_annotations(annotations: &BTreeMap<String, String>) -> Result<Self> {
        let mut tuning = Tuning::default();
        if let Some(v) = annotations.get(ANNOTATION_DEVICES) {
            tuning.devices = v.clone();
        }
        if let Some(v) = annotations.get(ANNOTATION_DIRECT_ROUTING_DEVICE) {
            tuning.direct_routing_device = v.clone();
        }
        if let Some(v) = annotations.get(ANNOTATION_VLAN_BPF_BYPASS) {
            tuning.vlan_bpf_bypass = Some(parse_vlan_list(v)?);
        }
        if let Some(v) = annotations.get(ANNOTATION_CNI_EXCLUSIVE) {
            tuning.cni_exclusive = parse_bool(ANNOTATION_CNI_EXCLUSIVE, v)?;
        }
        if let Some(v) = annotations.get(ANNOTATION_SCTP_ENABLED) {
            tuning.sctp_enabled = parse_bool(ANNOTATION_SCTP_ENABLED, v)?;
        }
        if let Some(v) = annotations.get(ANNOTATION_TUNNEL_PORT) {
            tuning.tunnel_port = v.trim().parse().map_err(|_| {
                Error::ConfigError(format!(
                    "annotation {ANNOTATION_TUNNEL_PORT}: invalid port {v:?}"
                ))
            })?;
        }
        Ok(tuning)
    }
}

#[derive(Debug, Default)]
pub struct Network;

#[async_trait]
impl Component for Network {
    fn chart(&self) -> &ChartRef {
        &CHART
    }

    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool> {
        config.network.is_enabled()
    }

    async fn values(&self, config: &ClusterConfiguration) -> Result<Values> {
        let tuning = Tuning::from_annotations(&config.annotations)?;
        let (ipv4_cidr, ipv6_cidr) = split_cidrs(config.network.pod_cidr())?;
        let ipv6_only = ipv4_cidr.is_empty() && !ipv6_cidr.is_empty();
        // socketLB talks to the local API server endpoint, not the service VIP
        let service_host = if ipv6_only { "::1" } else { "127.0.0.1" };

        let mut node_port = json!({
            "enabled": true,
            // kube-proxy binds the same health check port
            "enableHealthCheck": false,
        });
        if !tuning.direct_routing_device.is_empty() {
            node_port["directRoutingDevice"] = json!(tuning.direct_routing_device);
        }

        let mut bpf = json!({});
        if let Some(tags) = &tuning.vlan_bpf_bypass {
            bpf["vlanBypass"] = json!(tags);
        }

        let mut values = json!({
            "bpf": bpf,
            "image": {
                "repository": AGENT_IMAGE_REPO,
                "tag": AGENT_IMAGE_TAG,
                "useDigest": false,
            },
            "socketLB": { "enabled": true },
            "cni": {
                "confPath": "/etc/cni/net.d",
                "binPath": "/opt/cni/bin",
                "exclusive": tuning.cni_exclusive,
                "chainingMode": "portmap",
            },
            "sctp": { "enabled": tuning.sctp_enabled },
            "operator": {
                "replicas": 1,
                "image": {
                    "repository": OPERATOR_IMAGE_REPO,
                    "tag": OPERATOR_IMAGE_TAG,
                    "useDigest": false,
                },
            },
            "ipv4": { "enabled": !ipv4_cidr.is_empty() },
            "ipv6": { "enabled": !ipv6_cidr.is_empty() },
            "ipam": {
                "operator": {
                    "clusterPoolIPv4PodCIDRList": ipv4_cidr,
                    "clusterPoolIPv6PodCIDRList": ipv6_cidr,
                },
            },
            "envoy": { "enabled": false },
            "nodePort": node_port,
            "disableEnvoyVersionCheck": true,
            "k8sServiceHost": service_host,
            "k8sServicePort": config.api_server.secure_port(),
            "enableRuntimeDeviceDetection": true,
            "sessionAffinity": true,
            "loadBalancer": {
                "protocolDifferentiation": { "enabled": true },
            },
            "tunnelPort": tuning.tunnel_port,
        });

        if ipv6_only {
            values["routingMode"] = json!("native");
            values["autoDirectNodeRoutes"] = json!(true);
        }
        if !tuning.devices.is_empty() {
            values["devices"] = json!(tuning.devices);
        }

        values["ingressController"] = if config.ingress.enabled.unwrap_or(false) {
            json!({
                "enabled": true,
                "loadBalancerMode": "shared",
                "defaultSecretNamespace": "kube-system",
                "defaultSecretName": config.ingress.default_tls_secret.clone().unwrap_or_default(),
                "enableProxyProtocol": config.ingress.enable_proxy_protocol.unwrap_or(false),
            })
        } else {
            json!({
                "enabled": false,
                "loadBalancerMode": "",
                "defaultSecretNamespace": "",
                "defaultSecretName": "",
                "enableProxyProtocol": false,
            })
        };

        values["gatewayAPI"] = if config.gateway.enabled.unwrap_or(false) {
            // The chart takes "auto", "true" or "false" as a string here
            json!({ "enabled": true, "gatewayClass": { "create": "false" } })
        } else {
            json!({ "enabled": false })
        };

        Ok(into_values(values))
    }
}
