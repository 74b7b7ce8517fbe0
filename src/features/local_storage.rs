//! Rawfile local persistent volume provisioner

use async_trait::async_trait;
use serde_json::json;

use super::component::Component;
use super::into_values;
use crate::crd::ClusterConfiguration;
use crate::error::Result;
use crate::helm::{ChartRef, Values};

const CHART: ChartRef = ChartRef::new("ck-storage", "kube-system", "rawfile-csi");

const IMAGE_REPO: &str = "ghcr.io/canonical/rawfile-localpv";
const IMAGE_TAG: &str = "0.8.0-ck4";
const CSI_NODE_DRIVER_IMAGE: &str = "ghcr.io/canonical/k8s-snap/sig-storage/csi-node-driver-registrar:v2.10.1";
const CSI_PROVISIONER_IMAGE: &str = "ghcr.io/canonical/k8s-snap/sig-storage/csi-provisioner:v5.0.1";
const CSI_RESIZER_IMAGE: &str = "ghcr.io/canonical/k8s-snap/sig-storage/csi-resizer:v1.11.1";
const CSI_SNAPSHOTTER_IMAGE: &str = "ghcr.io/canonical/k8s-snap/sig-storage/csi-snapshotter:v8.0.1";

#[derive(Debug, Default)]
pub struct LocalStorage;

#[async_trait]
impl Component for LocalStorage {
    fn chart(&self) -> &ChartRef {
        &CHART
    }

    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool> {
        config.local_storage.is_enabled()
    }

    async fn values(&self, config: &ClusterConfiguration) -> Result<Values> {
        let storage = &config.local_storage;
        Ok(into_values(json!({
            "storageClass": {
                "enabled": true,
                "isDefault": storage.is_default(),
                "reclaimPolicy": storage.reclaim_policy(),
            },
            "serviceMonitor": { "enabled": false },
            "controller": {
                "csiDriverArgs": ["--args", "rawfile", "csi-driver", "--disable-metrics"],
                "image": { "repository": IMAGE_REPO, "tag": IMAGE_TAG },
            },
            "node": {
                "image": { "repository": IMAGE_REPO, "tag": IMAGE_TAG },
                "storage": { "path": storage.local_path() },
            },
            "images": {
                "csiNodeDriverRegistrar": CSI_NODE_DRIVER_IMAGE,
                "csiProvisioner": CSI_PROVISIONER_IMAGE,
                "csiResizer": CSI_RESIZER_IMAGE,
                "csiSnapshotter": CSI_SNAPSHOTTER_IMAGE,
            },
        })))
    }
}
