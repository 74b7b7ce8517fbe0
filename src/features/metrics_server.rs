//! Kubernetes resource metrics server

use async_trait::async_trait;
use serde_json::json;

use super::component::Component;
use super::into_values;
use crate::crd::ClusterConfiguration;
use crate::error::Result;
use crate::helm::{ChartRef, Values};

const CHART: ChartRef = ChartRef::new("metrics-server", "kube-system", "metrics-server");

const IMAGE_REPO: &str = "ghcr.io/canonical/metrics-server";
const IMAGE_TAG: &str = "0.7.2-ck0";

pub const ANNOTATION_IMAGE_REPO: &str = "k8sd/v1alpha1/metrics-server/image-repo";
pub const ANNOTATION_IMAGE_TAG: &str = "k8sd/v1alpha1/metrics-server/image-tag";

#[derive(Debug, Default)]
pub struct MetricsServer;

#[async_trait]
impl Component for MetricsServer {
    fn chart(&self) -> &ChartRef {
        &CHART
    }

    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool> {
        config.metrics_server.is_enabled()
    }

    async fn values(&self, config: &ClusterConfiguration) -> Result<Values> {
        let repo = config.annotation(ANNOTATION_IMAGE_REPO).unwrap_or(IMAGE_REPO);
        let tag = config.annotation(ANNOTATION_IMAGE_TAG).unwrap_or(IMAGE_TAG);

        Ok(into_values(json!({
            "image": { "repository": repo, "tag": tag },
            // Pebble entrypoints need a writable root filesystem
            "securityContext": { "readOnlyRootFilesystem": false },
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_image_override_from_annotations() {
        let mut config = ClusterConfiguration::default().with_defaults();
        let values = MetricsServer.values(&config).await.unwrap();
        assert_eq!(values["image"]["repository"], json!(IMAGE_REPO));

        config
            .annotations
            .insert(ANNOTATION_IMAGE_REPO.to_string(), "registry.local/ms".to_string());
        config
            .annotations
            .insert(ANNOTATION_IMAGE_TAG.to_string(), "v9".to_string());
        let values = MetricsServer.values(&config).await.unwrap();
        assert_eq!(values["image"], json!({ "repository": "registry.local/ms", "tag": "v9" }));
    }
}
