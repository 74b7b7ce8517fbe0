//! Cluster lookups used by lifecycle hooks

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::Api;
use kube::runtime::wait::{conditions, Condition};
use kube::Client;

use crate::error::{Error, Result};

#[async_trait]
pub trait ClusterLookup: Send + Sync {
    /// Cluster IP assigned to a Service
    async fn service_cluster_ip(&self, name: &str, namespace: &str) -> Result<String>;

    /// Whether a CRD exists and is established
    async fn crd_established(&self, name: &str) -> Result<bool>;
}

pub struct KubeLookup {
    client: Client,
}

impl KubeLookup {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterLookup for KubeLookup {
    async fn service_cluster_ip(&self, name: &str, namespace: &str) -> Result<String> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = api.get(name).await?;
        service
            .spec
            .and_then(|s| s.cluster_ip)
            .filter(|ip| !ip.is_empty() && ip != "None")
            .ok_or_else(|| {
                Error::ConfigError(format!("service {namespace}/{name} has no cluster IP"))
            })
    }

    async fn crd_established(&self, name: &str) -> Result<bool> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let crd = api.get_opt(name).await?;
        Ok(conditions::is_crd_established().matches_object(crd.as_ref()))
    }
}
