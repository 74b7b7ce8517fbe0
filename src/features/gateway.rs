//! Gateway API CRDs and the gateway class

use async_trait::async_trait;

use super::component::Component;
use crate::crd::ClusterConfiguration;
use crate::error::Result;
use crate::helm::{ChartRef, Values};

const GATEWAY_API_CHART: ChartRef = ChartRef::new("ck-gateway", "kube-system", "gateway-api");
const GATEWAY_CLASS_CHART: ChartRef =
    ChartRef::new("ck-gateway-class", "kube-system", "ck-gateway-cilium");

/// Gateway API custom resource definitions
#[derive(Debug, Default)]
pub struct GatewayApi;

#[async_trait]
impl Component for GatewayApi {
    fn chart(&self) -> &ChartRef {
        &GATEWAY_API_CHART
    }

    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool> {
        config.gateway.is_enabled()
    }

    async fn values(&self, _config: &ClusterConfiguration) -> Result<Values> {
        Ok(Values::new())
    }
}

/// The GatewayClass served by the CNI
#[derive(Debug, Default)]
pub struct GatewayClass;

#[async_trait]
impl Component for GatewayClass {
    fn chart(&self) -> &ChartRef {
        &GATEWAY_CLASS_CHART
    }

    fn is_enabled(&self, config: &ClusterConfiguration) -> Result<bool> {
        config.gateway.is_enabled()
    }

    async fn values(&self, _config: &ClusterConfiguration) -> Result<Values> {
        Ok(Values::new())
    }
}
