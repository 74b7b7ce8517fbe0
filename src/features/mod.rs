//! Cluster features and their reconciliation
//!
//! Each feature is a [`Component`] installed as one release. The
//! [`FeatureReconciler`] walks them in a fixed order: gateway resources come
//! before the CNI that serves them, DNS before anything reading its address,
//! and MetalLB before the pool resources that need its CRDs.

mod component;
mod dns;
mod gateway;
mod load_balancer;
mod local_storage;
pub mod lookup;
mod metrics_server;
pub mod network;
mod reconciler;

#[cfg(test)]
mod reconciler_test;

use std::sync::Arc;

use serde_json::Value;

pub use component::{Component, ReconcileSignal};
pub use dns::Dns;
pub use gateway::{GatewayApi, GatewayClass};
pub use load_balancer::{LoadBalancerPool, MetalLb, CRD_RETRY_DELAY};
pub use local_storage::LocalStorage;
pub use lookup::{ClusterLookup, KubeLookup};
pub use metrics_server::MetricsServer;
pub use network::Network;
pub use reconciler::{ComponentReconciler, FeatureReconciler};

use crate::helm::Values;
use crate::store::ConfigWriter;

/// Unwrap a `json!` object literal into installer values
pub(crate) fn into_values(value: Value) -> Values {
    match value {
        Value::Object(map) => map,
        _ => Values::new(),
    }
}

/// The built-in features, in reconcile order
pub fn default_components(
    lookup: Arc<dyn ClusterLookup>,
    writer: Arc<dyn ConfigWriter>,
) -> Vec<Arc<dyn Component>> {
    vec![
        Arc::new(GatewayApi),
        Arc::new(GatewayClass),
        Arc::new(Network),
        Arc::new(Dns::new(lookup.clone(), writer)),
        Arc::new(LocalStorage),
        Arc::new(MetalLb),
        Arc::new(LoadBalancerPool::new(lookup)),
        Arc::new(MetricsServer),
    ]
}
