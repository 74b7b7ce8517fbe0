//! Leader gate
//!
//! The leader is elected by the cluster's controller coordinator, which
//! holds a Lease. This process only reads it. Holder identities are
//! `{nodeName}_{suffix}`.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::Api;
use kube::Client;
use tracing::debug;

use crate::error::Result;

pub const LEASE_NAME: &str = "oy6981cu.controller-coordinator";
pub const LEASE_NAMESPACE: &str = "kube-system";

/// Read-only view of the leadership marker
#[async_trait]
pub trait LeadershipSource: Send + Sync {
    /// Identity of the current holder, `None` when nobody holds the lease
    async fn holder_identity(&self) -> Result<Option<String>>;
}

pub struct LeaseLeadership {
    leases: Api<Lease>,
    name: String,
}

impl LeaseLeadership {
    pub fn new(client: Client) -> Self {
        Self {
            leases: Api::namespaced(client, LEASE_NAMESPACE),
            name: LEASE_NAME.to_string(),
        }
    }
}

#[async_trait]
impl LeadershipSource for LeaseLeadership {
    async fn holder_identity(&self) -> Result<Option<String>> {
        let lease = self.leases.get_opt(&self.name).await?;
        Ok(lease
            .and_then(|l| l.spec)
            .and_then(|s| s.holder_identity)
            .filter(|h| !h.is_empty()))
    }
}

/// Node name part of a holder identity
pub fn node_name_from_identity(identity: &str) -> &str {
    identity
        .split_once('_')
        .map_or(identity, |(node, _)| node)
}

/// Whether `node_name` holds the lease right now
pub async fn is_leader(source: &dyn LeadershipSource, node_name: &str) -> Result<bool> {
    let holder = source.holder_identity().await?;
    let leader = holder
        .as_deref()
        .is_some_and(|h| node_name_from_identity(h) == node_name);
    debug!(node = node_name, holder = ?holder, leader, "Checked leadership");
    Ok(leader)
}

/// Leadership check bound to this node
#[derive(Clone)]
pub struct LeaderGate {
    source: Arc<dyn LeadershipSource>,
    node_name: String,
}

impl LeaderGate {
    pub fn new(source: Arc<dyn LeadershipSource>, node_name: impl Into<String>) -> Self {
        Self {
            source,
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub async fn is_leader(&self) -> Result<bool> {
        is_leader(self.source.as_ref(), &self.node_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedHolder(Option<&'static str>);

    #[async_trait]
    impl LeadershipSource for FixedHolder {
        async fn holder_identity(&self) -> Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    #[test]
    fn test_node_name_from_identity() {
        assert_eq!(node_name_from_identity("node-b_abcdef"), "node-b");
        assert_eq!(node_name_from_identity("node_b_abcdef"), "node");
        assert_eq!(node_name_from_identity("node-c"), "node-c");
    }

    #[tokio::test]
    async fn test_holder_prefix_must_match_node_name() {
        let source = FixedHolder(Some("node-b_abcdef"));
        assert!(!is_leader(&source, "node-a").await.unwrap());
        assert!(is_leader(&source, "node-b").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_holder_means_no_leader() {
        assert!(!is_leader(&FixedHolder(None), "node-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_gate_uses_own_node_name() {
        let gate = LeaderGate::new(Arc::new(FixedHolder(Some("node-a_0"))), "node-a");
        assert!(gate.is_leader().await.unwrap());
        assert_eq!(gate.node_name(), "node-a");
    }

    #[tokio::test]
    async fn test_prefix_is_not_a_partial_match() {
        let source = FixedHolder(Some("node-ab_1234"));
        assert!(!is_leader(&source, "node-a").await.unwrap());
    }
}
