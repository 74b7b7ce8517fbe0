//! Tests for the component and feature reconcilers
//!
//! These tests drive the reconcilers against the in-memory Helm double and
//! cover:
//! - Install, upgrade and uninstall transitions
//! - Idempotent passes
//! - Ordering and short-circuiting on requeue
//! - Error wrapping and propagation
//! - Hooks that read the cluster or write configuration back

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::super::*;
    use crate::crd::ClusterConfiguration;
    use crate::error::{Error, Result};
    use crate::helm::mock::{Call, MockHelm};
    use crate::helm::{ChartRef, HelmClient, Values};
    use crate::store::ConfigWriter;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    struct FakeLookup {
        dns_ip: String,
        established: HashSet<&'static str>,
    }

    impl FakeLookup {
        fn all_established() -> Self {
            Self {
                dns_ip: "10.152.183.10".to_string(),
                established: [
                    "ipaddresspools.metallb.io",
                    "l2advertisements.metallb.io",
                    "bgppeers.metallb.io",
                    "bgpadvertisements.metallb.io",
                ]
                .into_iter()
                .collect(),
            }
        }

        fn none_established() -> Self {
            Self {
                dns_ip: "10.152.183.10".to_string(),
                established: HashSet::new(),
            }
        }
    }

    #[async_trait]
    impl ClusterLookup for FakeLookup {
        async fn service_cluster_ip(&self, _name: &str, _namespace: &str) -> Result<String> {
            Ok(self.dns_ip.clone())
        }

        async fn crd_established(&self, name: &str) -> Result<bool> {
            Ok(self.established.contains(name))
        }
    }

    /// The DNS service only exists once its release has been installed
    struct ServiceAfterInstall {
        helm: Arc<MockHelm>,
    }

    #[async_trait]
    impl ClusterLookup for ServiceAfterInstall {
        async fn service_cluster_ip(&self, name: &str, namespace: &str) -> Result<String> {
            if self.helm.release("ck-dns").is_some() {
                Ok("10.152.183.10".to_string())
            } else {
                Err(Error::ConfigError(format!("service {namespace}/{name} not found")))
            }
        }

        async fn crd_established(&self, _name: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        patches: Mutex<Vec<ClusterConfiguration>>,
    }

    #[async_trait]
    impl ConfigWriter for RecordingWriter {
        async fn set(&self, patch: &ClusterConfiguration) -> Result<ClusterConfiguration> {
            self.patches.lock().unwrap().push(patch.clone());
            Ok(patch.clone())
        }
    }

    /// Component whose pre-install signal and enablement are fixed
    struct ScriptedComponent {
        chart: ChartRef,
        enabled: bool,
        pre_install: ReconcileSignal,
        reconciled: AtomicBool,
    }

    impl ScriptedComponent {
        fn new(name: &'static str, pre_install: ReconcileSignal) -> Self {
            Self {
                chart: ChartRef::new(name, "kube-system", name),
                enabled: true,
                pre_install,
                reconciled: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Component for ScriptedComponent {
        fn chart(&self) -> &ChartRef {
            &self.chart
        }

        fn is_enabled(&self, _config: &ClusterConfiguration) -> Result<bool> {
            Ok(self.enabled)
        }

        async fn values(&self, _config: &ClusterConfiguration) -> Result<Values> {
            Ok(Values::new())
        }

        async fn pre_reconcile(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
            self.reconciled.store(true, Ordering::SeqCst);
            Ok(ReconcileSignal::Done)
        }

        async fn pre_install(&self, _config: &ClusterConfiguration) -> Result<ReconcileSignal> {
            Ok(self.pre_install)
        }
    }

    fn bootstrapped() -> ClusterConfiguration {
        ClusterConfiguration::default().with_defaults()
    }

    fn with_load_balancer(mut config: ClusterConfiguration, enabled: bool) -> ClusterConfiguration {
        config.load_balancer.enabled = Some(enabled);
        config.load_balancer.cidrs = Some(vec!["10.0.0.0/24".to_string()]);
        config
    }

    fn installs(helm: &MockHelm) -> Vec<String> {
        helm.mutating_calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Install(name, _) => Some(name),
                _ => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Component reconciler
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_disabled_and_absent_is_a_no_op() {
        let helm = Arc::new(MockHelm::new());
        let reconciler = ComponentReconciler::new(helm.clone());

        let signal = reconciler
            .reconcile(&LocalStorage, &bootstrapped())
            .await
            .unwrap();

        assert!(signal.is_done());
        assert!(helm.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_issues_no_mutations() {
        let helm = Arc::new(MockHelm::new());
        let reconciler = ComponentReconciler::new(helm.clone());
        let mut config = bootstrapped();
        config.local_storage.enabled = Some(true);

        reconciler.reconcile(&LocalStorage, &config).await.unwrap();
        assert_eq!(installs(&helm), vec!["ck-storage".to_string()]);

        helm.clear_calls();
        reconciler.reconcile(&LocalStorage, &config).await.unwrap();
        assert!(helm.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_changed_values_upgrade_release() {
        let helm = Arc::new(MockHelm::new());
        let reconciler = ComponentReconciler::new(helm.clone());
        let mut config = bootstrapped();
        config.local_storage.enabled = Some(true);
        reconciler.reconcile(&LocalStorage, &config).await.unwrap();

        helm.clear_calls();
        config.local_storage.local_path = Some("/srv/volumes".to_string());
        reconciler.reconcile(&LocalStorage, &config).await.unwrap();

        let calls = helm.mutating_calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            Call::Upgrade(name, values) => {
                assert_eq!(name, "ck-storage");
                assert_eq!(values["node"]["storage"]["path"], json!("/srv/volumes"));
            }
            other => panic!("expected upgrade, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chart_version_bump_upgrades_with_same_values() {
        let mut config = bootstrapped();
        config.local_storage.enabled = Some(true);
        let values = LocalStorage.values(&config).await.unwrap();

        let helm = Arc::new(
            MockHelm::new()
                .with_release("ck-storage", "1.0.0", values)
                .with_chart_version("ck-storage", "1.1.0"),
        );
        let reconciler = ComponentReconciler::new(helm.clone());
        reconciler.reconcile(&LocalStorage, &config).await.unwrap();

        assert!(matches!(helm.mutating_calls().as_slice(), [Call::Upgrade(..)]));
        assert_eq!(helm.release("ck-storage").unwrap().chart_version, "1.1.0");
    }

    #[tokio::test]
    async fn test_installed_and_disabled_uninstalls() {
        let helm = Arc::new(MockHelm::new().with_release("ck-storage", "1.0.0", Values::new()));
        let reconciler = ComponentReconciler::new(helm.clone());

        reconciler
            .reconcile(&LocalStorage, &bootstrapped())
            .await
            .unwrap();

        assert_eq!(
            helm.mutating_calls(),
            vec![Call::Uninstall("ck-storage".to_string())]
        );
        assert!(helm.release("ck-storage").is_none());
    }

    #[tokio::test]
    async fn test_get_failure_is_not_treated_as_absent() {
        let helm = Arc::new(MockHelm::new().with_get_error("ck-dns", "connection refused"));
        let reconciler = ComponentReconciler::new(helm.clone());
        let dns = Dns::new(
            Arc::new(FakeLookup::all_established()),
            Arc::new(RecordingWriter::default()),
        );

        let err = reconciler.reconcile(&dns, &bootstrapped()).await.unwrap_err();

        match &err {
            Error::ComponentError {
                component, stage, ..
            } => {
                assert_eq!(component, "ck-dns");
                assert_eq!(*stage, "get release");
            }
            other => panic!("expected component error, got {other:?}"),
        }
        assert!(err.is_retriable());
        assert!(helm.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unset_enabled_flag_is_a_config_error() {
        let helm = Arc::new(MockHelm::new());
        let reconciler = ComponentReconciler::new(helm.clone());

        let err = reconciler
            .reconcile(&LocalStorage, &ClusterConfiguration::default())
            .await
            .unwrap_err();

        assert!(!err.is_retriable());
        assert!(helm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_values_abort_before_install() {
        let helm = Arc::new(MockHelm::new());
        let reconciler = ComponentReconciler::new(helm.clone());
        let mut config = bootstrapped();
        config
            .annotations
            .insert(network::ANNOTATION_VLAN_BPF_BYPASS.to_string(), "4095".to_string());

        let err = reconciler.reconcile(&Network, &config).await.unwrap_err();

        assert!(err.to_string().contains("compute values failed for ck-network"));
        assert!(!err.is_retriable());
        assert!(helm.mutating_calls().is_empty());
    }

    // ------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_dns_post_install_records_service_address() {
        let helm = Arc::new(MockHelm::new());
        let writer = Arc::new(RecordingWriter::default());
        let lookup = Arc::new(ServiceAfterInstall { helm: helm.clone() });
        let dns = Dns::new(lookup, writer.clone());
        let reconciler = ComponentReconciler::new(helm.clone());

        reconciler.reconcile(&dns, &bootstrapped()).await.unwrap();

        let patches = writer.patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].kubelet.cluster_dns(), "10.152.183.10");
        // Only the kubelet section is written back
        assert_eq!(patches[0].dns, crate::crd::DnsConfig::default());
    }

    #[tokio::test]
    async fn test_dns_address_recorded_on_later_pass_after_failed_write_back() {
        // Installed by an earlier pass whose write-back never landed
        let helm = Arc::new(MockHelm::new().with_release("ck-dns", "1.0.0", Values::new()));
        let writer = Arc::new(RecordingWriter::default());
        let lookup = Arc::new(ServiceAfterInstall { helm: helm.clone() });
        let dns = Dns::new(lookup, writer.clone());
        let reconciler = ComponentReconciler::new(helm.clone());

        reconciler.reconcile(&dns, &bootstrapped()).await.unwrap();

        let patches = writer.patches.lock().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].kubelet.cluster_dns(), "10.152.183.10");
    }

    #[tokio::test]
    async fn test_dns_address_already_recorded_is_not_rewritten() {
        let helm = Arc::new(MockHelm::new().with_release("ck-dns", "1.0.0", Values::new()));
        let writer = Arc::new(RecordingWriter::default());
        let dns = Dns::new(Arc::new(FakeLookup::all_established()), writer.clone());
        let reconciler = ComponentReconciler::new(helm.clone());
        let mut config = bootstrapped();
        config.kubelet.cluster_dns = Some("10.152.183.10".to_string());

        reconciler.reconcile(&dns, &config).await.unwrap();

        assert!(writer.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pool_waits_for_metallb_crds() {
        let helm = Arc::new(MockHelm::new());
        let reconciler = ComponentReconciler::new(helm.clone());
        let pool = LoadBalancerPool::new(Arc::new(FakeLookup::none_established()));
        let config = with_load_balancer(bootstrapped(), true);

        let signal = reconciler.reconcile(&pool, &config).await.unwrap();

        assert_eq!(signal, ReconcileSignal::RequeueAfter(CRD_RETRY_DELAY));
        assert!(helm.mutating_calls().is_empty());
    }

    // ------------------------------------------------------------------
    // Feature reconciler
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_requeue_stops_later_components() {
        let first = Arc::new(ScriptedComponent::new(
            "first",
            ReconcileSignal::RequeueAfter(Duration::from_secs(30)),
        ));
        let second = Arc::new(ScriptedComponent::new("second", ReconcileSignal::Done));
        let helm = Arc::new(MockHelm::new());
        let reconciler = FeatureReconciler::new(helm.clone(), vec![first.clone(), second.clone()]);

        let signal = reconciler.reconcile(&bootstrapped()).await.unwrap();

        assert_eq!(signal, ReconcileSignal::RequeueAfter(Duration::from_secs(30)));
        assert!(first.reconciled.load(Ordering::SeqCst));
        assert!(!second.reconciled.load(Ordering::SeqCst));
        assert!(helm.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_stops_later_components() {
        let helm = Arc::new(MockHelm::new().with_get_error("first", "timeout"));
        let first = Arc::new(ScriptedComponent::new("first", ReconcileSignal::Done));
        let second = Arc::new(ScriptedComponent::new("second", ReconcileSignal::Done));
        let reconciler = FeatureReconciler::new(helm.clone(), vec![first, second.clone()]);

        assert!(reconciler.reconcile(&bootstrapped()).await.is_err());
        assert!(!second.reconciled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_default_order() {
        let helm: Arc<dyn HelmClient> = Arc::new(MockHelm::new());
        let components = default_components(
            Arc::new(FakeLookup::all_established()),
            Arc::new(RecordingWriter::default()),
        );
        let reconciler = FeatureReconciler::new(helm, components);

        assert_eq!(
            reconciler.component_names(),
            vec![
                "ck-gateway",
                "ck-gateway-class",
                "ck-network",
                "ck-dns",
                "ck-storage",
                "metallb",
                "metallb-loadbalancer",
                "metrics-server",
            ]
        );
    }

    #[tokio::test]
    async fn test_load_balancer_enable_then_disable() {
        let helm = Arc::new(MockHelm::new());
        let components = default_components(
            Arc::new(FakeLookup::all_established()),
            Arc::new(RecordingWriter::default()),
        );
        let reconciler = FeatureReconciler::new(helm.clone(), components);

        // Enable with a CIDR pool and nothing installed yet
        let enabled = with_load_balancer(bootstrapped(), true);
        let signal = reconciler.reconcile(&enabled).await.unwrap();
        assert!(signal.is_done());

        let pool_values = helm
            .mutating_calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Install(name, values) if name == "metallb-loadbalancer" => Some(values),
                _ => None,
            })
            .expect("pool installed");
        assert_eq!(pool_values["ipPool"]["cidrs"], json!([{ "cidr": "10.0.0.0/24" }]));
        assert!(installs(&helm).contains(&"metallb".to_string()));

        // Disable with the releases present
        helm.clear_calls();
        let disabled = with_load_balancer(enabled, false);
        reconciler.reconcile(&disabled).await.unwrap();

        let calls = helm.mutating_calls();
        assert!(calls.contains(&Call::Uninstall("metallb".to_string())));
        assert!(calls.contains(&Call::Uninstall("metallb-loadbalancer".to_string())));
        assert!(installs(&helm).is_empty());
    }
}
