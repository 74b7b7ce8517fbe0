//! Prometheus metrics for the feature controller
//!
//! # Exported metrics
//! The `/metrics` endpoint (when built with `--features metrics`) exports the following metrics:
//! - `k8sd_feature_reconcile_duration_seconds` (histogram): duration of a full reconcile pass.
//! - `k8sd_feature_reconcile_errors_total` (counter): failed passes labeled by error kind.
//! - `k8sd_feature_actions_total` (counter): installer actions labeled by component and action.
//! - `k8sd_feature_passes_skipped_total` (counter): passes skipped by a gate, labeled by reason.
//! - `k8sd_peer_notify_failures_total` (counter): failed peer notifications.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ActionLabels {
    pub component: String,
    pub action: String, // "install", "upgrade" or "uninstall"
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SkipLabels {
    pub reason: String,
}

/// Histogram tracking reconcile pass duration (seconds)
pub static RECONCILE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    // 10ms .. ~11min across 17 buckets; installer calls are slow.
    Histogram::new(exponential_buckets(0.01, 2.3, 17))
});

/// Counter tracking failed passes
pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking install/upgrade/uninstall calls per component
pub static ACTIONS_TOTAL: Lazy<Family<ActionLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

/// Counter tracking passes skipped by a gate
pub static PASSES_SKIPPED_TOTAL: Lazy<Family<SkipLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static PEER_NOTIFY_FAILURES_TOTAL: Lazy<Counter<u64, AtomicU64>> = Lazy::new(Counter::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "k8sd_feature_reconcile_duration_seconds",
        "Duration of feature reconcile passes in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "k8sd_feature_reconcile_errors_total",
        "Total number of failed feature reconcile passes",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "k8sd_feature_actions_total",
        "Total number of installer actions per component",
        ACTIONS_TOTAL.clone(),
    );
    registry.register(
        "k8sd_feature_passes_skipped_total",
        "Total number of reconcile passes skipped by a gate",
        PASSES_SKIPPED_TOTAL.clone(),
    );
    registry.register(
        "k8sd_peer_notify_failures_total",
        "Total number of failed peer configuration notifications",
        PEER_NOTIFY_FAILURES_TOTAL.clone(),
    );

    registry
});

/// Observe a pass duration in seconds.
pub fn observe_reconcile_duration_seconds(seconds: f64) {
    RECONCILE_DURATION_SECONDS.observe(seconds);
}

/// Increment the pass error counter.
pub fn inc_reconcile_error(kind: &str) {
    let labels = ErrorLabels {
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_action(component: &str, action: &str) {
    let labels = ActionLabels {
        component: component.to_string(),
        action: action.to_string(),
    };
    ACTIONS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_pass_skipped(reason: &str) {
    let labels = SkipLabels {
        reason: reason.to_string(),
    };
    PASSES_SKIPPED_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_peer_notify_failure() {
    PEER_NOTIFY_FAILURES_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_registry_exports_feature_metrics() {
        inc_action("ck-dns", "install");
        inc_pass_skipped("upgrade-in-progress");

        let mut out = String::new();
        encode(&mut out, &REGISTRY).unwrap();
        assert!(out.contains("k8sd_feature_actions_total"));
        assert!(out.contains("component=\"ck-dns\""));
        assert!(out.contains("reason=\"upgrade-in-progress\""));
    }
}
