//! Per-component lifecycle state machine and the ordered feature walk

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::component::{Component, ReconcileSignal};
use crate::crd::ClusterConfiguration;
use crate::error::{Error, Result};
use crate::helm::{should_upgrade, HelmClient};

/// Await a lifecycle hook, tag its error with the component and stage, and
/// return early from the enclosing reconcile on a non-terminal signal.
macro_rules! hook {
    ($component:expr, $stage:literal, $call:expr) => {{
        let signal = $call
            .await
            .map_err(|e| Error::component($component.name(), $stage, e))?;
        if !signal.is_done() {
            debug!(component = $component.name(), stage = $stage, ?signal, "Hook asked to requeue");
            return Ok(signal);
        }
    }};
}

fn record_action(_component: &str, _action: &str) {
    #[cfg(feature = "metrics")]
    crate::controller::metrics::inc_action(_component, _action);
}

/// Drives one component towards the state the configuration asks for
#[derive(Clone)]
pub struct ComponentReconciler {
    helm: Arc<dyn HelmClient>,
}

impl ComponentReconciler {
    pub fn new(helm: Arc<dyn HelmClient>) -> Self {
        Self { helm }
    }

    #[instrument(skip_all, fields(component = component.name(), namespace = %component.chart().namespace))]
    pub async fn reconcile(
        &self,
        component: &dyn Component,
        config: &ClusterConfiguration,
    ) -> Result<ReconcileSignal> {
        let name = component.name();
        let chart = self
            .helm
            .load_chart(component.chart())
            .await
            .map_err(|e| Error::component(name, "load chart", e))?;

        hook!(component, "pre-reconcile", component.pre_reconcile(config));

        let enabled = component
            .is_enabled(config)
            .map_err(|e| Error::component(name, "check enablement", e))?;

        let release = match self.helm.get(chart.release_name(), chart.namespace()).await {
            Ok(release) => Some(release),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(Error::component(name, "get release", e)),
        };

        match (release, enabled) {
            (None, false) => {
                debug!("{} is disabled and not installed", name);
            }
            (None, true) => {
                hook!(component, "pre-install", component.pre_install(config));
                let values = component
                    .values(config)
                    .await
                    .map_err(|e| Error::component(name, "compute values", e))?;
                info!("Installing {} {} into {}", name, chart.version(), chart.namespace());
                self.helm
                    .install(&chart, &values)
                    .await
                    .map_err(|e| Error::component(name, "install", e))?;
                record_action(name, "install");
                hook!(component, "post-install", component.post_install(config));
            }
            (Some(_), false) => {
                hook!(component, "pre-uninstall", component.pre_uninstall(config));
                info!("Uninstalling {} from {}", name, chart.namespace());
                self.helm
                    .uninstall(&chart)
                    .await
                    .map_err(|e| Error::component(name, "uninstall", e))?;
                record_action(name, "uninstall");
                hook!(component, "post-uninstall", component.post_uninstall(config));
            }
            (Some(release), true) => {
                let values = component
                    .values(config)
                    .await
                    .map_err(|e| Error::component(name, "compute values", e))?;
                let upgrade = should_upgrade(Some(&release), chart.version(), &values)
                    .map_err(|e| Error::component(name, "check upgrade", e))?;
                if !upgrade {
                    debug!("{} is up to date at {}", name, release.chart_version);
                    return Ok(ReconcileSignal::Done);
                }

                hook!(component, "pre-upgrade", component.pre_upgrade(config));
                info!(
                    "Upgrading {} from {} to {}",
                    name,
                    release.chart_version,
                    chart.version()
                );
                self.helm
                    .upgrade(&chart, &values)
                    .await
                    .map_err(|e| Error::component(name, "upgrade", e))?;
                record_action(name, "upgrade");
                hook!(component, "post-upgrade", component.post_upgrade(config));
            }
        }

        Ok(ReconcileSignal::Done)
    }
}

/// Walks the fixed, ordered component list.
///
/// A component that is not done stops the pass; later components are
/// assumed to depend on earlier ones.
#[derive(Clone)]
pub struct FeatureReconciler {
    reconciler: ComponentReconciler,
    components: Vec<Arc<dyn Component>>,
}

impl FeatureReconciler {
    pub fn new(helm: Arc<dyn HelmClient>, components: Vec<Arc<dyn Component>>) -> Self {
        Self {
            reconciler: ComponentReconciler::new(helm),
            components,
        }
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    #[instrument(skip_all)]
    pub async fn reconcile(&self, config: &ClusterConfiguration) -> Result<ReconcileSignal> {
        for component in &self.components {
            let signal = self.reconciler.reconcile(component.as_ref(), config).await?;
            if !signal.is_done() {
                info!(
                    "Stopping pass at {}, requeue requested: {:?}",
                    component.name(),
                    signal
                );
                return Ok(signal);
            }
        }
        Ok(ReconcileSignal::Done)
    }
}
