//! In-memory [`HelmClient`] for tests
//!
//! Keeps installed releases in a map so consecutive passes observe the
//! effect of earlier ones, and records every call.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use super::client::HelmClient;
use super::release::{Chart, ChartMetadata, ChartRef, Release, Values};
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Get(String),
    Install(String, Values),
    Upgrade(String, Values),
    Uninstall(String),
}

#[derive(Default)]
pub struct MockHelm {
    releases: Mutex<HashMap<String, Release>>,
    versions: Mutex<HashMap<String, String>>,
    get_errors: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<Call>>,
}

impl MockHelm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a release is already installed
    pub fn with_release(self, name: &str, version: &str, config: Values) -> Self {
        self.releases.lock().unwrap().insert(
            name.to_string(),
            Release {
                name: name.to_string(),
                namespace: String::new(),
                chart_version: version.to_string(),
                config,
            },
        );
        self
    }

    /// Override the chart version on disk for a release (default `1.0.0`)
    pub fn with_chart_version(self, name: &str, version: &str) -> Self {
        self.versions
            .lock()
            .unwrap()
            .insert(name.to_string(), version.to_string());
        self
    }

    /// Make `get` fail with a non not-found error
    pub fn with_get_error(self, name: &str, message: &str) -> Self {
        self.get_errors
            .lock()
            .unwrap()
            .insert(name.to_string(), message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than `Get`
    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Get(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn release(&self, name: &str) -> Option<Release> {
        self.releases.lock().unwrap().get(name).cloned()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl HelmClient for MockHelm {
    async fn load_chart(&self, chart: &ChartRef) -> Result<Chart> {
        let version = self
            .versions
            .lock()
            .unwrap()
            .get(chart.release_name)
            .cloned()
            .unwrap_or_else(|| "1.0.0".to_string());
        Ok(Chart {
            reference: chart.clone(),
            path: PathBuf::from(chart.manifest_path),
            metadata: ChartMetadata {
                name: chart.release_name.to_string(),
                version,
            },
        })
    }

    async fn get(&self, release_name: &str, namespace: &str) -> Result<Release> {
        self.record(Call::Get(release_name.to_string()));
        if let Some(message) = self.get_errors.lock().unwrap().get(release_name) {
            return Err(Error::HelmError {
                release: release_name.to_string(),
                message: message.clone(),
            });
        }
        self.releases
            .lock()
            .unwrap()
            .get(release_name)
            .cloned()
            .ok_or_else(|| Error::ReleaseNotFound {
                name: release_name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn install(&self, chart: &Chart, values: &Values) -> Result<Release> {
        self.record(Call::Install(
            chart.release_name().to_string(),
            values.clone(),
        ));
        let release = Release {
            name: chart.release_name().to_string(),
            namespace: chart.namespace().to_string(),
            chart_version: chart.version().to_string(),
            config: values.clone(),
        };
        self.releases
            .lock()
            .unwrap()
            .insert(release.name.clone(), release.clone());
        Ok(release)
    }

    async fn upgrade(&self, chart: &Chart, values: &Values) -> Result<Release> {
        self.record(Call::Upgrade(
            chart.release_name().to_string(),
            values.clone(),
        ));
        let mut releases = self.releases.lock().unwrap();
        let release = releases
            .get_mut(chart.release_name())
            .ok_or_else(|| Error::ReleaseNotFound {
                name: chart.release_name().to_string(),
                namespace: chart.namespace().to_string(),
            })?;
        let mut merged = values.clone();
        super::release::coalesce_tables(&mut merged, &release.config);
        release.config = merged;
        release.chart_version = chart.version().to_string();
        Ok(release.clone())
    }

    async fn uninstall(&self, chart: &Chart) -> Result<()> {
        self.record(Call::Uninstall(chart.release_name().to_string()));
        self.releases.lock().unwrap().remove(chart.release_name());
        Ok(())
    }
}
