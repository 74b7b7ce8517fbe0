//! Installed-release oracle contract

use async_trait::async_trait;

use super::release::{Chart, ChartRef, Release, Values};
use crate::error::Result;

/// Lifecycle operations of the package installer.
///
/// `get` must return [`Error::ReleaseNotFound`](crate::Error::ReleaseNotFound)
/// for a release that does not exist, and any other error for a failed lookup.
#[async_trait]
pub trait HelmClient: Send + Sync {
    /// Load the chart a feature refers to
    async fn load_chart(&self, chart: &ChartRef) -> Result<Chart>;

    async fn get(&self, release_name: &str, namespace: &str) -> Result<Release>;

    async fn install(&self, chart: &Chart, values: &Values) -> Result<Release>;

    async fn upgrade(&self, chart: &Chart, values: &Values) -> Result<Release>;

    async fn uninstall(&self, chart: &Chart) -> Result<()>;
}
