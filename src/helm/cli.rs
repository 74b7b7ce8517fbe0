//! [`HelmClient`] backed by the `helm` binary
//!
//! Each call runs one `helm` subprocess. Subprocesses are killed when the
//! future driving them is dropped, so a cancelled reconcile pass does not
//! leave installer operations running in the background.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::client::HelmClient;
use super::release::{Chart, ChartMetadata, ChartRef, Release, Values};
use crate::error::{Error, Result};

/// Output of `helm status|install|upgrade --output json`, reduced to what we read
#[derive(Debug, Deserialize)]
struct ReleaseJson {
    name: String,
    namespace: String,
    chart: ChartJson,
    #[serde(default)]
    config: Option<Values>,
}

#[derive(Debug, Deserialize)]
struct ChartJson {
    metadata: ChartMetadata,
}

impl From<ReleaseJson> for Release {
    fn from(r: ReleaseJson) -> Self {
        Release {
            name: r.name,
            namespace: r.namespace,
            chart_version: r.chart.metadata.version,
            config: r.config.unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HelmCli {
    binary: PathBuf,
    manifests_dir: PathBuf,
    kubeconfig: Option<PathBuf>,
}

impl HelmCli {
    pub fn new(manifests_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from("helm"),
            manifests_dir: manifests_dir.into(),
            kubeconfig: None,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    fn command(&self, namespace: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--namespace").arg(namespace);
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run a prepared command, optionally feeding values on stdin
    async fn run(&self, release: &str, mut cmd: Command, values: Option<&Values>) -> Result<Vec<u8>> {
        if values.is_some() {
            cmd.stdin(Stdio::piped());
        }
        let mut child = cmd.spawn()?;

        if let Some(values) = values {
            // JSON is valid YAML, which is what `--values -` expects
            let payload = serde_json::to_vec(values)?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&payload).await?;
            }
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_not_found(&stderr) {
            return Err(Error::ReleaseNotFound {
                name: release.to_string(),
                namespace: String::new(),
            });
        }
        Err(Error::HelmError {
            release: release.to_string(),
            message: stderr,
        })
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("release: not found")
}

fn parse_release(stdout: &[u8]) -> Result<Release> {
    let release: ReleaseJson = serde_json::from_slice(stdout)?;
    Ok(release.into())
}

/// Read the `Chart.yaml` of a chart directory
pub fn read_chart_metadata(dir: &Path) -> Result<ChartMetadata> {
    let raw = std::fs::read_to_string(dir.join("Chart.yaml"))?;
    Ok(serde_yaml::from_str(&raw)?)
}

#[async_trait]
impl HelmClient for HelmCli {
    async fn load_chart(&self, chart: &ChartRef) -> Result<Chart> {
        let path = self.manifests_dir.join(chart.manifest_path);
        let metadata = read_chart_metadata(&path).map_err(|e| Error::HelmError {
            release: chart.release_name.to_string(),
            message: format!("failed to load chart from {}: {}", path.display(), e),
        })?;
        Ok(Chart {
            reference: chart.clone(),
            path,
            metadata,
        })
    }

    #[instrument(skip(self))]
    async fn get(&self, release_name: &str, namespace: &str) -> Result<Release> {
        let mut cmd = self.command(namespace);
        cmd.args(["status", release_name, "--output", "json"]);
        match self.run(release_name, cmd, None).await {
            Ok(stdout) => parse_release(&stdout),
            Err(Error::ReleaseNotFound { name, .. }) => Err(Error::ReleaseNotFound {
                name,
                namespace: namespace.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, chart, values), fields(release = chart.release_name()))]
    async fn install(&self, chart: &Chart, values: &Values) -> Result<Release> {
        let mut cmd = self.command(chart.namespace());
        cmd.arg("install")
            .arg(chart.release_name())
            .arg(&chart.path)
            .args(["--create-namespace", "--values", "-", "--output", "json"]);
        let stdout = self.run(chart.release_name(), cmd, Some(values)).await?;
        debug!("Installed release {}", chart.release_name());
        parse_release(&stdout)
    }

    #[instrument(skip(self, chart, values), fields(release = chart.release_name()))]
    async fn upgrade(&self, chart: &Chart, values: &Values) -> Result<Release> {
        let mut cmd = self.command(chart.namespace());
        cmd.arg("upgrade")
            .arg(chart.release_name())
            .arg(&chart.path)
            .args([
                "--reset-then-reuse-values",
                "--values",
                "-",
                "--output",
                "json",
            ]);
        let stdout = self.run(chart.release_name(), cmd, Some(values)).await?;
        debug!("Upgraded release {}", chart.release_name());
        parse_release(&stdout)
    }

    #[instrument(skip(self, chart), fields(release = chart.release_name()))]
    async fn uninstall(&self, chart: &Chart) -> Result<()> {
        let mut cmd = self.command(chart.namespace());
        cmd.args(["uninstall", chart.release_name()]);
        self.run(chart.release_name(), cmd, None).await?;
        debug!("Uninstalled release {}", chart.release_name());
        Ok(())
    }
}
