//! Daemon settings file
//!
//! The daemon reads an optional TOML file; every key has a default so an
//! empty or partial file is valid. Command-line flags override file values.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{ControllerSettings, NotifySettings};
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Name of this node; falls back to the host name
    pub node_name: Option<String>,
    /// Where the cluster configuration is persisted
    pub state_file: PathBuf,
    /// Base directory holding one chart directory per component
    pub manifests_dir: PathBuf,
    pub listen: SocketAddr,
    /// Addresses (`host:port`) of the other cluster members
    pub peers: Vec<String>,
    pub fallback_interval_secs: u64,
    pub pass_timeout_secs: u64,
    pub helm_binary: PathBuf,
    pub kubeconfig: Option<PathBuf>,
    pub notify: NotifyConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub insecure_skip_verify: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let controller = ControllerSettings::default();
        Self {
            node_name: None,
            state_file: PathBuf::from("/var/lib/k8sd/cluster-config.json"),
            manifests_dir: PathBuf::from("/snap/k8s/current/k8s/manifests/charts"),
            listen: SocketAddr::from(([0, 0, 0, 0], 6400)),
            peers: Vec::new(),
            fallback_interval_secs: controller.fallback_interval.as_secs(),
            pass_timeout_secs: controller.pass_timeout.as_secs(),
            helm_binary: PathBuf::from("helm"),
            kubeconfig: None,
            notify: NotifyConfig::default(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        let settings = NotifySettings::default();
        Self {
            timeout_secs: settings.timeout.as_secs(),
            concurrency: settings.concurrency,
            insecure_skip_verify: settings.insecure_skip_verify,
        }
    }
}

impl DaemonConfig {
    /// Read and validate a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fallback_interval_secs == 0 {
            return Err(Error::ConfigError(
                "fallback_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.pass_timeout_secs == 0 {
            return Err(Error::ConfigError(
                "pass_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.notify.concurrency == 0 {
            return Err(Error::ConfigError(
                "notify.concurrency must be greater than zero".to_string(),
            ));
        }
        if let Some(peer) = self.peers.iter().find(|p| p.trim().is_empty()) {
            return Err(Error::ConfigError(format!("invalid peer address {peer:?}")));
        }
        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            fallback_interval: Duration::from_secs(self.fallback_interval_secs),
            pass_timeout: Duration::from_secs(self.pass_timeout_secs),
        }
    }

    pub fn notify_settings(&self) -> NotifySettings {
        NotifySettings {
            timeout: Duration::from_secs(self.notify.timeout_secs),
            concurrency: self.notify.concurrency,
            insecure_skip_verify: self.notify.insecure_skip_verify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(
            config.controller_settings().fallback_interval,
            Duration::from_secs(300)
        );
        assert_eq!(config.notify_settings().concurrency, 8);
    }

    #[test]
    fn test_partial_file_overrides_keys() {
        let config = DaemonConfig::from_toml(
            r#"
            node_name = "node-1"
            listen = "127.0.0.1:7000"
            peers = ["10.0.0.2:6400", "10.0.0.3:6400"]
            pass_timeout_secs = 30

            [notify]
            insecure_skip_verify = true
            "#,
        )
        .unwrap();

        assert_eq!(config.node_name.as_deref(), Some("node-1"));
        assert_eq!(config.listen.port(), 7000);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.controller_settings().pass_timeout, Duration::from_secs(30));
        assert!(config.notify_settings().insecure_skip_verify);
        assert_eq!(config.notify.timeout_secs, 5);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = DaemonConfig::from_toml("listen_addr = \"0.0.0.0:1\"").unwrap_err();
        assert!(matches!(err, Error::TomlError(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = DaemonConfig::from_toml("fallback_interval_secs = 0").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k8sd-features.toml");
        std::fs::write(&path, "state_file = \"/tmp/state.json\"\n").unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.state_file, PathBuf::from("/tmp/state.json"));

        let missing = DaemonConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, Error::ConfigError(_)));
    }
}
