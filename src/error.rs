//! Error types for the feature reconciliation engine

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The package installer reported a failure for a release
    #[error("Helm error for release {release}: {message}")]
    HelmError { release: String, message: String },

    /// The release does not exist. This is a valid state, not a failure.
    #[error("release {name} not found in namespace {namespace}")]
    ReleaseNotFound { name: String, namespace: String },

    /// Upgrade decision requested without a current release
    #[error("cannot decide upgrade for {0}: no current release")]
    MissingRelease(String),

    /// Malformed cluster configuration. Retrying cannot fix this.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration store error: {0}")]
    StoreError(String),

    /// A lifecycle stage of a component failed
    #[error("{stage} failed for {component}: {source}")]
    ComponentError {
        component: String,
        stage: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Wrap an error with the component and lifecycle stage it came from
    pub fn component(component: &str, stage: &'static str, source: Error) -> Self {
        Error::ComponentError {
            component: component.to_string(),
            stage,
            source: Box::new(source),
        }
    }

    /// True when the error is the distinguished "release not found" classification
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ReleaseNotFound { .. })
    }

    /// Whether retrying without operator action has a chance of succeeding
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::ConfigError(_) | Error::MissingRelease(_) => false,
            Error::ComponentError { source, .. } => source.is_retriable(),
            _ => true,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::HelmError { .. } | Error::ReleaseNotFound { .. } => "helm",
            Error::MissingRelease(_) => "contract",
            Error::ConfigError(_) => "config",
            Error::StoreError(_) => "store",
            Error::ComponentError { source, .. } => source.kind(),
            Error::Timeout(_) => "timeout",
            Error::SerializationError(_) | Error::YamlError(_) | Error::TomlError(_) => {
                "serialization"
            }
            Error::IoError(_) => "io",
            Error::HttpError(_) => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_error_wraps_identity_and_stage() {
        let err = Error::component(
            "ck-dns",
            "install",
            Error::HelmError {
                release: "ck-dns".to_string(),
                message: "timed out waiting for condition".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("install failed for ck-dns"));
        assert!(msg.contains("timed out waiting for condition"));
        assert!(err.is_retriable());
        assert_eq!(err.kind(), "helm");
    }

    #[test]
    fn test_config_errors_are_not_retriable() {
        let err = Error::component(
            "metallb-loadbalancer",
            "values",
            Error::ConfigError("invalid CIDR 10.0.0.0/33".to_string()),
        );
        assert!(!err.is_retriable());
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_not_found_classification() {
        let err = Error::ReleaseNotFound {
            name: "ck-network".to_string(),
            namespace: "kube-system".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!Error::StoreError("locked".to_string()).is_not_found());
    }
}
