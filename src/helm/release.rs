//! Charts, releases and the upgrade decision

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Parameter tree passed to the installer
pub type Values = serde_json::Map<String, Value>;

/// Static identity of a feature's package: release name, namespace and the
/// manifest directory (relative to the manifests base directory).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartRef {
    pub release_name: &'static str,
    pub namespace: &'static str,
    pub manifest_path: &'static str,
}

impl ChartRef {
    pub const fn new(
        release_name: &'static str,
        namespace: &'static str,
        manifest_path: &'static str,
    ) -> Self {
        Self {
            release_name,
            namespace,
            manifest_path,
        }
    }
}

/// `Chart.yaml` fields the engine cares about
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
}

/// A chart loaded from disk and bound to its release identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chart {
    pub reference: ChartRef,
    pub path: PathBuf,
    pub metadata: ChartMetadata,
}

impl Chart {
    pub fn release_name(&self) -> &str {
        self.reference.release_name
    }

    pub fn namespace(&self) -> &str {
        self.reference.namespace
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}

/// Observed state of an installed release
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    pub chart_version: String,
    /// Parameters last applied. The installer may have added defaults.
    pub config: Values,
}

/// Merge `src` into `dst` where `dst` wins.
///
/// Keys missing from `dst` are copied from `src`, nested tables are merged
/// recursively, and an explicit `null` in `dst` removes the key.
pub fn coalesce_tables(dst: &mut Values, src: &Values) {
    for (key, src_value) in src {
        match dst.get_mut(key) {
            None => {
                dst.insert(key.clone(), src_value.clone());
            }
            Some(Value::Null) => {
                dst.remove(key);
            }
            Some(Value::Object(dst_table)) => {
                if let Value::Object(src_table) = src_value {
                    coalesce_tables(dst_table, src_table);
                }
            }
            Some(_) => {}
        }
    }
}

/// Decide whether a release must be re-applied.
///
/// The desired values are coalesced over the applied ones, so values added
/// out of band that the feature does not model do not force an upgrade. The
/// chart version is compared separately since the installer skips upgrades
/// with identical values.
pub fn should_upgrade(
    current: Option<&Release>,
    desired_version: &str,
    desired: &Values,
) -> Result<bool> {
    let current = current.ok_or_else(|| Error::MissingRelease(desired_version.to_string()))?;

    let mut merged = desired.clone();
    coalesce_tables(&mut merged, &current.config);

    let same_values = merged == current.config;
    let same_version = current.chart_version == desired_version;

    Ok(!same_values || !same_version)
}
