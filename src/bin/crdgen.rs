//! Print the CustomResourceDefinitions read by the daemon as YAML

use k8sd_features::crd::Upgrade;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Upgrade::crd())?);
    Ok(())
}
