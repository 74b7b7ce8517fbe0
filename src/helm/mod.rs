//! Package installer integration
//!
//! The engine talks to the installer only through [`HelmClient`]; the upgrade
//! decision in [`should_upgrade`] is a pure function over its observed state.

mod cli;
mod client;
#[cfg(test)]
pub(crate) mod mock;
mod release;

pub use cli::{read_chart_metadata, HelmCli};
pub use client::HelmClient;
pub use release::{
    coalesce_tables, should_upgrade, Chart, ChartMetadata, ChartRef, Release, Values,
};
