//! k8sd-features: cluster feature reconciliation for k8sd
//!
//! This crate drives the optional cluster features (CNI, DNS, load balancer,
//! local storage, gateway, metrics server) towards the state the cluster
//! configuration asks for, installing them as Helm releases from the node
//! that currently leads the cluster.

pub mod controller;
pub mod crd;
pub mod daemon;
pub mod error;
pub mod features;
pub mod helm;
pub mod store;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
