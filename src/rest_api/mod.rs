//! REST API module for cluster administration
//!
//! Provides the HTTP surface for reading and updating the cluster
//! configuration, the peer notification endpoint and health/metrics.

mod dto;
mod handlers;
mod server;

pub use dto::{ErrorResponse, HealthResponse, NotifyResponse};
pub use handlers::ApiState;
pub use server::{router, run_server, CONFIG_PATH};
