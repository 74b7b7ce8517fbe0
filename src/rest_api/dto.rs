//! Response bodies for the REST API

use serde::{Deserialize, Serialize};

use crate::controller::PassStatus;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub node: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_pass: Option<PassStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    /// Whether this node queued a reconcile pass
    pub triggered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}
