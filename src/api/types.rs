//! API request and response types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request to run an API handler group
#[derive(Debug, Deserialize)]
pub struct InvokeRequest {
    pub chat_id: i64,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Response for an accepted event
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub queued: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
