//! Wire types for the management HTTP+JSON API collaborator (spec §6).
//!
//! This crate defines only the request/response shapes; the HTTP server
//! that exposes them, and the CLI that calls it, are both out of scope
//! (spec §1) and live outside this workspace.

use serde::{Deserialize, Serialize};

pub mod debug;
pub mod delegation;
pub mod keystore;
pub mod nsec;
pub mod truststore;
pub mod zone;

/// The common envelope every command response is wrapped in.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            data: None,
        }
    }
}
