//! Worker protocol message types.
//!
//! Length-prefixed JSON protocol between a [`ProcessBackend`] and its
//! worker. Messages are framed as: [4-byte BE length][JSON payload]
//!
//! [`ProcessBackend`]: crate::backend::ProcessBackend

use serde::{Deserialize, Serialize};

use crate::backend::Unit;
use crate::config::Limits;

/// Request sent from the solver to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Evaluate one unit under the given limits.
    Evaluate { unit: Unit, limits: Limits },
    /// Health check.
    Ping,
}

/// Response sent from a worker back to the solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    /// The evaluation completed.
    Verdict { truthy: bool },
    /// The evaluation did not complete; `reason` is for logs only.
    Failed { reason: String },
    /// Pong response to health check.
    Pong,
    /// The worker could not handle the request.
    Error { message: String },
}
