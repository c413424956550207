//! Request handling for the `exercise-sandbox-worker` binary.
//!
//! A worker serves exactly one request read from stdin and exits. The
//! evaluation itself runs through [`InProcessBackend`] inside the worker, so
//! the worker enforces the same limits a caller would in-process.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::backend::{InProcessBackend, IsolationBackend};
use crate::transport::{recv_json, send_json, WorkerRequest, WorkerResponse};

/// Answer one request.
pub async fn handle(request: WorkerRequest) -> WorkerResponse {
    match request {
        WorkerRequest::Ping => WorkerResponse::Pong,
        WorkerRequest::Evaluate { unit, limits } => {
            match InProcessBackend::new().evaluate(&unit, &limits).await {
                Ok(verdict) => WorkerResponse::Verdict {
                    truthy: verdict.truthy,
                },
                Err(e) => WorkerResponse::Failed {
                    reason: format!("{e:#}"),
                },
            }
        }
    }
}

/// Read one request from `reader`, answer it on `writer`.
///
/// A request that cannot be read or parsed is answered with
/// [`WorkerResponse::Error`] when possible.
pub async fn serve_one<R, W>(reader: &mut R, writer: &mut W) -> Result<()>
where
    R: AsyncReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    let response = match recv_json::<_, WorkerRequest>(reader).await {
        Ok(request) => handle(request).await,
        Err(e) => WorkerResponse::Error {
            message: format!("{e:#}"),
        },
    };
    debug!(?response, "Sending response");
    send_json(writer, &response)
        .await
        .context("Failed to write response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Unit;
    use crate::config::Limits;
    use crate::transport::send_message;

    async fn roundtrip(request_bytes: &[u8]) -> WorkerResponse {
        let mut input = Vec::new();
        send_message(&mut input, request_bytes).await.unwrap();
        let mut output = Vec::new();
        serve_one(&mut std::io::Cursor::new(input), &mut output)
            .await
            .unwrap();
        recv_json(&mut std::io::Cursor::new(output)).await.unwrap()
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let response = roundtrip(br#"{"type":"ping"}"#).await;
        assert!(matches!(response, WorkerResponse::Pong));
    }

    #[tokio::test]
    async fn evaluate_reports_verdict() {
        let request = WorkerRequest::Evaluate {
            unit: Unit::new("a = 1", "a += 1", "a == 2"),
            limits: Limits::default(),
        };
        let response = roundtrip(&serde_json::to_vec(&request).unwrap()).await;
        assert!(matches!(response, WorkerResponse::Verdict { truthy: true }));
    }

    #[tokio::test]
    async fn failures_carry_a_reason() {
        let response = handle(WorkerRequest::Evaluate {
            unit: Unit::new("", "File.read('/etc/passwd')", "true"),
            limits: Limits::default(),
        })
        .await;
        let WorkerResponse::Failed { reason } = response else {
            panic!("expected a failure, got {response:?}");
        };
        assert!(reason.contains("insecure"), "{reason}");
    }

    #[tokio::test]
    async fn malformed_request_gets_error() {
        let response = roundtrip(b"{not json").await;
        assert!(matches!(response, WorkerResponse::Error { .. }));
    }
}
