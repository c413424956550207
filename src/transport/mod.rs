//! Transport layer for solver ↔ worker communication.
//!
//! Length-prefixed JSON framing over any async byte stream: the worker's
//! stdin and stdout in practice, in-memory buffers in tests.

pub mod protocol;

pub use protocol::{WorkerRequest, WorkerResponse};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum message size (64 MB). Safety valve against malformed messages.
const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

/// Write a length-prefixed message to a writer.
///
/// Format: [4-byte big-endian length][payload bytes]
pub async fn send_message<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow::anyhow!("Message too large: {} bytes", payload.len()))?;
    anyhow::ensure!(
        len <= MAX_MESSAGE_SIZE,
        "Message exceeds max size: {len} > {MAX_MESSAGE_SIZE}"
    );

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed message from a reader.
///
/// Returns the raw payload bytes. Enforces `MAX_MESSAGE_SIZE`.
pub async fn recv_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .context("Stream closed before a message arrived")?;
    let len = u32::from_be_bytes(len_buf);

    anyhow::ensure!(
        len <= MAX_MESSAGE_SIZE,
        "Message exceeds max size: {len} > {MAX_MESSAGE_SIZE}"
    );

    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .await
        .context("Stream closed in the middle of a message")?;
    Ok(buf)
}

/// Serialize `message` as JSON and send it as one frame.
pub async fn send_json<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize + Sync,
{
    let bytes = serde_json::to_vec(message).context("Failed to serialize message")?;
    send_message(writer, &bytes).await
}

/// Receive one frame and parse it as JSON.
pub async fn recv_json<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncReadExt + Unpin,
    T: DeserializeOwned,
{
    let bytes = recv_message(reader).await?;
    serde_json::from_slice(&bytes).context("Failed to parse message")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Unit;
    use crate::config::Limits;

    #[tokio::test]
    async fn roundtrip_framing() {
        let payload = b"hello world";
        let mut buf = Vec::new();

        send_message(&mut buf, payload).await.unwrap();
        assert_eq!(&buf[..4], &11u32.to_be_bytes());

        let mut cursor = std::io::Cursor::new(buf);
        let received = recv_message(&mut cursor).await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn empty_payload() {
        let mut buf = Vec::new();
        send_message(&mut buf, b"").await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let received = recv_message(&mut cursor).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let mut buf = (MAX_MESSAGE_SIZE + 1).to_be_bytes().to_vec();
        buf.extend_from_slice(b"junk");
        let mut cursor = std::io::Cursor::new(buf);
        let err = recv_message(&mut cursor).await.unwrap_err();
        assert!(err.to_string().contains("exceeds max size"));
    }

    #[tokio::test]
    async fn truncated_message_is_an_error() {
        let mut buf = 10u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"short");
        let mut cursor = std::io::Cursor::new(buf);
        assert!(recv_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn protocol_serialize_request() {
        let req = WorkerRequest::Evaluate {
            unit: Unit::new("a = 1", "b = a", "b == 1"),
            limits: Limits::default(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"type\":\"evaluate\""));
        assert!(json.contains("\"candidate\":\"b = a\""));
        assert!(json.contains("\"timeout_ms\":2000"));
    }

    #[tokio::test]
    async fn protocol_json_frames() {
        let mut buf = Vec::new();
        send_json(&mut buf, &WorkerResponse::Verdict { truthy: true }).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let resp: WorkerResponse = recv_json(&mut cursor).await.unwrap();
        assert!(matches!(resp, WorkerResponse::Verdict { truthy: true }));
    }

    #[tokio::test]
    async fn protocol_deserialize_pong() {
        let json = r#"{"type":"pong"}"#;
        let resp: WorkerResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(resp, WorkerResponse::Pong));
    }
}
