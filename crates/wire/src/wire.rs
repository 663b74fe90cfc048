// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefix framing over the IPC wire: a 4-byte big-endian length
//! prefix followed by a JSON payload. `encode`/`decode` handle the JSON
//! layer alone; `read_message`/`write_message` handle the framing;
//! `read_request`/`write_response` compose both with a timeout, the
//! shape every connection handler actually calls.

use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::Request;
use crate::Response;

/// The largest single message this wire will frame — generous enough
/// for a `ListEvents` page, far below what would indicate a corrupt or
/// adversarial length prefix.
const MAX_MESSAGE_BYTES: u32 = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("operation timed out")]
    Timeout,
    #[error("message of {0} bytes exceeds the {MAX_MESSAGE_BYTES}-byte limit")]
    MessageTooLarge(u32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `value` to its wire JSON representation. Returns raw JSON
/// bytes with no length prefix — [`write_message`] adds that.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserialize a message previously produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write `payload` to `writer` with a 4-byte big-endian length prefix.
pub async fn write_message<W: AsyncWrite + AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let len: u32 = payload.len().try_into().map_err(|_| ProtocolError::MessageTooLarge(u32::MAX))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message from `reader`. A zero-byte read on
/// the length prefix means the peer closed the connection cleanly.
pub async fn read_message<R: AsyncRead + AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(ProtocolError::ConnectionClosed),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::MessageTooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Read and decode a [`Request`] with a timeout, the shape every
/// connection handler calls first.
pub async fn read_request<R: AsyncRead + AsyncReadExt + Unpin>(
    reader: &mut R,
    read_timeout: Duration,
) -> Result<Request, ProtocolError> {
    let bytes = timeout(read_timeout, read_message(reader)).await.map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Encode and write a [`Response`] with a timeout, the shape every
/// connection handler calls last.
pub async fn write_response<W: AsyncWrite + AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    write_timeout: Duration,
) -> Result<(), ProtocolError> {
    let payload = encode(response)?;
    timeout(write_timeout, write_message(writer, &payload)).await.map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
