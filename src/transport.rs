//! Wire frames and connection I/O
//!
//! The protocol is message-oriented: newline-delimited JSON frames over any
//! duplex byte stream (a TCP socket in production, an in-memory pipe in
//! tests). This module owns the two tasks that drive a connection — a writer
//! draining outbound frames and a reader delivering replies to the
//! correlator — and nothing else. There is no retry or reconnection policy
//! at this layer; on closure the correlator is told exactly once and every
//! pending request fails.

use crate::correlator::Correlator;
use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outbound command frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFrame {
    /// Correlation identifier, unique per connection.
    pub request_id: u64,
    /// Operation name, e.g. `fetch_subtree`.
    pub operation: String,
    /// Operation parameters.
    pub params: Value,
}

/// Inbound reply frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFrame {
    /// Correlation identifier echoed from the request.
    pub request_id: u64,
    /// Whether the remote side applied the operation.
    pub success: bool,
    /// Result payload; null for acknowledgment-only operations.
    #[serde(default)]
    pub data: Value,
    /// Failure details when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

/// Remote-supplied failure details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyError {
    /// Remote error message, passed through verbatim.
    pub message: String,
}

/// Handles for the two I/O tasks of a connection.
pub(crate) struct IoTasks {
    pub(crate) reader: JoinHandle<()>,
    pub(crate) writer: JoinHandle<()>,
}

/// Serialize a frame into one wire line.
pub(crate) fn encode_line<T: Serialize>(frame: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(frame)
        .map_err(|err| ClientError::Protocol(format!("frame encoding failed: {err}")))?;
    line.push(b'\n');
    Ok(line)
}

/// Split the stream and spawn the reader and writer tasks.
pub(crate) fn spawn<S>(
    stream: S,
    correlator: Arc<Correlator>,
    outbound: mpsc::Receiver<Vec<u8>>,
) -> IoTasks
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let writer = tokio::spawn(write_loop(write_half, outbound, Arc::clone(&correlator)));
    let reader = tokio::spawn(read_loop(read_half, correlator));
    IoTasks { reader, writer }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    correlator: Arc<Correlator>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outbound.recv().await {
        if let Err(err) = writer.write_all(&line).await {
            tracing::debug!("transport write failed: {err}");
            break;
        }
        if let Err(err) = writer.flush().await {
            tracing::debug!("transport flush failed: {err}");
            break;
        }
    }
    correlator.shut_down();
}

async fn read_loop<R>(reader: R, correlator: Arc<Correlator>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ReplyFrame>(&line) {
                    Ok(frame) => correlator.complete(frame),
                    Err(err) => tracing::warn!("discarding malformed reply frame: {err}"),
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!("transport read failed: {err}");
                break;
            }
        }
    }
    correlator.shut_down();
}
