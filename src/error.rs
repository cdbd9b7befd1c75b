//! Error types for the scenewire client
//!
//! A single thiserror enum covers the whole taxonomy: transport failures,
//! correlation timeouts, malformed payloads, remote-reported failures, and
//! reconciliation budget exhaustion. Callers are expected to propagate these;
//! the client performs no implicit retry of write operations.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by every client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The transport could not be established.
    #[error("connection failed: {0}")]
    Connection(#[from] io::Error),

    /// The connection closed while requests were outstanding, or a call was
    /// issued against an already-closed connection.
    #[error("connection lost")]
    ConnectionLost,

    /// No matching reply arrived within the per-call budget.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// A frame or member payload was malformed, carried an unrecognized
    /// value tag, or otherwise violated the wire contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote side reported a failure; carries its message verbatim.
    #[error("operation failed: {0}")]
    Operation(String),

    /// A name-based lookup matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The reconciler exhausted its retry budget before the entity became
    /// observable.
    #[error("entity not visible after {attempts} attempts")]
    ConsistencyTimeout {
        /// Number of query attempts that were made.
        attempts: u32,
    },
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
