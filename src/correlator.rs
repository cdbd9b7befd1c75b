//! Request correlation
//!
//! Every outbound call gets a fresh id from a monotonic counter and a slot
//! in the pending-request table before its frame is handed to the writer.
//! Replies may arrive in any order; matching is strictly by id and each
//! pending entry is completed at most once. A per-call timeout removes the
//! entry and fails the caller; connection loss drains the whole table.
//!
//! The table is the only shared mutable structure in the client, guarded by
//! one coarse mutex — operations on it are O(1) map inserts and removes.

use crate::error::{ClientError, Result};
use crate::transport::{self, CommandFrame, ReplyFrame};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub(crate) struct Correlator {
    next_id: AtomicU64,
    closed: AtomicBool,
    pending: Mutex<HashMap<u64, oneshot::Sender<ReplyFrame>>>,
    outbound: mpsc::Sender<Vec<u8>>,
}

impl Correlator {
    pub(crate) fn new(outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            pending: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    /// Send one command and suspend until its matched reply, a timeout, or
    /// connection loss.
    pub(crate) async fn call(
        &self,
        operation: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ConnectionLost);
        }

        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = transport::encode_line(&CommandFrame {
            request_id,
            operation: operation.to_string(),
            params,
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);

        // A shutdown racing the insert above would drain the table without
        // seeing our entry; re-checking after the insert closes that window.
        if self.closed.load(Ordering::Acquire) {
            self.pending.lock().remove(&request_id);
            return Err(ClientError::ConnectionLost);
        }

        if self.outbound.send(line).await.is_err() {
            self.pending.lock().remove(&request_id);
            return Err(ClientError::ConnectionLost);
        }
        tracing::debug!(request_id, operation, "request sent");

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            // Sender dropped: the table was drained on connection loss.
            Ok(Err(_)) => return Err(ClientError::ConnectionLost),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                tracing::debug!(request_id, operation, "request timed out");
                return Err(ClientError::Timeout(timeout));
            }
        };

        if reply.success {
            Ok(reply.data)
        } else {
            let message = reply
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unspecified remote failure".to_string());
            Err(ClientError::Operation(message))
        }
    }

    /// Complete the pending entry matching this reply, if any.
    pub(crate) fn complete(&self, frame: ReplyFrame) {
        let entry = self.pending.lock().remove(&frame.request_id);
        match entry {
            // The receiver may have timed out concurrently; nothing to do.
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => {
                tracing::warn!(request_id = frame.request_id, "reply matched no pending request")
            }
        }
    }

    /// Mark the connection dead and fail every pending request.
    ///
    /// Idempotent: only the first caller drains the table, so the
    /// connection-lost notification fires exactly once.
    pub(crate) fn shut_down(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(
                count = drained.len(),
                "failing pending requests on connection loss"
            );
        }
        // Dropping the senders wakes every waiter with ConnectionLost.
    }
}
