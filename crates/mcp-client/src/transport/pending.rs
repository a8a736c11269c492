//! Request/response correlation for transports with a background reader.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::TransportError;
use crate::protocol::{decode_incoming, Incoming, JsonRpcResponse};

#[derive(Default)]
pub(crate) struct PendingRequests {
    waiters: Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>,
}

impl PendingRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: u64) -> oneshot::Receiver<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id, tx);
        rx
    }

    pub(crate) fn cancel(&self, id: u64) {
        self.waiters.lock().remove(&id);
    }

    /// Hand a response to its waiter. Returns `false` for unknown ids.
    pub(crate) fn complete(&self, response: JsonRpcResponse) -> bool {
        let waiter = self.waiters.lock().remove(&response.id);
        match waiter {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Decode a text frame and route every response in it.
    pub(crate) fn dispatch_frame(&self, server: &str, text: &str) {
        for incoming in decode_incoming(text) {
            match incoming {
                Incoming::Response(resp) => {
                    let id = resp.id;
                    if !self.complete(resp) {
                        tracing::debug!(server, id, "response for unknown request id");
                    }
                }
                Incoming::ServerMessage { method } => {
                    tracing::debug!(server, method = %method, "ignoring server-initiated message");
                }
            }
        }
    }

    /// Drop every waiter; their receivers observe a closed channel.
    pub(crate) fn fail_all(&self) {
        self.waiters.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.waiters.lock().len()
    }
}

pub(crate) async fn await_response(
    rx: oneshot::Receiver<JsonRpcResponse>,
    timeout: Duration,
) -> Result<JsonRpcResponse, TransportError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(resp)) => Ok(resp),
        Ok(Err(_)) => Err(TransportError::Closed),
        Err(_) => Err(TransportError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_completes_matching_waiter() {
        let pending = PendingRequests::new();
        let rx = pending.register(4);
        pending.dispatch_frame("t", r#"{"jsonrpc":"2.0","id":4,"result":{"ok":true}}"#);
        let resp = await_response(rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(resp.result.unwrap()["ok"], true);
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test]
    async fn fail_all_closes_waiters() {
        let pending = PendingRequests::new();
        let rx = pending.register(1);
        pending.fail_all();
        let err = await_response(rx, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_response_times_out() {
        let pending = PendingRequests::new();
        let rx = pending.register(9);
        let err = await_response(rx, Duration::from_secs(30)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }
}
