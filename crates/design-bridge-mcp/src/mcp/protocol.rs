//! JSON-RPC peer over a line-delimited byte stream.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use design_bridge_core::RemoteError;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{Mutex, oneshot},
    task::JoinHandle,
};

use super::types::{
    Incoming, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RawMessage,
};

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    Closed,
}

impl From<ProtocolError> for RemoteError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Closed => Self::Closed,
            ProtocolError::Io(e) => Self::Transport(e.to_string()),
            ProtocolError::Json(e) => Self::Protocol(e.to_string()),
        }
    }
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type Reply = Result<Value, RemoteError>;
type PendingMap = HashMap<u64, oneshot::Sender<Reply>>;

/// Handles bidirectional JSON-RPC communication with the server process.
///
/// Requests are multiplexed by id, so any number of tasks may have calls in
/// flight at once.
#[derive(Clone)]
pub struct ProtocolPeer {
    writer: Arc<Mutex<Option<BoxedWriter>>>,
    pending: Arc<Mutex<PendingMap>>,
    next_id: Arc<AtomicU64>,
    reader: Arc<Mutex<Option<JoinHandle<()>>>>,
    request_timeout: Duration,
}

impl ProtocolPeer {
    /// Spawn a new protocol peer.
    ///
    /// This starts a background task that reads server output and routes
    /// replies to their callers.
    #[must_use]
    pub fn spawn<R, W>(reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer = Self {
            writer: Arc::new(Mutex::new(Some(Box::new(writer)))),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            reader: Arc::new(Mutex::new(None)),
            request_timeout,
        };

        let reader_peer = peer.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = reader_peer.read_loop(reader).await {
                tracing::error!("Protocol reader loop error: {}", e);
            }
            // Refuse new requests before failing the outstanding ones.
            reader_peer.writer.lock().await.take();
            reader_peer.fail_pending().await;
        });

        // The slot was created empty just above, so this cannot contend.
        if let Ok(mut slot) = peer.reader.try_lock() {
            *slot = Some(handle);
        }

        peer
    }

    async fn read_loop<R>(&self, reader: R) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Send + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buffer = String::new();

        loop {
            buffer.clear();
            if reader.read_line(&mut buffer).await? == 0 {
                tracing::debug!("Server closed its output");
                return Ok(());
            }

            let line = buffer.trim();
            if line.is_empty() {
                continue;
            }

            let raw = match serde_json::from_str::<RawMessage>(line) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, raw = %line, "Ignoring unparseable server line");
                    continue;
                }
            };

            match Incoming::from(raw) {
                Incoming::Response { id, outcome } => self.complete(id, outcome).await,
                Incoming::Request { id, method, .. } => self.handle_server_request(id, &method).await,
                Incoming::Notification { method, params } => {
                    tracing::debug!(%method, params = ?params, "Server notification");
                }
                Incoming::Unknown => {
                    tracing::debug!(raw = %line, "Ignoring unrecognized server message");
                }
            }
        }
    }

    async fn complete(&self, id: u64, outcome: Result<Value, JsonRpcError>) {
        let Some(tx) = self.pending.lock().await.remove(&id) else {
            tracing::debug!(id, "Reply for unknown or expired request");
            return;
        };
        let reply = outcome.map_err(|e| RemoteError::Rejected(e.message));
        // The caller may have timed out and gone away.
        let _ = tx.send(reply);
    }

    async fn handle_server_request(&self, id: Value, method: &str) {
        let response = if method == "ping" {
            JsonRpcResponse::success(id, serde_json::json!({}))
        } else {
            tracing::warn!(%method, "Unsupported server request");
            JsonRpcResponse::error(
                id,
                JsonRpcError::new(
                    JsonRpcError::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                ),
            )
        };
        if let Err(e) = self.send_json(&response).await {
            tracing::error!("Failed to answer server request: {e}");
        }
    }

    async fn fail_pending(&self) {
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(RemoteError::Closed));
        }
    }

    async fn send_json<T: serde::Serialize>(&self, message: &T) -> Result<(), ProtocolError> {
        let json = serde_json::to_string(message)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::Closed)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Send a request and wait for its reply.
    ///
    /// # Errors
    /// Returns the server's error message as `RemoteError::Rejected`, or a
    /// transport, timeout or closed error.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, RemoteError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        tracing::trace!(id, %method, "Sending request");
        if let Err(e) = self.send_json(&JsonRpcRequest::new(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(RemoteError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                let millis = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(RemoteError::Timeout(millis))
            }
        }
    }

    /// Send a notification.
    ///
    /// # Errors
    /// Returns error if write fails.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ProtocolError> {
        self.send_json(&JsonRpcNotification::new(method, params)).await
    }

    /// Close the session: shut the write side and stop reading.
    ///
    /// Outstanding requests fail with `RemoteError::Closed`. Closing twice is
    /// a no-op.
    ///
    /// # Errors
    /// Returns error if the writer could not be shut down cleanly.
    pub async fn close(&self) -> Result<(), ProtocolError> {
        let writer = self.writer.lock().await.take();
        let shutdown = match writer {
            Some(mut w) => w.shutdown().await.map_err(ProtocolError::from),
            None => Ok(()),
        };

        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        self.fail_pending().await;

        shutdown
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

    use super::*;

    /// Server half of an in-memory pipe pair.
    struct FakeServer {
        lines: Lines<BufReader<DuplexStream>>,
        out: DuplexStream,
    }

    impl FakeServer {
        async fn recv(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn send(&mut self, value: Value) {
            let mut line = value.to_string();
            line.push('\n');
            self.out.write_all(line.as_bytes()).await.unwrap();
        }
    }

    fn pair(timeout: Duration) -> (ProtocolPeer, FakeServer) {
        let (client_out, server_in) = tokio::io::duplex(4096);
        let (server_out, client_in) = tokio::io::duplex(4096);
        let peer = ProtocolPeer::spawn(client_in, client_out, timeout);
        let server = FakeServer {
            lines: BufReader::new(server_in).lines(),
            out: server_out,
        };
        (peer, server)
    }

    #[tokio::test]
    async fn routes_out_of_order_replies_to_their_callers() {
        let (peer, mut server) = pair(Duration::from_secs(5));

        let first = tokio::spawn({
            let peer = peer.clone();
            async move { peer.request("tools/call", Some(json!({ "name": "a" }))).await }
        });
        let a = server.recv().await;
        let second = tokio::spawn({
            let peer = peer.clone();
            async move { peer.request("tools/call", Some(json!({ "name": "b" }))).await }
        });
        let b = server.recv().await;

        server.send(json!({ "jsonrpc": "2.0", "id": b["id"], "result": "second" })).await;
        server.send(json!({ "jsonrpc": "2.0", "id": a["id"], "result": "first" })).await;

        assert_eq!(first.await.unwrap().unwrap(), json!("first"));
        assert_eq!(second.await.unwrap().unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn error_reply_keeps_server_message() {
        let (peer, mut server) = pair(Duration::from_secs(5));
        let call = tokio::spawn({
            let peer = peer.clone();
            async move { peer.request("tools/call", None).await }
        });
        let req = server.recv().await;
        server
            .send(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": { "code": -32602, "message": "Invalid arguments for tool create_frame" }
            }))
            .await;
        assert_eq!(
            call.await.unwrap(),
            Err(RemoteError::Rejected("Invalid arguments for tool create_frame".into()))
        );
    }

    #[tokio::test]
    async fn answers_server_ping() {
        let (_peer, mut server) = pair(Duration::from_secs(5));
        server.send(json!({ "jsonrpc": "2.0", "id": "s1", "method": "ping" })).await;
        let reply = server.recv().await;
        assert_eq!(reply, json!({ "jsonrpc": "2.0", "id": "s1", "result": {} }));
    }

    #[tokio::test]
    async fn pending_requests_fail_when_server_exits() {
        let (peer, mut server) = pair(Duration::from_secs(5));
        let call = tokio::spawn({
            let peer = peer.clone();
            async move { peer.request("tools/list", None).await }
        });
        let _ = server.recv().await;
        drop(server);
        assert_eq!(call.await.unwrap(), Err(RemoteError::Closed));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let (peer, mut server) = pair(Duration::from_millis(50));
        let call = tokio::spawn({
            let peer = peer.clone();
            async move { peer.request("tools/list", None).await }
        });
        let _ = server.recv().await;
        assert_eq!(call.await.unwrap(), Err(RemoteError::Timeout(50)));
    }

    #[tokio::test]
    async fn requests_after_close_are_refused() {
        let (peer, _server) = pair(Duration::from_secs(5));
        tokio_test::assert_ok!(peer.close().await);
        tokio_test::assert_ok!(peer.close().await);
        assert_eq!(peer.request("tools/list", None).await, Err(RemoteError::Closed));
    }
}
