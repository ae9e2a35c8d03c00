/// JSON-RPC Client
///
/// The calling side of a stream connection. Requests may be issued
/// concurrently from many tasks; `PendingRequests` matches each response
/// frame to its waiting caller by id, whatever order responses arrive in.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::error::ClientError;
use crate::core::protocol::{JsonRpcRequest, JsonRpcResponse, ToolCallResult};
use crate::core::transport::{FrameReceiver, FrameSender, StreamTransport};

type Waiter = oneshot::Sender<Result<JsonRpcResponse, ClientError>>;
type ResponseWaiter = oneshot::Receiver<Result<JsonRpcResponse, ClientError>>;

#[derive(Default)]
struct PendingState {
    waiters: HashMap<u64, Waiter>,
    closed: bool,
}

/// Outstanding requests keyed by id.
///
/// Each id has at most one waiter at a time. A waiter is completed exactly
/// once: by its response, by cancellation, or by connection closure.
#[derive(Default)]
pub struct PendingRequests {
    state: Mutex<PendingState>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PendingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start waiting for the response to `id`.
    pub fn register(&self, id: u64) -> Result<ResponseWaiter, ClientError> {
        let mut state = self.state();
        if state.closed {
            return Err(ClientError::Closed);
        }
        if state.waiters.contains_key(&id) {
            return Err(ClientError::DuplicateRequestId(id));
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Hand a response to its waiter. Returns false when nobody waits for
    /// its id (never sent, timed out, or answered twice).
    pub fn fulfill(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id_u64() else {
            return false;
        };
        let waiter = self.state().waiters.remove(&id);
        match waiter {
            Some(waiter) => {
                // The caller may have stopped waiting; that is not an error.
                let _ = waiter.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Stop waiting for `id`. Returns whether it was pending.
    pub fn cancel(&self, id: u64) -> bool {
        self.state().waiters.remove(&id).is_some()
    }

    /// Fail every waiter with `ClientError::Closed` and refuse new ones.
    /// Returns the number of waiters failed.
    pub fn close(&self) -> usize {
        let waiters = {
            let mut state = self.state();
            state.closed = true;
            std::mem::take(&mut state.waiters)
        };
        let failed = waiters.len();
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(ClientError::Closed));
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.state().waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Client for an MCP server reachable over a `StreamTransport`.
pub struct RpcClient {
    sender: FrameSender,
    pending: Arc<PendingRequests>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Take over `transport` and start routing incoming responses.
    pub fn new(transport: StreamTransport) -> Self {
        let (sender, receiver) = transport.split();
        let pending = Arc::new(PendingRequests::new());
        let reader = tokio::spawn(route_responses(receiver, Arc::clone(&pending)));
        Self {
            sender,
            pending,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Send a request with the next free id and wait for its response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.call_with_id(id, method, params).await
    }

    /// Send a request under a caller-chosen id. The id must not be pending.
    ///
    /// Dropping the returned future before it completes forgets the pending
    /// entry, so the id can be used again.
    pub async fn call_with_id(
        &self,
        id: u64,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, ClientError> {
        let (guard, waiter) = self.send_request(id, method, params).await?;
        await_response(guard, waiter).await
    }

    async fn send_request(
        &self,
        id: u64,
        method: &str,
        params: Option<Value>,
    ) -> Result<(PendingGuard<'_>, ResponseWaiter), ClientError> {
        let waiter = self.pending.register(id)?;
        let guard = PendingGuard {
            pending: &self.pending,
            id,
            settled: false,
        };
        self.sender.send(&JsonRpcRequest::new(id, method, params)).await?;
        Ok((guard, waiter))
    }

    /// Like `call`, but gives up after `timeout`. Giving up only forgets
    /// the pending entry; the server still runs the request to completion.
    /// The timeout covers the wait for the response, never a frame write.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (guard, waiter) = self.send_request(id, method, params).await?;
        match tokio::time::timeout(timeout, await_response(guard, waiter)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(id)),
        }
    }

    /// Send a message that expects no reply.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ClientError> {
        self.sender
            .send(&JsonRpcRequest::notification(method, params))
            .await?;
        Ok(())
    }

    /// Run the `initialize` handshake and return the server's result.
    pub async fn initialize(&self, protocol_version: &str) -> Result<Value, ClientError> {
        let response = self
            .call("initialize", Some(json!({"protocolVersion": protocol_version})))
            .await?;
        let result = into_result(response)?;
        self.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    pub async fn list_tools(&self) -> Result<Vec<Value>, ClientError> {
        let result = into_result(self.call("tools/list", None).await?)?;
        match result.get("tools") {
            Some(Value::Array(tools)) => Ok(tools.clone()),
            _ => Err(ClientError::UnexpectedResponse(
                "tools/list result has no tools array".to_string(),
            )),
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, ClientError> {
        let response = self
            .call("tools/call", Some(json!({"name": name, "arguments": arguments})))
            .await?;
        let result = into_result(response)?;
        serde_json::from_value(result).map_err(|e| ClientError::UnexpectedResponse(e.to_string()))
    }

    /// Close the write side; pending calls fail once the server hangs up.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.sender.close().await?;
        Ok(())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.pending.close();
    }
}

/// Removes an unanswered request from the pending map when the caller stops
/// waiting for it.
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: u64,
    settled: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled && self.pending.cancel(self.id) {
            debug!(id = self.id, "abandoned pending request");
        }
    }
}

async fn await_response(
    mut guard: PendingGuard<'_>,
    waiter: ResponseWaiter,
) -> Result<JsonRpcResponse, ClientError> {
    let response = waiter.await;
    // Fulfilment or closure already removed the entry; the id may have
    // been registered again since.
    guard.settled = true;
    response.map_err(|_| ClientError::Closed)?
}

fn into_result(response: JsonRpcResponse) -> Result<Value, ClientError> {
    match (response.result, response.error) {
        (_, Some(error)) => Err(ClientError::Rpc(error)),
        (Some(result), None) => Ok(result),
        (None, None) => Err(ClientError::UnexpectedResponse(
            "response has neither result nor error".to_string(),
        )),
    }
}

async fn route_responses(mut receiver: FrameReceiver, pending: Arc<PendingRequests>) {
    while let Some(frame) = receiver.receive().await {
        match frame {
            Ok(message) => match serde_json::from_value::<JsonRpcResponse>(message) {
                Ok(response) => {
                    let id = response.id.clone();
                    if !pending.fulfill(response) {
                        debug!(id = ?id, "response for a request nobody is waiting for");
                    }
                }
                Err(e) => warn!(error = %e, "ignoring frame that is not a response"),
            },
            Err(e) if e.is_recoverable() => warn!(error = %e, "dropping unreadable frame"),
            Err(e) => {
                warn!(error = %e, "connection failed");
                break;
            }
        }
    }
    let failed = pending.close();
    debug!(failed, "connection closed, pending requests failed");
}
