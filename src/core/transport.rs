/// Stream Transport
///
/// Turns a raw duplex byte stream into JSON messages and back:
/// - a dedicated read task drains the input, splits it into frames and
///   forwards decoded messages over a channel (`FrameReceiver`)
/// - writers share a `FrameSender` whose mutex keeps frames whole on the wire
///
/// Reading never waits on writing and vice versa, so one side can push a
/// frame far larger than the pipe's buffer while the other keeps draining.
/// Closure (end-of-stream or an I/O failure) is terminal.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::core::codec::{FrameDecoder, LineCodec};
use crate::core::dispatcher::Dispatcher;
use crate::core::error::TransportError;
use crate::core::protocol::{JsonRpcError, JsonRpcResponse, ToolCallResult};

/// Decoded frames buffered between the read task and its consumer.
const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Bytes requested from the input per read.
const READ_CHUNK: usize = 8192;

type BoxedWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// A newline-framed JSON connection over one reader and one writer.
///
/// Must be created inside a tokio runtime: construction spawns the read task.
pub struct StreamTransport {
    sender: FrameSender,
    receiver: FrameReceiver,
}

impl StreamTransport {
    /// Wrap a reader and a writer into one framed connection.
    ///
    /// # Arguments
    /// * `reader` - Byte source; drained by a dedicated task from now on
    /// * `writer` - Byte sink; shared by every clone of the `FrameSender`
    /// * `codec` - Framing limits applied in both directions
    ///
    /// # Returns
    /// A transport ready to `serve` requests or to back an `RpcClient`.
    pub fn new<R, W>(reader: R, writer: W, codec: LineCodec) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let read_task = tokio::spawn(read_loop(reader, codec.decoder(), frames_tx));

        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        let sender = FrameSender {
            shared: Arc::new(SenderShared {
                codec,
                writer: Mutex::new(Some(BufWriter::with_capacity(READ_CHUNK, boxed))),
                closed: AtomicBool::new(false),
            }),
        };
        let receiver = FrameReceiver {
            frames: frames_rx,
            read_task,
        };
        Self { sender, receiver }
    }

    /// Both halves of the connection: one shareable write path and the
    /// single reader.
    pub fn split(self) -> (FrameSender, FrameReceiver) {
        (self.sender, self.receiver)
    }

    /// Serve JSON-RPC requests until the input ends.
    ///
    /// Each frame is dispatched on its own blocking worker, so a slow tool
    /// call never holds up later requests or the read loop. Replies may
    /// therefore leave in a different order than requests arrived; they are
    /// correlated by id only. In-flight requests finish before the writer is
    /// closed.
    pub async fn serve(self, dispatcher: Arc<Dispatcher>) -> Result<(), TransportError> {
        let (sender, mut receiver) = self.split();
        let mut workers = JoinSet::new();
        let mut outcome = Ok(());

        while let Some(frame) = receiver.receive().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) if e.is_recoverable() => {
                    warn!(error = %e, "dropping unreadable frame");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "transport read failed");
                    // The connection is gone: replies still in flight fail
                    // instead of being written to a broken stream.
                    if let Err(close_error) = sender.close().await {
                        debug!(error = %close_error, "error while closing output");
                    }
                    outcome = Err(e);
                    break;
                }
            };

            let dispatcher = Arc::clone(&dispatcher);
            let sender = sender.clone();
            workers.spawn(async move {
                let reply = tokio::task::spawn_blocking(move || dispatcher.handle(&message)).await;
                match reply {
                    Ok(Some(response)) => deliver(&sender, response).await,
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "dispatch worker failed"),
                }
            });

            while workers.try_join_next().is_some() {}
        }

        debug!(in_flight = workers.len(), "input closed, waiting for in-flight requests");
        while workers.join_next().await.is_some() {}

        if let Err(e) = sender.close().await {
            debug!(error = %e, "error while closing output");
        }
        info!("transport closed");
        outcome
    }
}

/// Write `response`, substituting a small error reply for the same id when
/// the full reply does not fit in one frame.
///
/// # Arguments
/// * `sender` - Shared write half of the connection
/// * `response` - Reply produced by the dispatcher
///
/// # Returns
/// Nothing; delivery failures are logged. A request with an id always gets
/// some answer unless the connection itself is gone.
async fn deliver(sender: &FrameSender, response: JsonRpcResponse) {
    let limit = match sender.send(&response).await {
        Ok(()) => return,
        Err(TransportError::FrameTooLarge { limit }) => limit,
        Err(e) => {
            warn!(id = ?response.id, error = %e, "failed to deliver response");
            return;
        }
    };

    warn!(id = ?response.id, limit, "response exceeds frame limit, sending error instead");
    let message = format!("Response exceeds the {} byte frame limit", limit);
    let is_tool_result = response
        .result
        .as_ref()
        .is_some_and(|result| result.get("isError").is_some());
    let fallback = match (&response.id, is_tool_result) {
        (Some(id), true) => serde_json::to_value(ToolCallResult::error(message))
            .map(|result| JsonRpcResponse::success(id.clone(), result))
            .unwrap_or_else(|e| {
                JsonRpcResponse::failure(Some(id.clone()), JsonRpcError::internal_error(e.to_string()))
            }),
        (id, _) => JsonRpcResponse::failure(id.clone(), JsonRpcError::internal_error(message)),
    };
    if let Err(e) = sender.send(&fallback).await {
        warn!(id = ?fallback.id, error = %e, "failed to deliver fallback response");
    }
}

struct SenderShared {
    codec: LineCodec,
    writer: Mutex<Option<BoxedWriter>>,
    closed: AtomicBool,
}

/// Write half of a connection. Cheap to clone; all clones share one writer.
#[derive(Clone)]
pub struct FrameSender {
    shared: Arc<SenderShared>,
}

impl FrameSender {
    /// Serialize and write one frame. Concurrent calls are serialized so
    /// frames never interleave. Fails with `TransportError::Closed` once the
    /// writer has been closed or has failed.
    pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let frame = self.shared.codec.encode(message)?;

        let mut guard = self.shared.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        let written = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            self.shared.closed.store(true, Ordering::Release);
            guard.take();
            return Err(e.into());
        }
        trace!(bytes = frame.len(), "frame written");
        Ok(())
    }

    /// Flush and shut down the writer. Later sends fail; closing twice is a
    /// no-op.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.shared.closed.store(true, Ordering::Release);
        let writer = self.shared.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Read half of a connection.
pub struct FrameReceiver {
    frames: mpsc::Receiver<Result<Value, TransportError>>,
    read_task: JoinHandle<()>,
}

impl FrameReceiver {
    /// Next decoded message in arrival order, or `None` once the input has
    /// ended. Recoverable errors (`FrameTooLarge`, `Malformed`) are yielded
    /// in place of the offending frame; an I/O error is the last item.
    pub async fn receive(&mut self) -> Option<Result<Value, TransportError>> {
        self.frames.recv().await
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.read_task.abort();
    }
}

async fn read_loop<R>(
    mut reader: R,
    mut decoder: FrameDecoder,
    frames: mpsc::Sender<Result<Value, TransportError>>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        while let Some(frame) = decoder.next_frame() {
            let message = frame.and_then(|bytes| {
                serde_json::from_slice::<Value>(&bytes).map_err(TransportError::from)
            });
            if frames.send(message).await.is_err() {
                debug!("frame consumer gone, stopping reader");
                return;
            }
        }

        let buffer = decoder.buffer_mut();
        buffer.reserve(READ_CHUNK);
        match reader.read_buf(buffer).await {
            Ok(0) => {
                if decoder.has_partial_frame() {
                    warn!(bytes = decoder.remaining(), "discarding incomplete frame at end of input");
                }
                debug!("input reached end of stream");
                return;
            }
            Ok(read) => trace!(bytes = read, "read from input"),
            Err(e) => {
                error!(error = %e, "failed to read from input");
                let _ = frames.send(Err(TransportError::Io(e))).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::ServerInfo;
    use crate::core::registry::{ToolDescriptor, ToolParameter, ToolRegistry};
    use crate::core::protocol::INTERNAL_ERROR;
    use serde_json::json;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader, ReadBuf, duplex};

    /// Input that fails on every read, like a reset connection.
    struct ResetReader;

    impl AsyncRead for ResetReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )))
        }
    }

    fn dispatcher_with(tools: Vec<ToolDescriptor>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            Arc::new(ToolRegistry::new(tools).unwrap()),
            ServerInfo::new("test", "0.0.0"),
        ))
    }

    #[tokio::test]
    async fn frames_arrive_whole_and_in_order() {
        let (client, server) = duplex(16);
        let (server_read, _server_write) = tokio::io::split(server);
        let (_client_read, mut client_write) = tokio::io::split(client);
        let (_sender, mut receiver) =
            StreamTransport::new(server_read, tokio::io::sink(), LineCodec::default()).split();

        client_write
            .write_all(b"{\"n\":1}\n{\"n\":2,\"text\":\"a\\nb\"}\n")
            .await
            .unwrap();
        drop(client_write);

        assert_eq!(receiver.receive().await.unwrap().unwrap(), json!({"n": 1}));
        assert_eq!(
            receiver.receive().await.unwrap().unwrap(),
            json!({"n": 2, "text": "a\nb"})
        );
    }

    #[tokio::test]
    async fn malformed_frames_do_not_end_the_stream() {
        let input: &[u8] = b"{not json}\n{\"ok\":true}\n";
        let (_sender, mut receiver) =
            StreamTransport::new(input, tokio::io::sink(), LineCodec::default()).split();

        assert!(matches!(
            receiver.receive().await,
            Some(Err(TransportError::Malformed(_)))
        ));
        assert_eq!(receiver.receive().await.unwrap().unwrap(), json!({"ok": true}));
        assert!(receiver.receive().await.is_none());
    }

    #[tokio::test]
    async fn sends_after_close_fail() {
        let (sender, _receiver) =
            StreamTransport::new(tokio::io::empty(), tokio::io::sink(), LineCodec::default()).split();
        sender.send(&json!({"first": true})).await.unwrap();
        sender.close().await.unwrap();
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(&json!({"second": true})).await,
            Err(TransportError::Closed)
        ));
        sender.close().await.unwrap();
    }

    #[tokio::test]
    async fn broken_pipe_closes_the_sender() {
        let (near, far) = duplex(64);
        drop(far);
        let (_sender_read, near_write) = tokio::io::split(near);
        let (sender, _receiver) =
            StreamTransport::new(tokio::io::empty(), near_write, LineCodec::default()).split();
        assert!(sender.send(&json!({"x": 1})).await.is_err());
        assert!(matches!(
            sender.send(&json!({"x": 2})).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn serve_answers_requests_and_skips_garbage() {
        let registry = ToolRegistry::new(vec![
            ToolDescriptor::new("echo", |args| Ok(json!(args.str("message")?)))
                .parameter(ToolParameter::required("message", json!({"type": "string"}))),
        ])
        .unwrap();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            ServerInfo::new("test", "0.0.0"),
        ));

        let input: &[u8] = b"garbage\n\
            {\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n\
            {\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"echo\",\"arguments\":{\"message\":\"hi\"}}}\n";
        let (output_write, output_read) = duplex(1024);
        let transport = StreamTransport::new(input, output_write, LineCodec::default());
        transport.serve(dispatcher).await.unwrap();

        let mut lines = BufReader::new(output_read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], json!(1));
        assert_eq!(response["result"]["content"][0]["text"], json!("hi"));
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_replies_become_internal_errors() {
        let dispatcher = dispatcher_with(vec![
            ToolDescriptor::new("wordy", |_| Ok(Value::Null)).description("x".repeat(2048)),
        ]);

        let input: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"tools/list\"}\n";
        let (output_write, output_read) = duplex(4096);
        StreamTransport::new(input, output_write, LineCodec::new(1024))
            .serve(dispatcher)
            .await
            .unwrap();

        let mut lines = BufReader::new(output_read).lines();
        let response: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(response["id"], json!(3));
        assert_eq!(response["error"]["code"], json!(INTERNAL_ERROR));
        assert!(response["error"]["message"].as_str().unwrap().contains("1024"));
    }

    #[tokio::test]
    async fn read_failure_closes_output_before_in_flight_replies() {
        let dispatcher = dispatcher_with(vec![ToolDescriptor::new("slow", |_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Value::Null)
        })]);

        let request: &[u8] =
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/call\",\"params\":{\"name\":\"slow\"}}\n";
        let (output_write, output_read) = duplex(1024);
        let outcome = StreamTransport::new(request.chain(ResetReader), output_write, LineCodec::default())
            .serve(dispatcher)
            .await;
        assert!(matches!(outcome, Err(TransportError::Io(_))));

        let mut lines = BufReader::new(output_read).lines();
        assert!(lines.next_line().await.unwrap().is_none());
    }
}
