//! The RPC client.

use crate::rpc::wire::{frame_stream, recv_frame, send_frame, Envelope, Frame, Reply, Request};
use crate::types::{AgentError, Call, CallResult, Kwargs, Result};
use crate::utils::config::RpcConfig;
use futures::stream::{SplitSink, SplitStream};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_util::bytes::Bytes;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::rpc::wire::WireStream;

type PendingMap = Arc<parking_lot::Mutex<HashMap<Uuid, oneshot::Sender<CallResult>>>>;

/// Calls into RPC servers through the broker.
///
/// Every request carries a fresh correlation id and the client matches
/// replies by id, so any number of calls may overlap on one connection,
/// whether from concurrent tasks or via [`RpcClient::call_async`]. Cloning the
/// client shares the underlying connection.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    id: String,
    sink: Mutex<SplitSink<WireStream, Bytes>>,
    pending: PendingMap,
    cancel: CancellationToken,
}

impl RpcClient {
    /// Connect to the broker with the given identity.
    pub async fn connect(id: impl Into<String>, config: &RpcConfig) -> Result<Self> {
        let id = id.into();
        let stream = TcpStream::connect(config.address()).await?;
        let mut framed = frame_stream(stream);
        send_frame(&mut framed, &Frame::Hello { id: id.clone() }).await?;

        let (sink, frames) = framed.split();
        let pending: PendingMap = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        tokio::spawn(read_replies(
            frames,
            Arc::clone(&pending),
            cancel.clone(),
        ));

        Ok(Self {
            inner: Arc::new(ClientInner {
                id,
                sink: Mutex::new(sink),
                pending,
                cancel,
            }),
        })
    }

    /// This client's identity on the wire.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Call `function` on the named server and wait for the reply.
    ///
    /// Fails with [`AgentError::Remote`] when the handler failed and with
    /// [`AgentError::Timeout`] when no reply arrives within `timeout`; a
    /// timed-out call leaves the client fully usable.
    pub async fn call(
        &self,
        server: &str,
        function: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        timeout: Duration,
    ) -> Result<Value> {
        let call_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(call_id, tx);

        let request = Request {
            call_id,
            call: Call {
                function: function.to_string(),
                args: args.clone(),
                kwargs: kwargs.clone(),
            },
        };
        let envelope = Envelope {
            from: self.inner.id.clone(),
            to: server.to_string(),
            body: serde_json::to_value(&request)?,
        };

        {
            let mut sink = self.inner.sink.lock().await;
            if let Err(e) = send_frame(&mut *sink, &Frame::Message(envelope)).await {
                self.inner.pending.lock().remove(&call_id);
                return Err(e);
            }
        }

        let context = || {
            format!(
                "when calling {server}:\n> function: {function}\n> args: {}\n> kwargs: {}",
                serde_json::to_string(&args).unwrap_or_default(),
                serde_json::to_string(&kwargs).unwrap_or_default(),
            )
        };

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.inner.pending.lock().remove(&call_id);
                Err(AgentError::Timeout(format!("timeout {}", context())))
            }
            Ok(Err(_)) => Err(AgentError::Internal("client disconnected".into())),
            Ok(Ok(result)) => {
                let result = result.normalized();
                if result.is_error() {
                    Err(AgentError::Remote(format!(
                        "error {}\nerror message:\n{}",
                        context(),
                        result.error.unwrap_or_default()
                    )))
                } else {
                    Ok(result.result.unwrap_or(Value::Null))
                }
            }
        }
    }

    /// Start a call in the background and return a handle to its outcome.
    pub fn call_async(
        &self,
        server: &str,
        function: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        timeout: Duration,
    ) -> PendingRpcCall {
        let client = self.clone();
        let server = server.to_string();
        let function = function.to_string();

        PendingRpcCall {
            task: tokio::spawn(async move {
                client.call(&server, &function, args, kwargs, timeout).await
            }),
        }
    }

    /// Drop the connection. In-flight calls fail with a disconnect error.
    pub fn disconnect(&self) {
        self.inner.cancel.cancel();
        self.inner.pending.lock().clear();
    }
}

async fn read_replies(
    mut frames: SplitStream<WireStream>,
    pending: PendingMap,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            inbound = recv_frame(&mut frames) => match inbound {
                Ok(Some(Frame::Message(envelope))) => {
                    let reply: Reply = match serde_json::from_value(envelope.body) {
                        Ok(reply) => reply,
                        Err(e) => {
                            tracing::warn!("client received malformed reply from [{}]: {e}", envelope.from);
                            continue;
                        }
                    };

                    match pending.lock().remove(&reply.call_id) {
                        Some(waiter) => {
                            let _ = waiter.send(reply.result);
                        }
                        None => {
                            // Either the call timed out already or the id is
                            // unknown; both are non-fatal.
                            tracing::debug!("dropping uncorrelated reply {}", reply.call_id);
                        }
                    }
                }
                Ok(Some(Frame::Hello { .. })) => continue,
                Ok(None) | Err(_) => break,
            },
        }
    }
}

/// Handle to a call started with [`RpcClient::call_async`].
pub struct PendingRpcCall {
    task: tokio::task::JoinHandle<Result<Value>>,
}

impl PendingRpcCall {
    /// Wait for the call to finish and return its outcome.
    pub async fn join(self) -> Result<Value> {
        self.task
            .await
            .map_err(|e| AgentError::Internal(format!("async call aborted: {e}")))?
    }

    /// Whether the call has already completed.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
