//! The callback server.

use crate::rpc::wire::{frame_stream, recv_frame, send_frame, Envelope, Frame, Reply, Request};
use crate::types::{CallResult, Kwargs, Result};
use crate::utils::config::RpcConfig;
use futures::future::BoxFuture;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound on concurrently executing handlers.
const POOL_SIZE: usize = 32;

/// A registered callback: positional and keyword arguments in, value out.
pub type Handler = Arc<dyn Fn(Vec<Value>, Kwargs) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Box an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Vec<Value>, Kwargs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |args, kwargs| Box::pin(f(args, kwargs)))
}

/// The explicit function-name-to-handler binding shared by the RPC server
/// and the HTTP facade. Immutable once a server starts.
#[derive(Default, Clone)]
pub struct CallbackTable {
    handlers: HashMap<String, Handler>,
}

impl CallbackTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`, replacing any previous binding.
    pub fn register(&mut self, name: impl Into<String>, handler: Handler) -> &mut Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Look up a handler.
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }

    /// The registered function names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the named callback and fold any failure into the result, the
    /// encoding every transport uses.
    pub async fn dispatch(&self, function: &str, args: Vec<Value>, kwargs: Kwargs) -> CallResult {
        let Some(handler) = self.get(function) else {
            return CallResult::err(format!("no such function: {function}"));
        };

        match handler(args, kwargs).await {
            Ok(value) => CallResult::ok(value),
            Err(e) => CallResult::err(e.to_string()),
        }
    }
}

/// Serves a callback table to RPC clients via the broker.
///
/// Inbound requests are validated, dispatched onto a bounded pool, and
/// answered with a correlated [`Reply`] to the sender captured at arrival.
/// Multiple calls may be in flight at once, so completion order across
/// clients is unspecified; each client's replies carry its own ids.
pub struct RpcServer {
    id: String,
    config: RpcConfig,
    callbacks: Arc<CallbackTable>,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RpcServer {
    /// A server with identity `id`, not yet connected.
    pub fn new(id: impl Into<String>, config: RpcConfig, callbacks: CallbackTable) -> Self {
        Self {
            id: id.into(),
            config,
            callbacks: Arc::new(callbacks),
            running: None,
        }
    }

    /// Connect to the broker and start serving in a background task.
    ///
    /// A server that is already running is stopped first.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            tracing::warn!("terminating existing server task before restart");
            self.stop().await?;
        }

        let stream = TcpStream::connect(self.config.address()).await?;
        let mut framed = frame_stream(stream);
        send_frame(
            &mut framed,
            &Frame::Hello {
                id: self.id.clone(),
            },
        )
        .await?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(serve(
            self.id.clone(),
            framed,
            Arc::clone(&self.callbacks),
            cancel.clone(),
        ));

        tracing::info!("RPC server [{}] connected to {}", self.id, self.config.address());

        self.running = Some(Running { cancel, task });

        Ok(())
    }

    /// Signal the serving loop to terminate and wait for it within the
    /// configured timeout.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        if tokio::time::timeout(self.config.timeout(), running.task)
            .await
            .is_err()
        {
            tracing::warn!("RPC server task is not terminated");
        } else {
            tracing::info!("RPC server task has been terminated");
        }

        Ok(())
    }
}

async fn serve(
    id: String,
    framed: crate::rpc::wire::WireStream,
    callbacks: Arc<CallbackTable>,
    cancel: CancellationToken,
) {
    let (mut sink, mut frames) = framed.split();
    let (reply_tx, mut replies) = mpsc::channel::<(String, Reply)>(64);
    let pool = Arc::new(Semaphore::new(POOL_SIZE));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            completed = replies.recv() => match completed {
                Some((to, reply)) => {
                    let envelope = match serde_json::to_value(&reply) {
                        Ok(body) => Envelope { from: id.clone(), to, body },
                        Err(e) => {
                            tracing::error!("failed to encode reply: {e}");
                            continue;
                        }
                    };
                    if send_frame(&mut sink, &Frame::Message(envelope)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = recv_frame(&mut frames) => match inbound {
                Ok(Some(Frame::Message(envelope))) => {
                    tracing::debug!("RPC server [{id}] request from [{}]", envelope.from);
                    let request: Request = match serde_json::from_value(envelope.body) {
                        Ok(request) => request,
                        Err(e) => {
                            // Without a correlation id there is nothing to
                            // answer; log and keep serving.
                            tracing::warn!("server [{id}] received malformed request: {e}");
                            continue;
                        }
                    };

                    // Each request captures its own sender and id; replies
                    // can never be misrouted by later arrivals.
                    let sender = envelope.from;
                    let call_id = request.call_id;
                    let callbacks = Arc::clone(&callbacks);
                    let pool = Arc::clone(&pool);
                    let reply_tx = reply_tx.clone();
                    tokio::spawn(async move {
                        let _permit = pool.acquire_owned().await;
                        let result = callbacks
                            .dispatch(&request.call.function, request.call.args, request.call.kwargs)
                            .await;
                        let _ = reply_tx.send((sender, Reply { call_id, result })).await;
                    });
                }
                Ok(Some(Frame::Hello { .. })) => continue,
                Ok(None) | Err(_) => break,
            },
        }
    }

    tracing::debug!("server task [{id}] exiting ...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentError;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_folds_outcomes_into_results() {
        let mut table = CallbackTable::new();
        table.register(
            "double",
            handler(|args, _kwargs| async move {
                let n = args
                    .first()
                    .and_then(Value::as_f64)
                    .ok_or_else(|| AgentError::InvalidInput("missing operand".into()))?;
                Ok(json!(n * 2.0))
            }),
        );
        let table = Arc::new(table);

        let ok = table.dispatch("double", vec![json!(21.0)], Kwargs::new()).await;
        assert_eq!(ok.result, Some(json!(42.0)));

        let err = table.dispatch("double", vec![], Kwargs::new()).await;
        assert!(err.error.unwrap().contains("missing operand"));

        let missing = table.dispatch("nope", vec![], Kwargs::new()).await;
        assert!(missing.error.unwrap().contains("no such function"));
    }

    #[test]
    fn names_are_sorted() {
        let mut table = CallbackTable::new();
        table.register("tools", handler(|_, _| async { Ok(Value::Null) }));
        table.register("ais", handler(|_, _| async { Ok(Value::Null) }));
        assert_eq!(table.names(), vec!["ais", "tools"]);
    }
}
