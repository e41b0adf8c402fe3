//! The star-topology message router.

use crate::rpc::wire::{frame_stream, recv_frame, send_frame, Envelope, Frame};
use crate::types::Result;
use crate::utils::config::RpcConfig;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type PeerMap = Arc<Mutex<HashMap<String, mpsc::Sender<Envelope>>>>;

/// Routes envelopes between identity-addressed peers.
///
/// Peers connect over TCP, announce themselves with a `Hello` frame, and
/// from then on any envelope they send is forwarded to its `to` peer. The
/// broker never inspects bodies and never buffers for absent peers;
/// envelopes without a connected recipient are logged and dropped.
pub struct RpcBroker {
    config: RpcConfig,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RpcBroker {
    /// A broker for the configured endpoint, not yet started.
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    /// Bind the endpoint and start routing in a background task.
    ///
    /// A broker that is already running is stopped first.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            tracing::warn!("terminating existing broker task before restart");
            self.stop().await?;
        }

        let listener = TcpListener::bind(self.config.address()).await?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, cancel.clone()));

        tracing::info!("broker listening on {}", self.config.address());

        self.running = Some(Running { cancel, task });

        Ok(())
    }

    /// Signal the routing loop to terminate and wait for it within the
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
            tracing::warn!("broker task is not terminated");
        } else {
            tracing::info!("broker task has been terminated");
        }

        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, cancel: CancellationToken) {
    let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    tokio::spawn(serve_peer(stream, Arc::clone(&peers), cancel.clone()));
                }
                Err(e) => {
                    tracing::warn!("broker accept failed: {e}");
                }
            },
        }
    }

    tracing::debug!("broker task exiting ...");
}

async fn serve_peer(stream: TcpStream, peers: PeerMap, cancel: CancellationToken) {
    let (mut sink, mut frames) = frame_stream(stream).split();

    let id = match recv_frame(&mut frames).await {
        Ok(Some(Frame::Hello { id })) => id,
        Ok(_) | Err(_) => {
            tracing::warn!("peer dropped before identifying itself");
            return;
        }
    };

    let (tx, mut outbound) = mpsc::channel::<Envelope>(64);
    peers.lock().await.insert(id.clone(), tx);
    tracing::debug!("peer [{id}] connected");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            delivery = outbound.recv() => match delivery {
                Some(envelope) => {
                    if send_frame(&mut sink, &Frame::Message(envelope)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = recv_frame(&mut frames) => match inbound {
                Ok(Some(Frame::Message(envelope))) => {
                    tracing::debug!("routing [{}] > [{}]", envelope.from, envelope.to);
                    let recipient = peers.lock().await.get(&envelope.to).cloned();
                    match recipient {
                        Some(recipient) => {
                            if recipient.send(envelope).await.is_err() {
                                tracing::warn!("recipient channel closed; envelope dropped");
                            }
                        }
                        None => {
                            tracing::warn!(
                                "no peer [{}] connected; envelope from [{}] dropped",
                                envelope.to,
                                envelope.from
                            );
                        }
                    }
                }
                Ok(Some(Frame::Hello { .. })) => {
                    tracing::warn!("peer [{id}] sent a second hello; ignoring");
                }
                Ok(None) | Err(_) => break,
            },
        }
    }

    peers.lock().await.remove(&id);
    tracing::debug!("peer [{id}] disconnected");
}
