//! The per-tool worker loop and its framed IPC channel.
//!
//! A worker hosts exactly one [`Tool`] instance behind a duplex channel of
//! length-prefixed JSON frames, so workers can be implemented in any
//! language that can frame JSON over a byte stream. Two isolation units run
//! the same loop:
//!
//! - a child process bridged over its stdin/stdout (the default; spawned
//!   through the `worker` subcommand of the server binary), and
//! - an in-process tokio task over [`tokio::io::duplex`], for embedded
//!   deployments and tests.
//!
//! The worker is strictly single-threaded with respect to its channel: it
//! reads one request, serves it, writes one response. This serialises all
//! side effects inside the tool.

use crate::tools::spec::{is_reserved, validate_manifest};
use crate::tools::tool::Tool;
use crate::types::{AgentError, Call, CallResult, Result};
use crate::utils::config::ToolConfig;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// One frame on the worker channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerFrame {
    /// Worker to supervisor: setup finished, calls are accepted.
    Ready,
    /// Supervisor to worker: invoke a method.
    Call(Call),
    /// Worker to supervisor: outcome of the previous call.
    Result(CallResult),
    /// Supervisor to worker: run teardown and exit.
    Stop,
}

trait AsyncDuplex: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> AsyncDuplex for T {}

/// Type-erased byte stream underneath a worker channel, so child-process
/// pipes, stdio and in-memory duplexes all frame the same way.
pub struct IpcTransport(Pin<Box<dyn AsyncDuplex>>);

impl AsyncRead for IpcTransport {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.0.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for IpcTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.0.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.0.as_mut().poll_shutdown(cx)
    }
}

/// A duplex stream of length-prefixed frames.
pub type IpcChannel = Framed<IpcTransport, LengthDelimitedCodec>;

/// Wrap a raw byte stream into an [`IpcChannel`].
pub fn channel(io: impl AsyncRead + AsyncWrite + Send + 'static) -> IpcChannel {
    Framed::new(IpcTransport(Box::pin(io)), LengthDelimitedCodec::new())
}

pub(crate) async fn send(channel: &mut IpcChannel, frame: &WorkerFrame) -> Result<()> {
    let encoded = serde_json::to_vec(frame)?;
    channel
        .send(Bytes::from(encoded))
        .await
        .map_err(AgentError::Io)
}

pub(crate) async fn recv(channel: &mut IpcChannel) -> Result<Option<WorkerFrame>> {
    match channel.next().await {
        None => Ok(None),
        Some(raw) => {
            let raw = raw.map_err(AgentError::Io)?;
            Ok(Some(serde_json::from_slice(&raw)?))
        }
    }
}

/// Serve one tool over `channel` until a stop signal or channel close.
///
/// Setup failures are reported as an error frame before the worker exits;
/// after `Ready`, every failure is folded into a [`CallResult`] so a broken
/// call never kills the worker.
pub async fn serve(mut tool: Box<dyn Tool>, mut channel: IpcChannel) -> Result<()> {
    let specs = tool.specs();

    if let Err(e) = validate_manifest(&specs).and_then(|()| tool.setup()) {
        let _ = send(
            &mut channel,
            &WorkerFrame::Result(CallResult::err(format!("worker startup failed: {e}"))),
        )
        .await;
        return Err(e);
    }

    send(&mut channel, &WorkerFrame::Ready).await?;

    loop {
        match recv(&mut channel).await {
            Ok(Some(WorkerFrame::Call(call))) => {
                let result = serve_call(tool.as_mut(), &specs, &call);
                send(&mut channel, &WorkerFrame::Result(result)).await?;
            }
            Ok(Some(WorkerFrame::Stop)) | Ok(None) => break,
            Ok(Some(_)) => continue,
            Err(e) => {
                // A malformed frame gets an error response; the channel
                // itself is still usable.
                tracing::warn!("worker received malformed frame: {e}");
                send(
                    &mut channel,
                    &WorkerFrame::Result(CallResult::err(format!("malformed request: {e}"))),
                )
                .await?;
            }
        }
    }

    tool.teardown();

    Ok(())
}

fn serve_call(tool: &mut dyn Tool, specs: &[crate::types::ToolSpec], call: &Call) -> CallResult {
    if call.function == "specs" {
        return match serde_json::to_value(specs) {
            Ok(value) => CallResult::ok(value),
            Err(e) => CallResult::err(format!("failed to encode specs: {e}")),
        };
    }

    if is_reserved(&call.function) {
        return CallResult::err(format!("no such method: {}", call.function));
    }

    match tool.dispatch(&call.function, &call.args, &call.kwargs) {
        Ok(value) => CallResult::ok(value),
        Err(e) => CallResult::err(e.to_string()),
    }
}

/// Handle to a running worker's isolation unit.
pub enum WorkerHandle {
    /// An OS child process.
    Process(Child),
    /// An in-process tokio task.
    Task(JoinHandle<()>),
}

impl WorkerHandle {
    /// Human-readable identity for log messages.
    pub fn describe(&self) -> String {
        match self {
            WorkerHandle::Process(child) => match child.id() {
                Some(pid) => format!("pid {pid}"),
                None => "exited process".to_string(),
            },
            WorkerHandle::Task(_) => "in-process task".to_string(),
        }
    }

    /// Wait for the worker to finish, up to `deadline`. Returns whether it
    /// terminated in time.
    pub async fn join(&mut self, deadline: Duration) -> bool {
        match self {
            WorkerHandle::Process(child) => {
                tokio::time::timeout(deadline, child.wait()).await.is_ok()
            }
            WorkerHandle::Task(task) => tokio::time::timeout(deadline, task).await.is_ok(),
        }
    }
}

/// A started worker that has not yet been handed to the supervisor.
pub struct PendingWorker {
    pub(crate) channel: IpcChannel,
    pub(crate) handle: WorkerHandle,
}

/// Spawn a worker child process for `config` using the `worker` subcommand
/// of the current executable. The child is killed if the handle is dropped
/// without a graceful stop.
pub fn spawn_process(config: &ToolConfig) -> Result<PendingWorker> {
    let exe = std::env::current_exe()?;

    let mut command = Command::new(exe);
    command
        .arg("worker")
        .arg("--name")
        .arg(&config.name)
        .arg("--kind")
        .arg(&config.kind);
    if !config.config.is_empty() {
        command
            .arg("--config")
            .arg(serde_json::to_string(&config.config)?);
    }

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AgentError::Internal("worker stdin not captured".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AgentError::Internal("worker stdout not captured".into()))?;

    Ok(PendingWorker {
        channel: channel(tokio::io::join(stdout, stdin)),
        handle: WorkerHandle::Process(child),
    })
}

/// Run a worker as an in-process task. The isolation is weaker than a child
/// process (a crashing tool aborts only its task) but the protocol and
/// serialisation guarantees are identical.
pub fn spawn_local(tool: Box<dyn Tool>) -> PendingWorker {
    let (host_io, worker_io) = tokio::io::duplex(64 * 1024);

    let task = tokio::spawn(async move {
        if let Err(e) = serve(tool, channel(worker_io)).await {
            tracing::error!("in-process worker failed: {e}");
        }
    });

    PendingWorker {
        channel: channel(host_io),
        handle: WorkerHandle::Task(task),
    }
}

/// Worker-side entry point for a child process: serve the tool over this
/// process's stdin/stdout. The binary's `worker` subcommand ends up here.
pub async fn run_stdio(tool: Box<dyn Tool>) -> Result<()> {
    serve(
        tool,
        channel(tokio::io::join(tokio::io::stdin(), tokio::io::stdout())),
    )
    .await
}
