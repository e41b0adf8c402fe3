//! Worker lifecycle management and call routing.

use crate::tools::worker::{self, IpcChannel, PendingWorker, WorkerFrame, WorkerHandle};
use crate::types::{AgentError, Call, CallResult, Kwargs, Result, ToolInfo, ToolSpec};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};

/// How long `start` waits for a worker's ready signal. Tool setup may
/// block, but not past this.
const START_DEADLINE: Duration = Duration::from_secs(10);

/// How long `stop` waits for a worker to wind down before abandoning it.
const STOP_DEADLINE: Duration = Duration::from_secs(10);

/// How long a manifest query may take before the tool is reported without
/// specs.
const SPECS_DEADLINE: Duration = Duration::from_secs(10);

/// Upper bound on concurrently executing async calls.
const ASYNC_POOL_SIZE: usize = 16;

struct WorkerEntry {
    /// Guards the channel: at most one in-flight request per worker.
    channel: Mutex<IpcChannel>,
    handle: Mutex<WorkerHandle>,
}

/// Manages the fleet of tool workers: start/stop, manifest aggregation and
/// synchronous + asynchronous call dispatch.
///
/// The name map is only ever mutated by the orchestrator; readers take a
/// cheap snapshot of `Arc` entries, so a long-running call never holds the
/// map locked.
pub struct ToolSupervisor {
    workers: parking_lot::RwLock<Vec<(String, Arc<WorkerEntry>)>>,
    async_pool: Arc<Semaphore>,
}

impl Default for ToolSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSupervisor {
    /// A supervisor with no workers.
    pub fn new() -> Self {
        Self {
            workers: parking_lot::RwLock::new(Vec::new()),
            async_pool: Arc::new(Semaphore::new(ASYNC_POOL_SIZE)),
        }
    }

    /// The names of all running tools, in start order.
    pub fn names(&self) -> Vec<String> {
        self.workers
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn entry(&self, name: &str) -> Option<Arc<WorkerEntry>> {
        self.workers
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entry)| Arc::clone(entry))
    }

    /// Adopt a started worker under `name`, waiting for its ready signal.
    ///
    /// Fails with [`AgentError::AlreadyExists`] if the name is taken, and
    /// with the worker's startup error if it never becomes ready.
    pub async fn start(&self, name: &str, worker: PendingWorker) -> Result<()> {
        if self.entry(name).is_some() {
            return Err(AgentError::AlreadyExists(name.to_string()));
        }

        let PendingWorker {
            mut channel,
            handle,
        } = worker;

        let ready = tokio::time::timeout(START_DEADLINE, worker::recv(&mut channel))
            .await
            .map_err(|_| AgentError::Timeout(format!("tool \"{name}\" never became ready")))?;
        match ready? {
            Some(WorkerFrame::Ready) => {}
            Some(WorkerFrame::Result(result)) => {
                return Err(AgentError::Remote(
                    result.error.unwrap_or_else(|| "worker startup failed".into()),
                ));
            }
            _ => return Err(AgentError::ToolUnavailable(name.to_string())),
        }

        let entry = Arc::new(WorkerEntry {
            channel: Mutex::new(channel),
            handle: Mutex::new(handle),
        });

        let mut workers = self.workers.write();
        if workers.iter().any(|(n, _)| n == name) {
            return Err(AgentError::AlreadyExists(name.to_string()));
        }
        workers.push((name.to_string(), entry));

        tracing::info!("tool \"{name}\" started");

        Ok(())
    }

    /// Start several workers. The whole batch is rejected if any name is
    /// already taken (or duplicated within the batch); individual startup
    /// failures are logged and skipped.
    pub async fn start_many(&self, workers: Vec<(String, PendingWorker)>) -> Result<()> {
        let mut batch = std::collections::HashSet::new();
        for (name, _) in &workers {
            if self.entry(name).is_some() || !batch.insert(name.clone()) {
                return Err(AgentError::AlreadyExists(name.clone()));
            }
        }

        for (name, worker) in workers {
            if let Err(e) = self.start(&name, worker).await {
                tracing::error!("failed to start tool \"{name}\": {e}");
            }
        }

        Ok(())
    }

    /// Stop the named worker: signal it, wait up to ten seconds, then drop
    /// the entry either way. A worker that overruns the deadline is logged
    /// and abandoned (killed once the handle drops).
    pub async fn stop(&self, name: &str) -> Result<()> {
        let entry = {
            let mut workers = self.workers.write();
            let index = workers
                .iter()
                .position(|(n, _)| n == name)
                .ok_or_else(|| AgentError::NotFound(name.to_string()))?;
            workers.remove(index).1
        };

        {
            let mut channel = entry.channel.lock().await;
            if let Err(e) = worker::send(&mut channel, &WorkerFrame::Stop).await {
                tracing::debug!("stop signal for \"{name}\" not delivered: {e}");
            }
        }

        let mut handle = entry.handle.lock().await;
        if handle.join(STOP_DEADLINE).await {
            tracing::info!("tool \"{name}\" stopped");
        } else {
            tracing::warn!(
                "tried to stop tool \"{name}\" ({}) but it is still alive",
                handle.describe()
            );
        }

        Ok(())
    }

    /// Stop several workers. The whole batch is rejected if any name is
    /// unknown; individual overruns are logged as in [`ToolSupervisor::stop`].
    pub async fn stop_many(&self, names: &[String]) -> Result<()> {
        for name in names {
            if self.entry(name).is_none() {
                return Err(AgentError::NotFound(name.clone()));
            }
        }

        for name in names {
            if let Err(e) = self.stop(name).await {
                tracing::error!("failed to stop tool \"{name}\": {e}");
            }
        }

        Ok(())
    }

    /// The manifest of every running tool, in start order.
    ///
    /// Queries run concurrently; a tool that fails to answer is reported
    /// with empty specs rather than blocking the rest.
    pub async fn tools(&self) -> Vec<ToolInfo> {
        let snapshot: Vec<(String, Arc<WorkerEntry>)> = self
            .workers
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), Arc::clone(entry)))
            .collect();

        let queries = snapshot.into_iter().map(|(name, entry)| async move {
            let specs = match tokio::time::timeout(SPECS_DEADLINE, query_specs(&entry)).await {
                Ok(Ok(specs)) => specs,
                Ok(Err(e)) => {
                    tracing::error!("failed to fetch specs for tool \"{name}\": {e}");
                    Vec::new()
                }
                Err(_) => {
                    tracing::error!("specs query for tool \"{name}\" timed out");
                    Vec::new()
                }
            };
            ToolInfo { name, specs }
        });

        join_all(queries).await
    }

    /// Call `function` on the named tool and wait for its result.
    ///
    /// Fails with [`AgentError::NotFound`] for unknown tools,
    /// [`AgentError::ToolUnavailable`] when the worker or its channel is
    /// gone, and [`AgentError::Remote`] carrying the worker's trace when the
    /// tool itself failed.
    pub async fn call(
        &self,
        tool: &str,
        function: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Value> {
        let entry = self
            .entry(tool)
            .ok_or_else(|| AgentError::NotFound(tool.to_string()))?;

        let result = exchange(
            &entry,
            Call {
                function: function.to_string(),
                args: args.clone(),
                kwargs: kwargs.clone(),
            },
        )
        .await
        .map_err(|_| AgentError::ToolUnavailable(tool.to_string()))?;

        if result.is_error() {
            return Err(AgentError::Remote(format!(
                "error when calling {tool}:\n\
                 > function: {function}\n\
                 > args: {}\n\
                 > kwargs: {}\n\
                 error message:\n{}",
                serde_json::to_string(&args).unwrap_or_default(),
                serde_json::to_string(&kwargs).unwrap_or_default(),
                result.error.unwrap_or_default()
            )));
        }

        Ok(result.result.unwrap_or(Value::Null))
    }

    /// Start `call` on a bounded background pool and return a handle to its
    /// outcome. The per-worker single-request invariant holds: the pool
    /// only bounds host-side concurrency, the worker channel still serves
    /// one request at a time.
    pub fn call_async(
        self: &Arc<Self>,
        tool: &str,
        function: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> AsyncToolCall {
        let supervisor = Arc::clone(self);
        let pool = Arc::clone(&self.async_pool);
        let tool = tool.to_string();
        let function = function.to_string();

        AsyncToolCall {
            task: tokio::spawn(async move {
                let _permit = pool
                    .acquire_owned()
                    .await
                    .map_err(|_| AgentError::Internal("async pool closed".into()))?;
                supervisor.call(&tool, &function, args, kwargs).await
            }),
        }
    }
}

/// One round trip on a worker channel, holding the per-worker lock for the
/// whole exchange.
async fn exchange(entry: &WorkerEntry, call: Call) -> Result<CallResult> {
    let mut channel = entry.channel.lock().await;
    worker::send(&mut channel, &WorkerFrame::Call(call)).await?;
    loop {
        match worker::recv(&mut channel).await? {
            Some(WorkerFrame::Result(result)) => return Ok(result.normalized()),
            Some(_) => continue,
            None => {
                return Err(AgentError::Internal("worker channel closed".into()));
            }
        }
    }
}

async fn query_specs(entry: &WorkerEntry) -> Result<Vec<ToolSpec>> {
    let result = exchange(entry, Call::bare("specs")).await?;
    if result.is_error() {
        return Err(AgentError::Remote(result.error.unwrap_or_default()));
    }
    match result.result {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(Vec::new()),
    }
}

/// Handle to an asynchronous tool call.
pub struct AsyncToolCall {
    task: tokio::task::JoinHandle<Result<Value>>,
}

impl AsyncToolCall {
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
