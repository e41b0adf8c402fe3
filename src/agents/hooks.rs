//! Turn observers and the event bus.
//!
//! Observers are strictly best-effort: a panicking observer is caught,
//! logged and forgotten, and the conversation proceeds as if it were not
//! installed. For decoupled consumers (UIs, loggers) the runtime also
//! publishes immutable [`TurnEvent`] snapshots on a bounded broadcast
//! channel; a slow subscriber loses old events instead of blocking the
//! loop.

use crate::types::{CallResult, ToolCall};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::broadcast;

/// Caller-supplied observer of tool activity within a prompt.
///
/// Both methods default to no-ops so implementations override only what
/// they watch.
pub trait TurnObserver: Send + Sync {
    /// Invoked immediately before a tool call is dispatched.
    fn on_call(&self, call: &ToolCall) {
        let _ = call;
    }

    /// Invoked immediately after a tool call returned.
    fn on_result(&self, call: &ToolCall, result: &CallResult) {
        let _ = (call, result);
    }
}

pub(crate) fn observe_call(observer: &dyn TurnObserver, call: &ToolCall) {
    if catch_unwind(AssertUnwindSafe(|| observer.on_call(call))).is_err() {
        tracing::error!(
            "on_call hook panicked for {}.{}; ignoring",
            call.tool,
            call.function
        );
    }
}

pub(crate) fn observe_result(observer: &dyn TurnObserver, call: &ToolCall, result: &CallResult) {
    if catch_unwind(AssertUnwindSafe(|| observer.on_result(call, result))).is_err() {
        tracing::error!(
            "on_result hook panicked for {}.{}; ignoring",
            call.tool,
            call.function
        );
    }
}

/// One immutable snapshot of loop activity.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// A tool call is about to be dispatched.
    CallStarted {
        /// The model whose reply proposed the call.
        model: String,
        /// The call as proposed.
        call: ToolCall,
    },
    /// A tool call returned.
    CallFinished {
        /// The model whose reply proposed the call.
        model: String,
        /// The call as proposed.
        call: ToolCall,
        /// Its outcome.
        result: CallResult,
    },
    /// The loop produced a terminal answer.
    TurnCompleted {
        /// The model that answered.
        model: String,
        /// The final prose answer.
        answer: String,
    },
}

/// Bounded broadcast channel of [`TurnEvent`] snapshots.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TurnEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EventBus {
    /// A bus retaining up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published after this point.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Without subscribers this is a no-op.
    pub fn publish(&self, event: TurnEvent) {
        let _ = self.sender.send(event);
    }
}
