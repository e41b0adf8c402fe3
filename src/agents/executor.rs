//! The prompt/dispatch state machine.

use crate::agents::hooks::{observe_call, observe_result, EventBus, TurnEvent, TurnObserver};
use crate::llm::ModelRegistry;
use crate::tools::ToolSupervisor;
use crate::types::{AgentError, CallResult, PromptResult, Result};
use std::sync::Arc;

/// Per-prompt options.
#[derive(Clone)]
pub struct PromptOptions {
    /// Whether proposed tool calls are executed automatically. When false,
    /// they are returned to the caller as JSON instead.
    pub auto_call: bool,
    /// Upper bound on prompt/dispatch rounds. `None` keeps iterating until
    /// the model answers with prose.
    pub max_rounds: Option<u32>,
    /// Best-effort observer of every tool call in this prompt.
    pub observer: Option<Arc<dyn TurnObserver>>,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            auto_call: true,
            max_rounds: None,
            observer: None,
        }
    }
}

impl PromptOptions {
    /// Execute proposed tool calls automatically (the default).
    pub fn auto() -> Self {
        Self::default()
    }

    /// Return proposed tool calls to the caller instead of executing them.
    pub fn manual() -> Self {
        Self {
            auto_call: false,
            ..Self::default()
        }
    }

    /// Cap the number of prompt/dispatch rounds.
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    /// Install a tool-call observer.
    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Drives one conversation turn: model prompts interleaved with tool
/// dispatches until the model produces a terminal textual answer.
pub struct AgentExecutor {
    registry: Arc<ModelRegistry>,
    supervisor: Arc<ToolSupervisor>,
    events: EventBus,
}

impl AgentExecutor {
    /// An executor over the given registry and supervisor.
    pub fn new(
        registry: Arc<ModelRegistry>,
        supervisor: Arc<ToolSupervisor>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            supervisor,
            events,
        }
    }

    /// Send `text` to the named model and run the loop to completion.
    ///
    /// Tool failures (including calls to unregistered tools) are folded
    /// into `CallResult` errors and fed back to the model; they never
    /// escape to the caller. Model failures do escape, without retry.
    pub async fn prompt(&self, model: &str, text: &str, options: &PromptOptions) -> Result<String> {
        let mut reply = self.registry.prompt(model, text).await?;
        let mut rounds: u32 = 0;

        loop {
            let calls = match reply {
                PromptResult::Text(answer) => {
                    self.events.publish(TurnEvent::TurnCompleted {
                        model: model.to_string(),
                        answer: answer.clone(),
                    });
                    return Ok(answer);
                }
                PromptResult::Calls(calls) => calls,
            };

            if !options.auto_call {
                return Ok(serde_json::to_string(&calls)?);
            }

            if let Some(max) = options.max_rounds {
                if rounds >= max {
                    return Err(AgentError::Internal(format!(
                        "model \"{model}\" still proposes calls after {max} tool rounds"
                    )));
                }
            }
            rounds += 1;

            // Calls run strictly in the order the model listed them, and
            // their results go back in that same order.
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                if let Some(observer) = &options.observer {
                    observe_call(observer.as_ref(), &call);
                }
                self.events.publish(TurnEvent::CallStarted {
                    model: model.to_string(),
                    call: call.clone(),
                });

                let result = match self
                    .supervisor
                    .call(&call.tool, &call.function, call.args.clone(), call.kwargs.clone())
                    .await
                {
                    Ok(value) => CallResult::ok(value),
                    Err(e) => CallResult::err(e.to_string()),
                };

                if let Some(observer) = &options.observer {
                    observe_result(observer.as_ref(), &call, &result);
                }
                self.events.publish(TurnEvent::CallFinished {
                    model: model.to_string(),
                    call,
                    result: result.clone(),
                });

                results.push(result);
            }

            let feedback = serde_json::to_string(&results)?;
            reply = self.registry.prompt(model, &feedback).await?;
        }
    }
}
