//! Shared test doubles.
#![allow(dead_code)]

use async_trait::async_trait;
use relay::tools::{SpecBuilder, Tool};
use relay::types::{AgentError, Kwargs, Message, PromptResult, Result, ToolSpec};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A model driver that replays a fixed script of replies and records every
/// prompt it receives.
pub struct ScriptedDriver {
    replies: VecDeque<PromptResult>,
    prompts: Arc<Mutex<Vec<String>>>,
    history: Vec<Message>,
}

impl ScriptedDriver {
    pub fn new(replies: Vec<PromptResult>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                replies: replies.into(),
                prompts: Arc::clone(&prompts),
                history: Vec::new(),
            },
            prompts,
        )
    }
}

#[async_trait]
impl relay::ModelDriver for ScriptedDriver {
    async fn prompt(&mut self, text: &str) -> Result<PromptResult> {
        self.prompts.lock().unwrap().push(text.to_string());
        self.replies
            .pop_front()
            .ok_or_else(|| AgentError::Internal("scripted driver exhausted".into()))
    }

    fn history(&self) -> &[Message] {
        &self.history
    }

    fn reset(&mut self) {}
}

/// A tool that proves per-worker serialisation: `work` records how many
/// invocations overlap, and `explode` kills the worker.
#[derive(Debug)]
pub struct ProbeTool {
    pub active: Arc<AtomicUsize>,
    pub max_seen: Arc<AtomicUsize>,
}

impl ProbeTool {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let max_seen = Arc::new(AtomicUsize::new(0));
        (
            Self {
                active: Arc::new(AtomicUsize::new(0)),
                max_seen: Arc::clone(&max_seen),
            },
            max_seen,
        )
    }
}

impl Tool for ProbeTool {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            SpecBuilder::new("work", "Busy-wait briefly and return the call ordinal")
                .returns("int", "How many calls have completed before this one")
                .build(),
            SpecBuilder::new("explode", "Abort the hosting worker").build(),
        ]
    }

    fn dispatch(&mut self, function: &str, _args: &[Value], _kwargs: &Kwargs) -> Result<Value> {
        match function {
            "work" => {
                let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now_active, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(25));
                let done = self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(serde_json::json!(done))
            }
            "explode" => panic!("tool exploded"),
            other => Err(AgentError::NoSuchMethod(other.to_string())),
        }
    }
}
