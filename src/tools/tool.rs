//! The core tool trait and builder registry.

use crate::types::{AgentError, Kwargs, Result, ToolSpec};
use serde_json::{Map, Value};

/// A user-supplied effector hosted by a worker.
///
/// A tool exposes a set of public methods through [`Tool::dispatch`] and
/// announces them through [`Tool::specs`]. Lifecycle methods (`setup`,
/// `teardown`) and the manifest itself are reserved and never dispatched.
///
/// Implementations are single-threaded by construction: the hosting worker
/// serves one call at a time, so `dispatch` takes `&mut self` and may keep
/// whatever internal state it wants without synchronisation.
pub trait Tool: Send + std::fmt::Debug {
    /// The manifest of every public method this tool exposes. Called once
    /// at worker start; must be stable for the worker's lifetime.
    fn specs(&self) -> Vec<ToolSpec>;

    /// One-time initialisation before the worker starts serving calls.
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Final cleanup when the worker stops. Must not fail.
    fn teardown(&mut self) {}

    /// Invoke the named method. Unknown names fail with
    /// [`AgentError::NoSuchMethod`].
    fn dispatch(&mut self, function: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value>;
}

/// Instantiate a built-in tool by config kind.
///
/// The counterpart of dynamic class loading in reflective runtimes: tool
/// configs carry a `kind` string and this registry maps it to a
/// constructor. External (non-built-in) tools run their own worker binary
/// instead and never pass through here.
pub fn build_tool(kind: &str, config: &Map<String, Value>) -> Result<Box<dyn Tool>> {
    match kind {
        "file" => Ok(Box::new(super::file::FileTool::new(config))),
        "calc" => Ok(Box::new(super::calc::CalcTool::new(config))),
        other => Err(AgentError::Config(format!(
            "unknown tool kind \"{other}\""
        ))),
    }
}

/// View over one call's arguments that resolves parameters by position or
/// by name, the way callers are allowed to pass them.
#[derive(Debug, Clone, Copy)]
pub struct CallArgs<'a> {
    args: &'a [Value],
    kwargs: &'a Kwargs,
}

impl<'a> CallArgs<'a> {
    /// Wrap the argument lists of one call.
    pub fn new(args: &'a [Value], kwargs: &'a Kwargs) -> Self {
        Self { args, kwargs }
    }

    /// The raw value at `index`, or under `name`, if present.
    pub fn get(&self, index: usize, name: &str) -> Option<&'a Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }

    /// A required parameter; missing is an input error.
    pub fn required(&self, index: usize, name: &str) -> Result<&'a Value> {
        self.get(index, name)
            .ok_or_else(|| AgentError::InvalidInput(format!("missing parameter \"{name}\"")))
    }

    /// A required string parameter.
    pub fn required_str(&self, index: usize, name: &str) -> Result<&'a str> {
        self.required(index, name)?.as_str().ok_or_else(|| {
            AgentError::InvalidInput(format!("parameter \"{name}\" must be a string"))
        })
    }

    /// An optional string parameter with a default.
    pub fn str_or(&self, index: usize, name: &str, default: &'a str) -> Result<&'a str> {
        match self.get(index, name) {
            None => Ok(default),
            Some(value) => value.as_str().ok_or_else(|| {
                AgentError::InvalidInput(format!("parameter \"{name}\" must be a string"))
            }),
        }
    }

    /// An optional boolean parameter with a default.
    pub fn bool_or(&self, index: usize, name: &str, default: bool) -> Result<bool> {
        match self.get(index, name) {
            None => Ok(default),
            Some(value) => value.as_bool().ok_or_else(|| {
                AgentError::InvalidInput(format!("parameter \"{name}\" must be a boolean"))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn args_resolve_by_position_then_name() {
        let args = vec![json!("/tmp/x")];
        let mut kwargs = Kwargs::new();
        kwargs.insert("content".into(), json!("abc"));
        kwargs.insert("exist_ok".into(), json!(false));

        let view = CallArgs::new(&args, &kwargs);
        assert_eq!(view.required_str(0, "filename").unwrap(), "/tmp/x");
        assert_eq!(view.str_or(1, "content", "").unwrap(), "abc");
        assert!(!view.bool_or(2, "exist_ok", true).unwrap());
        assert_eq!(view.str_or(3, "missing", "fallback").unwrap(), "fallback");
    }

    #[test]
    fn missing_required_parameter_is_input_error() {
        let args = Vec::new();
        let kwargs = Kwargs::new();
        let view = CallArgs::new(&args, &kwargs);
        let err = view.required_str(0, "filename").unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[test]
    fn unknown_kind_is_config_error() {
        let err = build_tool("nonexistent", &Map::new()).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn builtin_kinds_build() {
        assert!(build_tool("file", &Map::new()).is_ok());
        assert!(build_tool("calc", &Map::new()).is_ok());
    }
}
