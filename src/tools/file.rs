//! Built-in file manipulation tool.

use crate::tools::spec::SpecBuilder;
use crate::tools::tool::{CallArgs, Tool};
use crate::types::{AgentError, Kwargs, Result, ToolSpec};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::Path;

/// Create, modify and delete files on the worker's filesystem.
#[derive(Debug)]
pub struct FileTool;

impl FileTool {
    /// The tool takes no settings; `config` is accepted for uniformity with
    /// the builder registry.
    pub fn new(_config: &Map<String, Value>) -> Self {
        Self
    }

    fn create(&self, filename: &str, content: &str, exist_ok: bool) -> Result<Value> {
        let path = Path::new(filename);
        if path.exists() && !exist_ok {
            return Err(AgentError::AlreadyExists(filename.to_string()));
        }

        if content.is_empty() {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
        } else {
            std::fs::write(path, content)?;
        }

        Ok(json!(filename))
    }

    fn modify(&self, filename: &str, content: &str, append: bool) -> Result<Value> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(append)
            .write(true)
            .truncate(!append)
            .open(filename)?;
        file.write_all(content.as_bytes())?;

        Ok(json!(filename))
    }

    fn delete(&self, filename: &str) -> Result<Value> {
        match std::fs::remove_file(filename) {
            Ok(()) => Ok(json!(filename)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(json!(filename)),
            Err(e) => Err(e.into()),
        }
    }
}

impl Tool for FileTool {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![
            SpecBuilder::new("create", "Create a file at the given path, optionally writing content to it")
                .param("filename", "str", "The full path where the file should be created")
                .optional_param("content", "str", "Text content to write to the file; empty by default")
                .optional_param("exist_ok", "bool", "If true, an existing file is not an error; true by default")
                .returns("str", "The path of the created file")
                .raises("AlreadyExists", "If the file exists and exist_ok is false")
                .build(),
            SpecBuilder::new("modify", "Modify a file by appending or overwriting content")
                .param("filename", "str", "The full path of the file to modify")
                .param("content", "str", "The content to write into the file")
                .optional_param("append", "bool", "If true, content is appended; if false, the file is overwritten; true by default")
                .returns("str", "The path of the modified file")
                .build(),
            SpecBuilder::new("delete", "Delete the file at the given path; missing files are ignored")
                .param("filename", "str", "The full path of the file to delete")
                .returns("str", "The path of the deleted file")
                .build(),
        ]
    }

    fn dispatch(&mut self, function: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
        let view = CallArgs::new(args, kwargs);
        match function {
            "create" => self.create(
                view.required_str(0, "filename")?,
                view.str_or(1, "content", "")?,
                view.bool_or(2, "exist_ok", true)?,
            ),
            "modify" => self.modify(
                view.required_str(0, "filename")?,
                view.required_str(1, "content")?,
                view.bool_or(2, "append", true)?,
            ),
            "delete" => self.delete(view.required_str(0, "filename")?),
            other => Err(AgentError::NoSuchMethod(other.to_string())),
        }
    }
}
