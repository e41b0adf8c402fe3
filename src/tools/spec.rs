//! Tool manifest construction.
//!
//! Tools announce their callable surface as a list of [`ToolSpec`] values,
//! built explicitly at construction time. The manifest is derived once per
//! worker lifetime and never changes afterwards; models consume it as
//! documentation when deciding which calls to propose.

use crate::types::{AgentError, Result, ToolParam, ToolRaise, ToolReturns, ToolSpec};

/// Method names every tool implements for its own lifecycle. These never
/// appear in a manifest and cannot be dispatched remotely.
pub const RESERVED_METHODS: [&str; 4] = ["config", "specs", "setup", "teardown"];

/// Whether `name` is reserved for the tool lifecycle.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_METHODS.contains(&name)
}

/// Fluent builder for one method spec.
///
/// ```
/// use relay::tools::SpecBuilder;
///
/// let spec = SpecBuilder::new("create", "Create a file at the given path")
///     .param("filename", "str", "The full path where the file should be created")
///     .optional_param("content", "str", "Text content to write to the file")
///     .returns("str", "The path of the created file")
///     .raises("AlreadyExists", "If the file exists and exist_ok is false")
///     .build();
///
/// assert_eq!(spec.name, "create");
/// assert_eq!(spec.params.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    name: String,
    description: String,
    params: Vec<ToolParam>,
    returns: Option<ToolReturns>,
    raises: Vec<ToolRaise>,
}

impl SpecBuilder {
    /// Start a spec for the method `name`.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            returns: None,
            raises: Vec::new(),
        }
    }

    /// Add a required parameter. `kind` is an advisory type label.
    pub fn param(
        mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            optional: false,
        });
        self
    }

    /// Add an optional parameter.
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ToolParam {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            optional: true,
        });
        self
    }

    /// Describe the return value.
    pub fn returns(mut self, kind: impl Into<String>, description: impl Into<String>) -> Self {
        self.returns = Some(ToolReturns {
            kind: kind.into(),
            description: description.into(),
        });
        self
    }

    /// Add a failure mode.
    pub fn raises(mut self, kind: impl Into<String>, description: impl Into<String>) -> Self {
        self.raises.push(ToolRaise {
            kind: kind.into(),
            description: description.into(),
        });
        self
    }

    /// Finish the spec.
    pub fn build(self) -> ToolSpec {
        ToolSpec {
            name: self.name,
            description: self.description,
            params: self.params,
            returns: self.returns,
            raises: self.raises,
        }
    }
}

/// Check a manifest before a worker starts serving it: every entry must be
/// uniquely named, publicly callable (no leading underscore) and not
/// reserved.
pub fn validate_manifest(specs: &[ToolSpec]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for spec in specs {
        if is_reserved(&spec.name) {
            return Err(AgentError::InvalidInput(format!(
                "manifest entry \"{}\" shadows a reserved method",
                spec.name
            )));
        }
        if spec.name.starts_with('_') {
            return Err(AgentError::InvalidInput(format!(
                "manifest entry \"{}\" is not a public method",
                spec.name
            )));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(AgentError::InvalidInput(format!(
                "manifest entry \"{}\" is duplicated",
                spec.name
            )));
        }
    }
    Ok(())
}
