//! Built-in arithmetic evaluation tool.

use crate::tools::spec::SpecBuilder;
use crate::tools::tool::{CallArgs, Tool};
use crate::types::{AgentError, Kwargs, Result, ToolSpec};
use serde_json::{json, Map, Value};

/// Evaluate arithmetic expressions without handing the model a code
/// interpreter: `+`, `-`, `*`, `/`, parentheses and unary minus over
/// floating-point numbers.
#[derive(Debug)]
pub struct CalcTool;

impl CalcTool {
    /// The tool takes no settings; `config` is accepted for uniformity with
    /// the builder registry.
    pub fn new(_config: &Map<String, Value>) -> Self {
        Self
    }
}

impl Tool for CalcTool {
    fn specs(&self) -> Vec<ToolSpec> {
        vec![SpecBuilder::new(
            "evaluate",
            "Evaluate an arithmetic expression with +, -, *, / and parentheses",
        )
        .param("expression", "str", "The expression to evaluate, e.g. \"2 + 2 * 3\"")
        .returns("number", "The value of the expression")
        .raises("InvalidInput", "If the expression cannot be parsed")
        .build()]
    }

    fn dispatch(&mut self, function: &str, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
        let view = CallArgs::new(args, kwargs);
        match function {
            "evaluate" => {
                let expression = view.required_str(0, "expression")?;
                let value = evaluate(expression)?;
                Ok(json!(value))
            }
            other => Err(AgentError::NoSuchMethod(other.to_string())),
        }
    }
}

/// Evaluate `expression`, honouring standard precedence.
pub fn evaluate(expression: &str) -> Result<f64> {
    let mut parser = Parser {
        chars: expression.chars().collect(),
        pos: 0,
        source: expression,
    };
    let value = parser.expr()?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(parser.fail("trailing input"));
    }
    Ok(value)
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn fail(&self, reason: &str) -> AgentError {
        AgentError::InvalidInput(format!(
            "cannot evaluate \"{}\": {} at offset {}",
            self.source, reason, self.pos
        ))
    }

    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                '+' => {
                    self.pos += 1;
                    value += self.term()?;
                }
                '-' => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                '*' => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                '/' => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(self.fail("division by zero"));
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(')') {
                    return Err(self.fail("expected ')'"));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(_) => Err(self.fail("unexpected character")),
            None => Err(self.fail("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_ascii_digit() || *c == '.')
        {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| self.fail("malformed number"))
    }
}
