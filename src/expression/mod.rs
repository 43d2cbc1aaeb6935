//! Sandboxed snippets used by defaults, mappers and reducers.
//!
//! A snippet is an optional arrow header followed by a body:
//!
//! * `v => v / 1000000` is a one argument function (mapper)
//! * `(acc, v) => acc + v` is a two argument function (reducer)
//! * `() => now` is a computed value, evaluated on every call
//! * `"default-value"` is a plain value
//!
//! Bodies are compiled by an [`Engine`]. The bundled [`CelEngine`] runs them
//! with a Common Expression Language interpreter, so configuration never
//! executes host code. The variable `now` (epoch milliseconds) is always in scope.

use std::fmt;
use std::sync::Arc;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ConfigError, EvaluationError};

pub use cel::CelEngine;

mod cel;

/// Variables shared by every snippet call of a single reporting event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    now_millis: i64,
}

impl Scope {
    pub fn new(now_millis: i64) -> Self {
        Self { now_millis }
    }

    pub fn now_millis(&self) -> i64 {
        self.now_millis
    }
}

/// Compiled snippet body
///
/// Receives named arguments already bound by the [`Expression`] calling it.
pub trait Evaluator: fmt::Debug + Send + Sync {
    fn evaluate(
        &self,
        bindings: &[(&str, &Value)],
        scope: &Scope,
    ) -> Result<Value, EvaluationError>;
}

/// Compiles snippet bodies into evaluators
pub trait Engine {
    fn compile(&self, body: &str) -> Result<Arc<dyn Evaluator>, String>;
}

/// How a snippet consumes arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    /// Snippet without an arrow header
    Value,
    /// Snippet with an arrow header, listing parameter names
    Function(Vec<String>),
}

/// Snippet ready to be called
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    signature: Signature,
    evaluator: Arc<dyn Evaluator>,
}

impl Expression {
    /// Compiles a snippet with the bundled [`CelEngine`]
    ///
    /// ```rust
    /// use profusion_influx::expression::{Expression, Scope};
    /// use serde_json::json;
    ///
    /// let mapper = Expression::compile("v => v * 2").unwrap();
    /// assert_eq!(mapper.arity(), Some(1));
    /// assert_eq!(mapper.call(&[json!(21)], &Scope::new(0)).unwrap(), json!(42));
    /// ```
    pub fn compile(source: &str) -> Result<Self, ConfigError> {
        Self::compile_with(source, &CelEngine)
    }

    /// Compiles a snippet with a custom engine
    pub fn compile_with<E: Engine>(source: &str, engine: &E) -> Result<Self, ConfigError> {
        let (signature, body) = split_arrow(source);

        let evaluator = engine
            .compile(body)
            .map_err(|reason| ConfigError::InvalidExpression {
                source_text: source.to_owned(),
                reason,
            })?;

        Ok(Self {
            source: source.to_owned(),
            signature,
            evaluator,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of declared parameters, `None` for plain values
    pub fn arity(&self) -> Option<usize> {
        match &self.signature {
            Signature::Value => None,
            Signature::Function(params) => Some(params.len()),
        }
    }

    /// Evaluates the snippet, binding `args` to declared parameters
    ///
    /// Plain values and zero argument functions are both evaluated when
    /// called without arguments.
    pub fn call(&self, args: &[Value], scope: &Scope) -> Result<Value, EvaluationError> {
        let params: &[String] = match &self.signature {
            Signature::Value => &[],
            Signature::Function(params) => params,
        };

        if params.len() != args.len() {
            return Err(EvaluationError::Arity {
                source_text: self.source.clone(),
                expected: params.len(),
                actual: args.len(),
            });
        }

        let bindings = params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect::<Vec<_>>();

        self.evaluator.evaluate(&bindings, scope)
    }
}

fn split_arrow(source: &str) -> (Signature, &str) {
    let Some((head, body)) = source.split_once("=>") else {
        return (Signature::Value, source.trim());
    };

    let head = head.trim();
    let params = match head.strip_prefix('(').and_then(|head| head.strip_suffix(')')) {
        Some(inner) if inner.trim().is_empty() => Vec::new(),
        Some(inner) => inner.split(',').map(str::trim).collect(),
        None => vec![head],
    };

    if !params.iter().all(|param| is_identifier(param)) {
        return (Signature::Value, source.trim());
    }

    (
        Signature::Function(params.into_iter().map(str::to_owned).collect()),
        body.trim(),
    )
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Expression {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let source = String::deserialize(deserializer)?;
        Self::compile(&source).map_err(D::Error::custom)
    }
}
