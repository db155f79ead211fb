// Parameter Resolver
// Evaluates path expressions against the namespace visible to a step

pub mod path;

pub use path::{PathExpr, PathSegment, PathSyntaxError};

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

/// Root key under which a hunt's initial parameters are exposed
pub const INITIAL_ROOT: &str = "initial";

/// Values visible to one step: `initial` plus the outputs of its finished dependencies
pub type Namespace = Map<String, Value>;

/// Failure to resolve a path expression at run time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Syntax(#[from] PathSyntaxError),

    #[error("cannot resolve '{path}': '{root}' is not available to this step")]
    UnknownRoot { path: String, root: String },

    #[error("cannot resolve '{path}': key '{key}' does not exist")]
    MissingKey { path: String, key: String },

    #[error("cannot resolve '{path}': index {index} is out of range (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("cannot resolve '{path}': expected {expected} but found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Resolves path expressions against a namespace
///
/// Resolution is pure: the namespace is only borrowed and results are cloned out.
pub struct ParameterResolver<'a> {
    namespace: &'a Namespace,
}

impl<'a> ParameterResolver<'a> {
    pub fn new(namespace: &'a Namespace) -> Self {
        Self { namespace }
    }

    /// Parse and resolve a single path expression
    pub fn resolve(&self, path: &str) -> Result<Value, ResolutionError> {
        let expr = PathExpr::parse(path)?;
        self.resolve_path(&expr)
    }

    /// Resolve an already-parsed path expression
    pub fn resolve_path(&self, expr: &PathExpr) -> Result<Value, ResolutionError> {
        let path = expr.to_string();
        let mut current =
            self.namespace
                .get(expr.root())
                .ok_or_else(|| ResolutionError::UnknownRoot {
                    path: path.clone(),
                    root: expr.root().to_string(),
                })?;

        for segment in expr.segments() {
            current = match segment {
                PathSegment::Key(key) => match current {
                    Value::Object(map) => {
                        map.get(key).ok_or_else(|| ResolutionError::MissingKey {
                            path: path.clone(),
                            key: key.clone(),
                        })?
                    }
                    other => {
                        return Err(ResolutionError::TypeMismatch {
                            path,
                            expected: "an object",
                            found: value_kind(other),
                        })
                    }
                },
                PathSegment::Index(index) => match current {
                    Value::Array(items) => {
                        items
                            .get(*index)
                            .ok_or_else(|| ResolutionError::IndexOutOfRange {
                                path: path.clone(),
                                index: *index,
                                len: items.len(),
                            })?
                    }
                    other => {
                        return Err(ResolutionError::TypeMismatch {
                            path,
                            expected: "an array",
                            found: value_kind(other),
                        })
                    }
                },
            };
        }

        Ok(current.clone())
    }

    /// Resolve every entry of a parameter mapping (plugin parameter -> path)
    ///
    /// Stops at the first entry that cannot be resolved.
    pub fn resolve_mapping(
        &self,
        mapping: &BTreeMap<String, String>,
    ) -> Result<Map<String, Value>, ResolutionError> {
        let mut resolved = Map::new();
        for (parameter, path) in mapping {
            resolved.insert(parameter.clone(), self.resolve(path)?);
        }
        Ok(resolved)
    }
}

/// Human-readable JSON type name used in error messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
