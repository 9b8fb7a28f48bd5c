//! Per-node evaluation errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category of an evaluation error, serialized with its wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvalErrorKind {
    /// The node sits on a dependency cycle.
    #[serde(rename = "CYCLICAL_DEPENDENCY_ERROR")]
    CyclicalDependency,
    /// The expression raised while running.
    #[serde(rename = "EVAL_ERROR")]
    Evaluation,
    /// A trigger-only builtin was called from a binding.
    #[serde(rename = "ACTION_CALLED_IN_SYNC_FIELD")]
    ActionCalledInSyncField,
    /// The expression did not parse.
    #[serde(rename = "PARSE_JS_ERROR")]
    Parse,
    /// A trigger raised while running.
    #[serde(rename = "EVAL_TRIGGER_ERROR")]
    Trigger,
    /// A response could not be serialized.
    #[serde(rename = "CLONE_ERROR")]
    Clone,
    /// Anything else.
    #[serde(rename = "UNKNOWN_ERROR")]
    Unknown,
}

/// An error attached to a property path or request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalError {
    /// Error category.
    #[serde(rename = "type")]
    pub kind: EvalErrorKind,
    /// Human-readable message.
    pub message: String,
    /// `Entity.property` path, when the error belongs to a node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Extra data, such as the request that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl EvalError {
    /// An error with no path or context.
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            context: None,
        }
    }

    /// Attach a property path.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach context data.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// The error raised for every node on a cycle.
    pub fn cycle(path: &str) -> Self {
        Self::new(
            EvalErrorKind::CyclicalDependency,
            format!("Cyclic dependency found while evaluating {path}"),
        )
        .at(path)
    }
}
