//! Wire types exchanged with the evaluation worker.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::eval::{DataTree, EvalError, EvalErrorKind, TreeDiff};

/// Request fields dropped from error context because they hold whole trees.
const BULKY_FIELDS: &[&str] = &["unevalTree", "dataTree", "widgets"];

/// A request: `{ method, requestData, requestId }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRequest {
    /// Id echoed in the response.
    pub request_id: String,
    /// Method and its data.
    #[serde(flatten)]
    pub body: RequestBody,
}

impl WorkerRequest {
    /// Construct a request.
    pub fn new(request_id: impl Into<String>, body: RequestBody) -> Self {
        Self {
            request_id: request_id.into(),
            body,
        }
    }

    /// The request as JSON with tree payloads removed, for error context.
    pub fn summary(&self) -> Value {
        let mut v = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(Value::Object(data)) = v.get_mut("requestData") {
            for f in BULKY_FIELDS {
                data.remove(*f);
            }
        }
        v
    }
}

/// Worker methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "method",
    content = "requestData",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum RequestBody {
    /// Prepare the evaluation environment.
    Setup,
    /// Evaluate a new unevaluated tree.
    EvalTree(EvalTreeRequest),
    /// Run a trigger.
    EvalTrigger(EvalTriggerRequest),
    /// Evaluate action parameter bindings.
    EvalActionBindings(ActionBindingsRequest),
    /// Drop the evaluator; the next tree is a full rebuild.
    ClearCache,
    /// Step a replay entity back.
    Undo(ReplayRequest),
    /// Step a replay entity forward.
    Redo(ReplayRequest),
    /// Record the evaluation version.
    SetEvaluationVersion(VersionRequest),
    /// Evaluate one expression against the current tree.
    EvalExpression(ExpressionRequest),
    /// Record a snapshot of an editor entity.
    UpdateReplayObject(ReplayObjectRequest),
}

impl RequestBody {
    /// Wire name of the method.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::EvalTree(_) => "EVAL_TREE",
            Self::EvalTrigger(_) => "EVAL_TRIGGER",
            Self::EvalActionBindings(_) => "EVAL_ACTION_BINDINGS",
            Self::ClearCache => "CLEAR_CACHE",
            Self::Undo(_) => "UNDO",
            Self::Redo(_) => "REDO",
            Self::SetEvaluationVersion(_) => "SET_EVALUATION_VERSION",
            Self::EvalExpression(_) => "EVAL_EXPRESSION",
            Self::UpdateReplayObject(_) => "UPDATE_REPLAY_OBJECT",
        }
    }
}

/// Default for `shouldReplay`.
fn yes() -> bool {
    true
}

/// `EVAL_TREE` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalTreeRequest {
    /// Tree to evaluate.
    pub uneval_tree: DataTree,
    /// Canvas widgets, recorded for undo.
    #[serde(default)]
    pub widgets: Value,
    /// Theme, recorded for undo alongside the widgets.
    #[serde(default)]
    pub theme: Value,
    /// Record the canvas snapshot.
    #[serde(default = "yes")]
    pub should_replay: bool,
}

/// `EVAL_TRIGGER` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalTriggerRequest {
    /// Tree to bring the evaluator up to date with first.
    pub data_tree: DataTree,
    /// Trigger code.
    pub dynamic_trigger: String,
    /// Values bound to `arguments`.
    #[serde(default)]
    pub callback_data: Vec<Value>,
    /// Extra names in scope.
    #[serde(default)]
    pub global_context: Map<String, Value>,
}

/// `EVAL_ACTION_BINDINGS` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBindingsRequest {
    /// Binding strings.
    pub bindings: Vec<String>,
    /// Bound to `executionParams`.
    #[serde(default)]
    pub execution_params: Value,
}

/// `UNDO` and `REDO` data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    /// Replay entity, the canvas when absent.
    #[serde(default)]
    pub entity_id: Option<String>,
}

/// `SET_EVALUATION_VERSION` data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRequest {
    /// Version, 1 when absent.
    #[serde(default)]
    pub version: Option<u32>,
}

/// `EVAL_EXPRESSION` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionRequest {
    /// Expression or template.
    pub expression: String,
    /// Run as a trigger, collecting actions.
    #[serde(default)]
    pub is_trigger: bool,
}

/// `UPDATE_REPLAY_OBJECT` data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayObjectRequest {
    /// Snapshot.
    pub entity: Value,
    /// Replay entity id.
    pub entity_id: String,
    /// Entity type, echoed in replay results.
    pub entity_type: String,
}

/// `EVAL_TREE` response data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalTreeResponse {
    /// Evaluated tree.
    pub data_tree: DataTree,
    /// Path to the paths that depend on it.
    pub dependencies: BTreeMap<String, Vec<String>>,
    /// Errors raised in the pass.
    pub errors: Vec<EvalError>,
    /// Paths evaluated, in order.
    pub evaluation_order: Vec<String>,
    /// Changes since the previous tree.
    pub un_eval_updates: Vec<TreeDiff>,
    /// JS object updates. Always empty.
    pub js_updates: Map<String, Value>,
    /// Widget meta updates. Always empty.
    pub eval_meta_updates: Vec<Value>,
    /// True if the pass rebuilt the graph.
    pub is_create_first_tree: bool,
}

/// A response: `{ requestId, responseData, timeTaken }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResponse {
    /// Id of the request answered.
    pub request_id: String,
    /// Method result.
    pub response_data: Value,
    /// Handling time in milliseconds, two decimals.
    pub time_taken: String,
}

/// Build a response from a serialized result. A result that failed to
/// serialize is replaced by a `CLONE_ERROR` carrying the request summary.
pub fn encode_response(
    request: &WorkerRequest,
    data: serde_json::Result<Value>,
    elapsed: Duration,
) -> WorkerResponse {
    let response_data = match data {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(method = request.body.method(), error = %e, "response not serializable");
            let err = EvalError::new(EvalErrorKind::Clone, e.to_string()).with_context(request.summary());
            json!({ "errors": [err] })
        }
    };
    WorkerResponse {
        request_id: request.request_id.clone(),
        response_data,
        time_taken: format!("{:.2}", elapsed.as_secs_f64() * 1000.0),
    }
}

#[cfg(test)]
mod tests {
    use serde::ser::Error as _;

    use super::*;

    #[test]
    fn request_wire_shape() {
        let req: WorkerRequest = serde_json::from_value(json!({
            "requestId": "7",
            "method": "EVAL_TREE",
            "requestData": {"unevalTree": {"Text1": {"text": "hi"}}, "widgets": {}}
        }))
        .unwrap();
        assert_eq!(req.request_id, "7");
        let RequestBody::EvalTree(body) = &req.body else {
            panic!("wrong method");
        };
        assert!(body.should_replay);
        assert_eq!(body.uneval_tree.get("Text1.text"), Some(&json!("hi")));

        let req: WorkerRequest =
            serde_json::from_value(json!({"requestId": "8", "method": "CLEAR_CACHE"})).unwrap();
        assert_eq!(req.body, RequestBody::ClearCache);
        assert_eq!(req.body.method(), "CLEAR_CACHE");
    }

    #[test]
    fn clone_error_drops_trees() {
        let req = WorkerRequest::new(
            "1",
            RequestBody::EvalTree(EvalTreeRequest {
                uneval_tree: DataTree::new(),
                widgets: json!({"0": {}}),
                theme: json!("dark"),
                should_replay: false,
            }),
        );
        let resp = encode_response(
            &req,
            Err(serde_json::Error::custom("cannot clone")),
            Duration::from_micros(1500),
        );
        assert_eq!(resp.request_id, "1");
        assert_eq!(resp.time_taken, "1.50");
        let err = &resp.response_data["errors"][0];
        assert_eq!(err["type"], "CLONE_ERROR");
        assert_eq!(err["context"]["method"], "EVAL_TREE");
        let data = &err["context"]["requestData"];
        assert!(data.get("unevalTree").is_none());
        assert!(data.get("widgets").is_none());
        assert_eq!(data["theme"], "dark");
    }
}
