//! Worker-side state and request dispatch.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Instant};

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::{
    protocol::{
        EvalTreeRequest, EvalTreeResponse, RequestBody, WorkerRequest, WorkerResponse,
        encode_response,
    },
    replay::{ReplayEntity, ReplayEvent},
};
use crate::{
    config::EvalConfig,
    eval::{DataTreeEvaluator, ExpressionEvaluator, RhaiEvaluator},
};

/// Replay entity id of the canvas.
pub const CANVAS: &str = "canvas";

/// Everything the worker keeps between requests.
pub struct EvalSession {
    /// Evaluator limits and history size.
    config: EvalConfig,
    /// Shared by every evaluator the session creates.
    expressions: Arc<dyn ExpressionEvaluator>,
    /// Present after the first `EVAL_TREE`.
    evaluator: Option<DataTreeEvaluator>,
    /// Undo histories by entity id.
    replay: BTreeMap<String, ReplayEntity>,
    /// Last version set by the caller. Recorded and reported only; every
    /// version evaluates the same way.
    evaluation_version: u32,
    /// Set by `SETUP`.
    ready: bool,
}

impl fmt::Debug for EvalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalSession")
            .field("evaluator", &self.evaluator)
            .field("replay", &self.replay.keys().collect::<Vec<_>>())
            .field("evaluation_version", &self.evaluation_version)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

impl EvalSession {
    /// A session evaluating with rhai.
    pub fn new(config: EvalConfig) -> Self {
        Self::with_evaluator(config, Arc::new(RhaiEvaluator::new(&config)))
    }

    /// A session evaluating with a custom expression evaluator.
    pub fn with_evaluator(config: EvalConfig, expressions: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            config,
            expressions,
            evaluator: None,
            replay: BTreeMap::new(),
            evaluation_version: 1,
            ready: false,
        }
    }

    /// Prepare the environment.
    pub fn init(&mut self) {
        self.ready = true;
        info!("evaluation session ready");
    }

    /// Drop the evaluator so the next tree is evaluated from scratch.
    pub fn reset(&mut self) {
        self.evaluator = None;
        self.expressions.clear_cache();
        debug!("evaluation cache cleared");
    }

    /// Drop all state.
    pub fn dispose(&mut self) {
        self.reset();
        self.replay.clear();
        self.ready = false;
        info!("evaluation session disposed");
    }

    /// True once `SETUP` has run.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Last version set with `SET_EVALUATION_VERSION`.
    pub fn evaluation_version(&self) -> u32 {
        self.evaluation_version
    }

    /// The evaluator, once a tree has been evaluated.
    pub fn evaluator(&self) -> Option<&DataTreeEvaluator> {
        self.evaluator.as_ref()
    }

    /// A replay history.
    pub fn replay_entity(&self, id: &str) -> Option<&ReplayEntity> {
        self.replay.get(id)
    }

    /// Handle one request. Every request gets a response; methods with no
    /// result answer `null`.
    pub fn handle(&mut self, request: &WorkerRequest) -> WorkerResponse {
        let start = Instant::now();
        if !self.ready && !matches!(request.body, RequestBody::Setup) {
            debug!(method = request.body.method(), "request before SETUP");
        }
        let data = self.dispatch(&request.body);
        let response = encode_response(request, data, start.elapsed());
        debug!(
            method = request.body.method(),
            id = %request.request_id,
            time_taken = %response.time_taken,
            "request handled"
        );
        response
    }

    /// Run a method and serialize its result.
    fn dispatch(&mut self, body: &RequestBody) -> serde_json::Result<Value> {
        match body {
            RequestBody::Setup => {
                self.init();
                Ok(Value::Bool(true))
            }
            RequestBody::ClearCache => {
                self.reset();
                Ok(Value::Bool(true))
            }
            RequestBody::EvalTree(req) => serde_json::to_value(self.eval_tree(req)),
            RequestBody::EvalTrigger(req) => {
                let Some(ev) = self.evaluator.as_mut() else {
                    return Ok(json!({"triggers": [], "errors": []}));
                };
                ev.update_data_tree(req.data_tree.clone());
                serde_json::to_value(ev.evaluate_trigger(
                    &req.dynamic_trigger,
                    req.callback_data.clone(),
                    req.global_context.clone(),
                ))
            }
            RequestBody::EvalActionBindings(req) => {
                let Some(ev) = self.evaluator.as_ref() else {
                    return Ok(json!({"values": null, "errors": []}));
                };
                serde_json::to_value(
                    ev.evaluate_action_bindings(&req.bindings, req.execution_params.clone()),
                )
            }
            RequestBody::EvalExpression(req) => {
                let Some(ev) = self.evaluator.as_ref() else {
                    return Ok(Value::Object(Map::new()));
                };
                if req.is_trigger {
                    serde_json::to_value(ev.evaluate_trigger(&req.expression, Vec::new(), Map::new()))
                } else {
                    Ok(match ev.evaluate_expression(&req.expression) {
                        Ok(result) => json!({"result": result, "errors": []}),
                        Err(e) => json!({"result": null, "errors": [e]}),
                    })
                }
            }
            RequestBody::Undo(req) => self.step(req.entity_id.as_deref(), ReplayEvent::Undo),
            RequestBody::Redo(req) => self.step(req.entity_id.as_deref(), ReplayEvent::Redo),
            RequestBody::SetEvaluationVersion(req) => {
                self.evaluation_version = req.version.unwrap_or(1);
                info!(version = self.evaluation_version, "evaluation version set");
                Ok(Value::Null)
            }
            RequestBody::UpdateReplayObject(req) => {
                match self.replay.get_mut(&req.entity_id) {
                    Some(r) => {
                        r.update(req.entity.clone());
                    }
                    None => {
                        self.replay.insert(
                            req.entity_id.clone(),
                            ReplayEntity::new(
                                req.entity_type.clone(),
                                req.entity.clone(),
                                self.config.replay_history,
                            ),
                        );
                    }
                }
                Ok(Value::Null)
            }
        }
    }

    /// Evaluate a tree, creating the evaluator on first use. The canvas
    /// snapshot is recorded before evaluation.
    fn eval_tree(&mut self, req: &EvalTreeRequest) -> EvalTreeResponse {
        let snapshot = json!({"widgets": req.widgets, "theme": req.theme});
        let pass = match self.evaluator.as_mut() {
            None => {
                self.replay.insert(
                    CANVAS.to_string(),
                    ReplayEntity::new(CANVAS, snapshot, self.config.replay_history),
                );
                let mut ev = DataTreeEvaluator::new(Arc::clone(&self.expressions));
                let pass = ev.create_first_tree(req.uneval_tree.clone());
                self.evaluator = Some(ev);
                pass
            }
            Some(ev) => {
                if req.should_replay
                    && let Some(canvas) = self.replay.get_mut(CANVAS)
                {
                    canvas.update(snapshot);
                }
                ev.update_data_tree(req.uneval_tree.clone())
            }
        };
        let Some(ev) = self.evaluator.as_ref() else {
            return EvalTreeResponse::default();
        };
        EvalTreeResponse {
            data_tree: ev.eval_tree().clone(),
            dependencies: ev.inverse_dependency_map(),
            errors: pass.errors,
            evaluation_order: pass.evaluation_order,
            un_eval_updates: pass.uneval_updates,
            js_updates: Map::new(),
            eval_meta_updates: Vec::new(),
            is_create_first_tree: pass.is_create_first_tree,
        }
    }

    /// Step a replay history. Never evaluates.
    fn step(&mut self, id: Option<&str>, event: ReplayEvent) -> serde_json::Result<Value> {
        let id = id.unwrap_or(CANVAS);
        match self.replay.get_mut(id).and_then(|r| r.replay(event)) {
            Some(res) => serde_json::to_value(res),
            None => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        eval::{DataTree, Entity, EntityKind},
        worker::protocol::{ExpressionRequest, ReplayRequest},
    };

    fn tree(name: &str) -> DataTree {
        DataTree::new()
            .with("Api1", Entity::new(EntityKind::Action).with("data", json!({"name": name})))
            .with("Button1", Entity::new(EntityKind::Widget).with("text", "{{Api1.data.name}}"))
    }

    fn eval_tree(id: &str, name: &str, widgets: Value) -> WorkerRequest {
        WorkerRequest::new(
            id,
            RequestBody::EvalTree(EvalTreeRequest {
                uneval_tree: tree(name),
                widgets,
                theme: Value::Null,
                should_replay: true,
            }),
        )
    }

    #[test]
    fn eval_tree_first_then_incremental() {
        let mut s = EvalSession::new(EvalConfig::default());
        let r = s.handle(&eval_tree("1", "Ada", json!({"v": 1})));
        assert_eq!(r.request_id, "1");
        assert_eq!(r.response_data["isCreateFirstTree"], true);
        assert_eq!(r.response_data["dataTree"]["Button1"]["text"], "Ada");
        assert_eq!(r.response_data["jsUpdates"], json!({}));

        let r = s.handle(&eval_tree("2", "Grace", json!({"v": 2})));
        assert_eq!(r.response_data["isCreateFirstTree"], false);
        assert_eq!(r.response_data["evaluationOrder"], json!(["Button1.text"]));
        assert_eq!(r.response_data["dependencies"]["Api1.data"], json!(["Button1.text"]));
        assert!(s.replay_entity(CANVAS).unwrap().can_undo());
    }

    #[test]
    fn undo_does_not_evaluate() {
        let mut s = EvalSession::new(EvalConfig::default());
        s.handle(&eval_tree("1", "Ada", json!({"v": 1})));
        s.handle(&eval_tree("2", "Grace", json!({"v": 2})));
        let r = s.handle(&WorkerRequest::new("3", RequestBody::Undo(ReplayRequest::default())));
        assert_eq!(r.response_data["replayEntity"]["widgets"], json!({"v": 1}));
        assert_eq!(
            s.evaluator().unwrap().eval_tree().get("Button1.text"),
            Some(&json!("Grace"))
        );
        let r = s.handle(&WorkerRequest::new(
            "4",
            RequestBody::Undo(ReplayRequest {
                entity_id: Some("missing".into()),
            }),
        ));
        assert_eq!(r.response_data, Value::Null);
    }

    #[test]
    fn clear_cache_forces_rebuild() {
        let mut s = EvalSession::new(EvalConfig::default());
        assert_eq!(
            s.handle(&WorkerRequest::new("0", RequestBody::Setup)).response_data,
            Value::Bool(true)
        );
        assert!(s.is_ready());
        let r = s.handle(&WorkerRequest::new(
            "1",
            RequestBody::EvalExpression(ExpressionRequest {
                expression: "1".into(),
                is_trigger: false,
            }),
        ));
        assert_eq!(r.response_data, json!({}));
        s.handle(&eval_tree("2", "Ada", Value::Null));
        s.handle(&WorkerRequest::new("3", RequestBody::ClearCache));
        assert!(s.evaluator().is_none());
        let r = s.handle(&eval_tree("4", "Ada", Value::Null));
        assert_eq!(r.response_data["isCreateFirstTree"], true);
    }
}
