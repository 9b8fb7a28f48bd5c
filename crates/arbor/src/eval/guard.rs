//! Call frames that decide whether side-effecting builtins may run.
//!
//! Every script invocation runs inside a frame. Trigger frames collect the
//! actions their builtins describe; binding frames reject those builtins and
//! record the first offending name so the caller can report a distinct error.

use std::cell::RefCell;

use scoped_tls::scoped_thread_local;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Builtins that only triggers may call.
pub const TRIGGER_ONLY: &[&str] = &[
    "showAlert",
    "navigateTo",
    "storeValue",
    "postWindowMessage",
    "resetWidget",
    "run",
];

/// Context a script runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Synchronous property binding. Side effects are forbidden.
    Binding,
    /// User-invoked trigger. Side effects are collected.
    Trigger,
}

/// A side effect requested by a trigger, for the caller to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescription {
    /// Action type, e.g. `SHOW_ALERT`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Action arguments.
    pub payload: Value,
}

/// What a frame observed once its script finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Actions described by trigger builtins, in call order.
    pub actions: Vec<ActionDescription>,
    /// The first trigger-only builtin called from a binding.
    pub violation: Option<String>,
}

/// State of the innermost running script.
#[derive(Debug)]
struct CallFrame {
    /// Frame mode.
    mode: EvalMode,
    /// Collected state.
    report: FrameReport,
}

scoped_thread_local!(static FRAME: RefCell<CallFrame>);

/// Run `f` inside a new frame and return its result with the frame report.
pub fn run_in_frame<T>(mode: EvalMode, f: impl FnOnce() -> T) -> (T, FrameReport) {
    let frame = RefCell::new(CallFrame {
        mode,
        report: FrameReport::default(),
    });
    let out = FRAME.set(&frame, f);
    (out, frame.into_inner().report)
}

/// Wire type of a builtin.
fn action_type(name: &str) -> &'static str {
    match name {
        "showAlert" => "SHOW_ALERT",
        "navigateTo" => "NAVIGATE_TO",
        "storeValue" => "STORE_VALUE",
        "postWindowMessage" => "POST_MESSAGE",
        "resetWidget" => "RESET_WIDGET_META_RECURSIVE_BY_NAME",
        "run" => "RUN_PLUGIN_ACTION",
        _ => "UNKNOWN_ACTION",
    }
}

/// Payload for a builtin from its positional arguments.
fn payload(name: &str, args: &[Value]) -> Value {
    let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
    match name {
        "showAlert" => json!({"message": arg(0), "style": arg(1)}),
        "navigateTo" => json!({"pageNameOrUrl": arg(0), "params": arg(1)}),
        "storeValue" => json!({"key": arg(0), "value": arg(1)}),
        "postWindowMessage" => json!({"message": arg(0), "targetOrigin": arg(1)}),
        "resetWidget" => json!({"widgetName": arg(0), "resetChildren": arg(1)}),
        "run" => {
            let target = arg(0);
            let id = target
                .get("actionId")
                .or_else(|| target.get("name"))
                .cloned()
                .unwrap_or(Value::Null);
            json!({"actionId": id, "params": arg(1)})
        }
        _ => Value::Array(args.to_vec()),
    }
}

/// Called by every trigger-only builtin before it does anything. Outside a
/// trigger frame this records the violation and fails.
pub fn invoke(name: &str, args: &[Value]) -> Result<(), String> {
    let denied = || format!("{name} is an action and cannot be called from a sync field");
    if !FRAME.is_set() {
        return Err(denied());
    }
    FRAME.with(|frame| {
        let mut frame = frame.borrow_mut();
        match frame.mode {
            EvalMode::Binding => {
                frame.report.violation.get_or_insert_with(|| name.to_string());
                Err(denied())
            }
            EvalMode::Trigger => {
                frame.report.actions.push(ActionDescription {
                    kind: action_type(name).to_string(),
                    payload: payload(name, args),
                });
                Ok(())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_frames_reject_actions() {
        let (res, report) = run_in_frame(EvalMode::Binding, || invoke("showAlert", &[json!("hi")]));
        assert!(res.is_err());
        assert_eq!(report.violation.as_deref(), Some("showAlert"));
        assert!(report.actions.is_empty());
    }

    #[test]
    fn trigger_frames_collect_actions() {
        let (res, report) = run_in_frame(EvalMode::Trigger, || {
            invoke("storeValue", &[json!("k"), json!(3)])?;
            invoke("run", &[json!({"actionId": "a1"})])
        });
        assert!(res.is_ok());
        assert_eq!(report.actions.len(), 2);
        assert_eq!(report.actions[0].kind, "STORE_VALUE");
        assert_eq!(report.actions[0].payload, json!({"key": "k", "value": 3}));
        assert_eq!(report.actions[1].payload["actionId"], "a1");
    }

    #[test]
    fn frames_nest() {
        let (_, outer) = run_in_frame(EvalMode::Trigger, || {
            let (_, inner) = run_in_frame(EvalMode::Binding, || invoke("navigateTo", &[]));
            assert!(inner.violation.is_some());
            invoke("navigateTo", &[json!("Page2")])
        });
        assert_eq!(outer.actions.len(), 1);
        assert!(outer.violation.is_none());
    }

    #[test]
    fn no_frame_is_a_binding() {
        assert!(invoke("resetWidget", &[]).is_err());
    }
}
