//! Pluggable expression evaluation, with a default rhai implementation.

use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, PoisonError},
};

use rhai::{AST, Dynamic, Engine, EvalAltResult, Position, Scope};
use serde_json::{Map, Value};

use super::guard::{self, TRIGGER_ONLY};
use crate::config::EvalConfig;

/// Whether a script failed to parse or failed while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    /// The code did not parse.
    Parse,
    /// The code raised while running.
    Runtime,
}

/// A failure reported by an [`ExpressionEvaluator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Failure category.
    pub kind: ScriptErrorKind,
    /// Message, including a location when known.
    pub message: String,
}

impl ScriptError {
    /// A runtime failure.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: ScriptErrorKind::Runtime,
            message: message.into(),
        }
    }

    /// A parse failure.
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ScriptErrorKind::Parse,
            message: message.into(),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Runs the code found between `{{` and `}}`.
///
/// Implementations receive the names visible to the code as JSON values and
/// must call [`guard::invoke`] before performing any trigger-only builtin.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `code` with `scope` bound as read-only variables.
    fn evaluate(&self, code: &str, scope: &Map<String, Value>) -> Result<Value, ScriptError>;

    /// Drop any compiled-code cache.
    fn clear_cache(&self) {}
}

/// Format a rhai position for error messages.
fn format_position(pos: Position) -> String {
    match (pos.line(), pos.position()) {
        (Some(line), Some(offset)) => format!(" (line {line}, offset {offset})"),
        (Some(line), None) => format!(" (line {line})"),
        _ => String::new(),
    }
}

/// Forward a builtin call to the guard.
fn call_action(name: &str, args: &[Dynamic]) -> Result<(), Box<EvalAltResult>> {
    let args: Vec<Value> = args
        .iter()
        .map(|a| rhai::serde::from_dynamic(a).unwrap_or(Value::Null))
        .collect();
    guard::invoke(name, &args)
        .map_err(|m| Box::new(EvalAltResult::ErrorRuntime(Dynamic::from(m), Position::NONE)))
}

/// Expression evaluator backed by a rhai engine.
#[derive(Debug)]
pub struct RhaiEvaluator {
    /// Engine with the trigger builtins registered.
    engine: Engine,
    /// Compiled code by source text.
    cache: Mutex<HashMap<String, AST>>,
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new(&EvalConfig::default())
    }
}

impl RhaiEvaluator {
    /// Build an engine with limits from `config`.
    pub fn new(config: &EvalConfig) -> Self {
        let mut engine = Engine::new();
        engine.on_debug(move |s, src, pos| {
            let src = src.unwrap_or("");
            tracing::debug!("{} [{}:{}]", s, src, pos)
        });
        engine.on_print(move |s| tracing::info!("{}", s));
        if config.max_operations > 0 {
            engine.set_max_operations(config.max_operations);
        }
        engine.set_max_call_levels(config.max_call_levels);
        for &name in TRIGGER_ONLY {
            engine.register_fn(name, move || call_action(name, &[]));
            engine.register_fn(name, move |a: Dynamic| call_action(name, &[a]));
            engine.register_fn(name, move |a: Dynamic, b: Dynamic| call_action(name, &[a, b]));
        }
        Self {
            engine,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Compile `code`, reusing a cached AST.
    fn compile(&self, code: &str) -> Result<AST, ScriptError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ast) = cache.get(code) {
            return Ok(ast.clone());
        }
        let ast = self.engine.compile(code).map_err(|e| {
            ScriptError::parse(format!("{}{}", e.err_type(), format_position(e.position())))
        })?;
        cache.insert(code.to_string(), ast.clone());
        Ok(ast)
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(&self, code: &str, vars: &Map<String, Value>) -> Result<Value, ScriptError> {
        let ast = self.compile(code)?;
        let mut scope = Scope::new();
        for (name, value) in vars {
            let value = rhai::serde::to_dynamic(value).map_err(|e| ScriptError::runtime(e.to_string()))?;
            scope.push_constant_dynamic(name.clone(), value);
        }
        let out = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| ScriptError::runtime(format!("{e}{}", format_position(e.position()))))?;
        rhai::serde::from_dynamic(&out).map_err(|e| ScriptError::runtime(e.to_string()))
    }

    fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
