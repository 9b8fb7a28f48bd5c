//! Arbor: the engine core of a visual application builder.
//!
//! Arbor has two halves:
//!
//! - an auto-layout reflow engine that keeps widgets arranged in flex
//!   layers on a column grid, computes drop highlights while dragging, and
//!   applies reorder and resize mutations;
//! - a reactive evaluator that resolves `{{ ... }}` property bindings in
//!   dependency order, detects cycles, and re-evaluates only what a change
//!   reaches, running behind a message-passing worker.
//!
//! # Module Organization
//!
//! - [`widget`] - Widget records and the copy-on-write [`WidgetTree`]
//! - [`layout`] - Flex layers, highlights, the mutator and the drag saga
//! - [`eval`] - Data trees, the dependency graph and the evaluator
//! - [`worker`] - The evaluation worker protocol and thread
//! - [`config`] - Engine configuration loaded from TOML

#![warn(missing_docs)]

pub mod config;
pub mod dump;
pub mod error;
pub mod eval;
pub mod layout;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod widget;
pub mod worker;

pub use arbor_geom as geom;
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use eval::{DataTree, DataTreeEvaluator, Entity, EntityKind};
pub use layout::{HighlightCalculator, HighlightInfo, LayoutMutator};
pub use widget::{Widget, WidgetId, WidgetTree};
pub use worker::{EvalSession, EvalWorker};
