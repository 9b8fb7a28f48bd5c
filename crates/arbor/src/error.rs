//! Error types for arbor.

use std::{result::Result as StdResult, sync::mpsc};

use thiserror::Error;

use crate::widget::WidgetId;

/// Result type for arbor operations.
pub type Result<T> = StdResult<T, Error>;

/// Core error type.
#[derive(PartialEq, Eq, Error, Debug, Clone)]
pub enum Error {
    /// A widget id was not present in the tree.
    #[error("widget not found: {0}")]
    WidgetNotFound(WidgetId),
    #[error("layout: {0}")]
    /// Layout failure.
    Layout(String),
    #[error("geometry: {0}")]
    /// Geometry failure.
    Geometry(String),
    #[error("worker: {0}")]
    /// Worker channel or lifecycle failure.
    Worker(String),
    #[error("serialization: {0}")]
    /// Serialization failure.
    Serialization(String),
    #[error("config: {0}")]
    /// Configuration failure.
    Config(String),
    #[error("already listening to origin {0}")]
    /// A subscription for the origin already exists.
    AlreadyListening(String),
    #[error("invalid: {0}")]
    /// Invalid input error.
    Invalid(String),
}

impl From<mpsc::RecvError> for Error {
    fn from(e: mpsc::RecvError) -> Self {
        Self::Worker(e.to_string())
    }
}

impl From<arbor_geom::Error> for Error {
    fn from(e: arbor_geom::Error) -> Self {
        Self::Geometry(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}
