//! Engine configuration, loadable from TOML.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default number of grid columns across a container.
pub const GRID_COLUMNS: i32 = 64;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Layout mutator settings.
    pub layout: LayoutConfig,
    /// Highlight calculator settings.
    pub highlight: HighlightConfig,
    /// Evaluator settings.
    pub eval: EvalConfig,
}

impl EngineConfig {
    /// Parse a configuration from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

/// Grid settings used by the layout mutator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Columns across a container.
    pub grid_columns: i32,
    /// Rows left empty above the first layer.
    pub container_padding: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid_columns: GRID_COLUMNS,
            container_padding: 0,
        }
    }
}

/// Tuning constants for drop highlights. Distances are in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HighlightConfig {
    /// Thickness of a highlight bar.
    pub bar_thickness: f64,
    /// Inset applied to bars anchored on a container edge.
    pub drag_margin: f64,
    /// Gap between a vertical bar and the child it precedes.
    pub child_gap: f64,
    /// Distance past which the direction penalty applies.
    pub proximity_threshold: f64,
    /// Offset added to candidates behind the direction of travel.
    pub direction_penalty: f64,
    /// Fraction of the container width a row may occupy before its empty
    /// buckets stop offering a drop bar.
    pub row_overflow_threshold: f64,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            bar_thickness: 4.0,
            drag_margin: 4.0,
            child_gap: 8.0,
            proximity_threshold: 20.0,
            direction_penalty: 2000.0,
            row_overflow_threshold: 0.95,
        }
    }
}

/// Evaluator limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    /// Operation budget per expression; zero means unlimited.
    pub max_operations: u64,
    /// Maximum script call depth.
    pub max_call_levels: usize,
    /// Snapshots kept per replay entity.
    pub replay_history: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_call_levels: 64,
            replay_history: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [layout]
            container_padding = 2

            [highlight]
            direction_penalty = 500.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.layout.grid_columns, GRID_COLUMNS);
        assert_eq!(cfg.layout.container_padding, 2);
        assert_eq!(cfg.highlight.direction_penalty, 500.0);
        assert_eq!(cfg.highlight.proximity_threshold, 20.0);
        assert_eq!(cfg.eval, EvalConfig::default());
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(EngineConfig::from_toml_str("[layout]\ncolumns = 3\n").is_err());
    }
}
