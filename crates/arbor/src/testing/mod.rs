//! Fixtures for tests and benchmarks.

/// Widget tree builders.
pub mod canvas;
/// Data tree builders.
pub mod trees;
