//! Common types and utilities for the dtz compiler.
//!
//! This crate provides foundational types used across all dtz crates:
//! - Source spans (`Span`, `Spanned`)
//! - Line/column conversion (`LineMap`, `Position`)
//! - Diagnostics (`Stage`, `Diagnostic`, `Note`)
//! - Centralized limits and thresholds

// Span - Source location tracking (byte offsets)
pub mod span;
pub use span::{Span, Spanned};

// Position/LineMap for line/column source locations
pub mod position;
pub use position::{LineMap, Position};

// Diagnostics carried by every compiler stage
pub mod diagnostics;
pub use diagnostics::{Diagnostic, Note, Stage};

// Centralized limits and thresholds
pub mod limits;
