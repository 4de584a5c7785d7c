//! Type checker driver and erasure.
//!
//! The checker walks declarations in source order. Comptime constants
//! (and anything whose initializer stages fully `Now`) are computed by
//! the evaluator and recorded; everything else stages into residual JS.
//! Erasure then drops the compile-time-only declarations and yields the
//! residual statement stream, which the driver hands to the clusterer
//! and printer.

pub mod check;
pub use check::{CheckedDecl, CheckedProgram, DeclOutcome, check_program, check_source};

pub mod erase;
pub use erase::erase;
