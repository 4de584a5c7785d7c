//! Staged evaluation: partition every expression into `Now` (known at
//! compile time) and `Later` (residual code).
//!
//! The core invariant: an expression whose free identifiers all resolve
//! to `Now` values evaluates to `Now` and produces no residual. Anything
//! touched by a `Later` value residualizes structurally, with guard
//! refinements narrowing `Later` types across `if` branches. Closures
//! over `Later` captures stay symbolic (`StagedClosure`) and re-stage
//! their body at each compile-time call.

pub mod svalue;
pub use svalue::{Origin, SEnv, SValue, StagedClosure};

pub mod free_vars;
pub use free_vars::{contains_staging_form, free_vars};

pub mod stage;
pub use stage::Stager;

#[cfg(test)]
#[path = "tests/free_vars_tests.rs"]
mod free_vars_tests;
