//! Centralized limits and thresholds for the dtz compiler.
//!
//! Single source of truth for recursion depths and operation budgets used
//! throughout the workspace. Keeping them here prevents duplicate
//! definitions with inconsistent values and documents the rationale for
//! each limit.

/// Default fuel budget for the compile-time evaluator.
///
/// Fuel is decremented once per `evaluate` entry; exhaustion aborts the
/// current compilation with a `FuelExhausted` diagnostic. 10 000 steps is
/// adequate for normal programs; the CLI exposes `--fuel` to raise it.
pub const DEFAULT_FUEL: u64 = 10_000;

/// Maximum recursion depth for the parser.
///
/// Deeply nested parenthesized expressions or records would otherwise
/// overflow the stack; the parser reports a parse error instead.
pub const MAX_PARSER_RECURSION_DEPTH: u32 = 1_000;

/// Maximum depth for subtype checking.
///
/// Recursive structural comparisons (records of records, nested unions)
/// bail out with a conservative `false` at this depth rather than
/// overflowing the stack.
pub const MAX_SUBTYPE_DEPTH: u32 = 100;

/// Maximum depth for constraint simplification.
///
/// `simplify` recurses into logical combinators and field constraints;
/// beyond this depth the constraint is returned as-is (still sound - a
/// non-canonical constraint only weakens implication answers).
pub const MAX_SIMPLIFY_DEPTH: u32 = 100;

/// Maximum number of residual nodes allocated during staging.
///
/// A runaway specialization loop would otherwise grow the residual graph
/// without bound; staging fails with a codegen diagnostic at this size.
pub const MAX_RESIDUAL_NODES: u32 = 100_000;
