//! Compile-time evaluator for the dtz compiler.
//!
//! The evaluator interprets the expression AST to `TypedValue` pairs. It
//! is fuel-bounded (one unit per `evaluate` entry), environments are
//! persistent linked frames with lazy memoized bindings, and types are
//! ordinary values (`Value::Type`). Every id counter lives on the
//! [`Evaluator`] instance so concurrent compilations in one process
//! cannot collide.

pub mod value;
pub use value::{Builtin, BuiltinFn, Closure, ClosureParam, TypedValue, Value, constraint_of, raw_eq};

pub mod env;
pub use env::{Binding, Env};

pub mod error;
pub use error::{EvalError, EvalErrorKind, EvalResult};

pub mod interp;
pub use interp::{EvalOptions, Evaluator};

pub mod builtins;
pub use builtins::global_env;

pub mod methods;

pub mod type_props;

#[cfg(test)]
#[path = "tests/value_tests.rs"]
mod value_tests;
