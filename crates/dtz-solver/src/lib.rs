//! Type solver for the dtz compiler.
//!
//! Two views of the same information live here:
//!
//! - [`Constraint`] is the boolean-reasoning view: canonicalization,
//!   contradiction detection, and implication (`simplify`, `implies`,
//!   `narrow`, `negate`).
//! - [`Type`] is the structural view: records, unions, functions, brands,
//!   driven by [`is_subtype`].
//!
//! The two algebras are intentionally distinct; `type_to_constraint` /
//! `constraint_to_type` bridge them at well-defined boundaries. Guard
//! refinement (what a boolean condition teaches us about each variable)
//! is extracted in [`refine`].

pub mod constraint;
pub use constraint::{Constraint, constraint_equals, implies, narrow, narrow_or, negate, simplify, unify};

pub mod types;
pub use types::{Field, FnParam, LitValue, Prim, Type};

pub mod subtype;
pub use subtype::is_subtype;

pub mod bridge;
pub use bridge::{constraint_to_type, narrow_type, type_to_constraint};

pub mod refine;
pub use refine::{Refinement, extract_refinement, negate_refinement};

#[cfg(test)]
#[path = "tests/constraint_law_tests.rs"]
mod constraint_law_tests;

#[cfg(test)]
#[path = "tests/refine_tests.rs"]
mod refine_tests;

#[cfg(test)]
#[path = "tests/bridge_tests.rs"]
mod bridge_tests;
