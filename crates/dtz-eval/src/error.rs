//! Evaluation errors.
//!
//! The evaluator fails fast: the first error aborts the current
//! declaration and converts into a single `typecheck` diagnostic carrying
//! the offending node's span. Surrounding passes add notes, never rewrite
//! the kind or span.

use dtz_common::diagnostics::{Diagnostic, Stage};
use dtz_common::span::Span;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    TypeMismatch {
        expected: String,
        found: String,
    },
    ConstraintViolation {
        arg: String,
        bound: String,
    },
    NoSuchField(String),
    BadIndex(String),
    MissingArg(String),
    BadSpread,
    SpreadNonRecord,
    UndefinedIdentifier(String),
    FuelExhausted,
    NoMatch,
    AmbiguousSignature(String),
    UserThrow(String),
    AssertionFailed(Option<String>),
    CyclicBinding(String),
    StagingError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Span,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            EvalErrorKind::TypeMismatch { expected, found } => {
                format!("type mismatch: expected {expected}, found {found}")
            }
            EvalErrorKind::ConstraintViolation { arg, bound } => {
                format!("type `{arg}` does not satisfy bound `{bound}`")
            }
            EvalErrorKind::NoSuchField(name) => format!("no field `{name}`"),
            EvalErrorKind::BadIndex(detail) => format!("invalid index: {detail}"),
            EvalErrorKind::MissingArg(name) => format!("missing argument `{name}`"),
            EvalErrorKind::BadSpread => "spread argument is not an array".to_string(),
            EvalErrorKind::SpreadNonRecord => "spread source is not a record".to_string(),
            EvalErrorKind::UndefinedIdentifier(name) => {
                format!("undefined identifier `{name}`")
            }
            EvalErrorKind::FuelExhausted => {
                "compile-time evaluation fuel exhausted".to_string()
            }
            EvalErrorKind::NoMatch => "no match arm matched the value".to_string(),
            EvalErrorKind::AmbiguousSignature(prop) => {
                format!("`{prop}` is ambiguous on an intersection with multiple signatures")
            }
            EvalErrorKind::UserThrow(value) => format!("uncaught throw: {value}"),
            EvalErrorKind::AssertionFailed(msg) => match msg {
                Some(msg) => format!("assertion failed: {msg}"),
                None => "assertion failed".to_string(),
            },
            EvalErrorKind::CyclicBinding(name) => {
                format!("binding `{name}` depends on itself")
            }
            EvalErrorKind::StagingError(msg) => msg.clone(),
        }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        let span = if self.span.is_dummy() {
            None
        } else {
            Some(self.span)
        };
        Diagnostic::new(Stage::Typecheck, self.message(), span)
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for EvalError {}
