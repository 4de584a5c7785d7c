//! Erasure: drop compile-time-only declarations, keep the residual.

use crate::check::{CheckedProgram, DeclOutcome};
use dtz_emitter::JsStmt;

/// Produce the residual statement stream: residual declarations plus
/// expression statements with observable effects, in source order.
/// Comptime-only declarations vanish.
pub fn erase(checked: &CheckedProgram) -> Vec<JsStmt> {
    let mut out = Vec::new();
    for decl in &checked.decls {
        match &decl.outcome {
            DeclOutcome::Comptime => {}
            DeclOutcome::Residual { hoisted, stmt } | DeclOutcome::Effect { hoisted, stmt } => {
                out.extend(hoisted.iter().cloned());
                out.push(stmt.clone());
            }
        }
    }
    out
}
