//! Compiler diagnostics.
//!
//! Every error surfaced to the user carries a stage tag, a message, an
//! optional source span, and zero or more notes (each with their own
//! optional span). Later passes may add notes but never rewrite the primary
//! message or span.

use crate::position::LineMap;
use crate::span::Span;
use serde::{Deserialize, Serialize};

/// The compilation stage a diagnostic originates from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Desugar,
    Typecheck,
    Erasure,
    Codegen,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Parse => "parse",
            Stage::Desugar => "desugar",
            Stage::Typecheck => "typecheck",
            Stage::Erasure => "erasure",
            Stage::Codegen => "codegen",
        };
        f.write_str(s)
    }
}

/// Additional context attached to a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub message: String,
    pub span: Option<Span>,
}

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
    pub span: Option<Span>,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn new(stage: Stage, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            stage,
            message: message.into(),
            span,
            notes: Vec::new(),
        }
    }

    /// Attach a note. The primary message and span are left untouched.
    #[must_use]
    pub fn with_note(mut self, message: impl Into<String>, span: Option<Span>) -> Self {
        self.notes.push(Note {
            message: message.into(),
            span,
        });
        self
    }

    /// Render in the CLI's human format:
    ///
    /// ```text
    /// typecheck error: no field `r` on record
    ///   3 | shape.r * shape.r
    ///     |       ^
    ///   note: while checking type of `area`
    /// ```
    #[must_use]
    pub fn render(&self, source: &str) -> String {
        let map = LineMap::build(source);
        let mut out = format!("{} error: {}", self.stage, self.message);
        if let Some(span) = self.span.filter(|s| !s.is_dummy()) {
            let pos = map.position(span.start);
            let line = map.line_text(span.start, source);
            let gutter = format!("{}", pos.line + 1);
            out.push_str(&format!("\n  {gutter} | {line}"));
            let pad = " ".repeat(gutter.len() + pos.column as usize);
            let caret_len = (span.len() as usize).clamp(1, line.len().saturating_sub(pos.column as usize).max(1));
            out.push_str(&format!("\n  {pad} | {}", "^".repeat(caret_len)));
        }
        for note in &self.notes {
            out.push_str(&format!("\n  note: {}", note.message));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_points_at_offending_column() {
        let src = "const x = 1;\nconst y = z;\n";
        let diag = Diagnostic::new(
            Stage::Typecheck,
            "undefined identifier `z`",
            Some(Span::new(23, 24)),
        );
        let rendered = diag.render(src);
        assert!(rendered.starts_with("typecheck error: undefined identifier `z`"));
        assert!(rendered.contains("2 | const y = z;"));
        assert!(rendered.lines().last().unwrap().trim_end().ends_with('^'));
    }

    #[test]
    fn notes_are_appended_without_rewriting_primary() {
        let diag = Diagnostic::new(Stage::Typecheck, "boom", None)
            .with_note("while checking type of `foo`", None);
        let rendered = diag.render("");
        assert!(rendered.contains("typecheck error: boom"));
        assert!(rendered.contains("note: while checking type of `foo`"));
    }
}
