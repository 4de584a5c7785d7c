//! Expression, declaration, and pattern nodes.

use dtz_common::span::{Span, Spanned};
use serde::{Deserialize, Serialize};

/// A literal value as written in source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lit {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
}

impl std::fmt::Display for Lit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lit::Int(n) => write!(f, "{n}"),
            Lit::Float(n) => write!(f, "{n}"),
            Lit::Str(s) => write!(f, "{s:?}"),
            Lit::Bool(b) => write!(f, "{b}"),
            Lit::Null => f.write_str("null"),
            Lit::Undefined => f.write_str("undefined"),
        }
    }
}

/// Binary operators. `&&` and `||` are short-circuit; `/` always produces
/// a float at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// The operator's surface (and JS) spelling.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl Spanned for Expr {
    fn span(&self) -> Span {
        self.span
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Lit),
    Ident(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Property {
        object: Box<Expr>,
        name: String,
        /// Span of the name itself, for field-level diagnostics.
        name_span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Lambda(Box<Lambda>),
    Conditional {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Record(Vec<RecordItem>),
    Array(Vec<ArrayItem>),
    Match {
        scrutinee: Box<Expr>,
        cases: Vec<MatchCase>,
    },
    Throw(Box<Expr>),
    Await(Box<Expr>),
    Template(Vec<TemplatePart>),
    /// A block in expression position: `{ decl* expr? }`. Without a result
    /// expression the block evaluates to `undefined`.
    Block {
        decls: Vec<Decl>,
        result: Option<Box<Expr>>,
    },
}

/// A call argument, possibly spread (`f(...xs)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub expr: Expr,
    pub spread: bool,
}

/// A lambda: parameter list, body, async flag, optional return annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<Param>,
    pub body: Expr,
    pub is_async: bool,
    pub return_type: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// Type annotation, evaluated to a type-value at closure construction.
    pub ty: Option<Expr>,
    /// Default value, evaluated lazily in the lambda's own environment.
    pub default: Option<Expr>,
    pub span: Span,
}

/// One entry of a record literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordItem {
    Field { name: String, value: Expr, span: Span },
    Spread(Expr),
}

/// One entry of an array literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayItem {
    Element(Expr),
    Spread(Expr),
}

/// One part of a template literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplatePart {
    Text(String),
    Interp(Expr),
}

/// A `match` case: pattern, optional guard, body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    /// `_` - always matches, binds nothing.
    Wildcard,
    /// Matches on raw-value equality.
    Literal(Lit),
    /// `name` or `name @ inner`.
    Binding {
        name: String,
        inner: Option<Box<Pattern>>,
    },
    /// `{ field, field: pat }` - requires a record scrutinee with every
    /// named field present.
    Destructure(Vec<FieldPattern>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPattern {
    pub name: String,
    /// Nested pattern or alias; a bare field binds under its own name.
    pub pattern: Option<Pattern>,
    pub span: Span,
}

/// A top-level (or block-level) declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    pub kind: DeclKind,
    pub span: Span,
}

impl Spanned for Decl {
    fn span(&self) -> Span {
        self.span
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclKind {
    Const {
        name: String,
        name_span: Span,
        ty: Option<Expr>,
        init: Expr,
        comptime: bool,
        exported: bool,
    },
    Import {
        bindings: Vec<ImportBinding>,
        module: String,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBinding {
    pub name: String,
    pub span: Span,
}

/// A parsed source file: a sequence of declarations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}
