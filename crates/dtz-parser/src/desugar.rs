//! Surface-sugar lowering.
//!
//! The builders here turn type syntax and generic sugar into the core
//! AST: everything becomes ordinary expressions over the builtin type
//! constructors, so the evaluator never sees surface-only forms.

use dtz_ast::{Arg, Expr, ExprKind, Param, RecordItem};
use dtz_common::span::Span;

fn ident(name: &str, span: Span) -> Expr {
    Expr::new(ExprKind::Ident(name.to_string()), span)
}

fn call(callee: &str, args: Vec<Expr>, span: Span) -> Expr {
    Expr::new(
        ExprKind::Call {
            callee: Box::new(ident(callee, span)),
            args: args
                .into_iter()
                .map(|expr| Arg {
                    expr,
                    spread: false,
                })
                .collect(),
        },
        span,
    )
}

fn span_of(members: &[Expr]) -> Span {
    members
        .iter()
        .fold(Span::dummy(), |acc, e| acc.merge(e.span))
}

/// `A | B | C` → `Union(A, B, C)`.
pub fn union_call(members: Vec<Expr>) -> Expr {
    let span = span_of(&members);
    call("Union", members, span)
}

/// `A & B` → `Intersection(A, B)`.
pub fn intersection_call(members: Vec<Expr>) -> Expr {
    let span = span_of(&members);
    call("Intersection", members, span)
}

/// A literal in type position denotes its literal type.
pub fn literal_type_call(lit: Expr) -> Expr {
    let span = lit.span;
    call("LiteralType", vec![lit], span)
}

/// `{ f: T, g: U }` in type position → `RecordType({ f: T, g: U })`.
pub fn record_type_call(fields: Vec<RecordItem>, span: Span) -> Expr {
    let record = Expr::new(ExprKind::Record(fields), span);
    call("RecordType", vec![record], span)
}

/// `T[]` and `[A, B]` → `Array(...)`.
pub fn array_call(elements: Vec<Expr>, end: Span) -> Expr {
    let span = span_of(&elements).merge(end);
    call("Array", elements, span)
}

/// A generic parameter `T extends B` becomes a leading value parameter
/// `T: Type(B)`; without a bound the top type is used.
pub fn type_param(name: String, bound: Option<Expr>, span: Span) -> Param {
    let bound = bound.unwrap_or_else(|| ident("Any", span));
    let ty = call("Type", vec![bound], span);
    Param {
        name,
        ty: Some(ty),
        default: None,
        span,
    }
}

/// `f<A, B>(x)` → `f(A, B, x)`: type arguments become leading value
/// arguments matching the lowered generic parameters.
pub fn call_with_type_args(
    callee: Expr,
    type_args: Vec<Expr>,
    args: Vec<Arg>,
    span: Span,
) -> Expr {
    let mut all_args: Vec<Arg> = type_args
        .into_iter()
        .map(|expr| Arg {
            expr,
            spread: false,
        })
        .collect();
    all_args.extend(args);
    Expr::new(
        ExprKind::Call {
            callee: Box::new(callee),
            args: all_args,
        },
        span,
    )
}

/// `type X = T;` wraps its initializer so the computed type carries the
/// declared name: `WithMetadata(T, { name: "X" })`.
pub fn named(init: Expr, name: &str) -> Expr {
    let span = init.span;
    let name_lit = Expr::new(
        ExprKind::Literal(dtz_ast::Lit::Str(name.to_string())),
        span,
    );
    let meta = Expr::new(
        ExprKind::Record(vec![RecordItem::Field {
            name: "name".to_string(),
            value: name_lit,
            span,
        }]),
        span,
    );
    call("WithMetadata", vec![init, meta], span)
}
