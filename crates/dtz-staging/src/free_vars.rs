//! Free-variable analysis over the core AST.
//!
//! Used by the stager to decide whether an expression is fully `Now`
//! (every free identifier resolves to a compile-time value).

use dtz_ast::{
    ArrayItem, Decl, DeclKind, Expr, ExprKind, Pattern, PatternKind, RecordItem, TemplatePart,
};
use rustc_hash::FxHashSet;

/// The free identifiers of `expr`.
pub fn free_vars(expr: &Expr) -> FxHashSet<String> {
    let mut free = FxHashSet::default();
    let mut bound: Vec<String> = Vec::new();
    collect(expr, &mut bound, &mut free);
    free
}

fn collect(expr: &Expr, bound: &mut Vec<String>, free: &mut FxHashSet<String>) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Ident(name) => {
            if !bound.iter().any(|b| b == name) {
                free.insert(name.clone());
            }
        }
        ExprKind::Binary { left, right, .. } => {
            collect(left, bound, free);
            collect(right, bound, free);
        }
        ExprKind::Unary { operand, .. } => collect(operand, bound, free),
        ExprKind::Call { callee, args } => {
            collect(callee, bound, free);
            for arg in args {
                collect(&arg.expr, bound, free);
            }
        }
        ExprKind::Property { object, .. } => collect(object, bound, free),
        ExprKind::Index { object, index } => {
            collect(object, bound, free);
            collect(index, bound, free);
        }
        ExprKind::Lambda(lambda) => {
            let base = bound.len();
            for param in &lambda.params {
                // Annotations and defaults see the parameters bound so far.
                if let Some(ty) = &param.ty {
                    collect(ty, bound, free);
                }
                if let Some(default) = &param.default {
                    collect(default, bound, free);
                }
                bound.push(param.name.clone());
            }
            if let Some(rt) = &lambda.return_type {
                collect(rt, bound, free);
            }
            collect(&lambda.body, bound, free);
            bound.truncate(base);
        }
        ExprKind::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            collect(cond, bound, free);
            collect(then_branch, bound, free);
            collect(else_branch, bound, free);
        }
        ExprKind::Record(items) => {
            for item in items {
                match item {
                    RecordItem::Field { value, .. } => collect(value, bound, free),
                    RecordItem::Spread(source) => collect(source, bound, free),
                }
            }
        }
        ExprKind::Array(items) => {
            for item in items {
                match item {
                    ArrayItem::Element(e) | ArrayItem::Spread(e) => collect(e, bound, free),
                }
            }
        }
        ExprKind::Match { scrutinee, cases } => {
            collect(scrutinee, bound, free);
            for case in cases {
                let base = bound.len();
                bind_pattern_names(&case.pattern, bound);
                if let Some(guard) = &case.guard {
                    collect(guard, bound, free);
                }
                collect(&case.body, bound, free);
                bound.truncate(base);
            }
        }
        ExprKind::Throw(inner) | ExprKind::Await(inner) => collect(inner, bound, free),
        ExprKind::Template(parts) => {
            for part in parts {
                if let TemplatePart::Interp(e) = part {
                    collect(e, bound, free);
                }
            }
        }
        ExprKind::Block { decls, result } => {
            let base = bound.len();
            for decl in decls {
                collect_decl(decl, bound, free);
            }
            if let Some(result) = result {
                collect(result, bound, free);
            }
            bound.truncate(base);
        }
    }
}

fn collect_decl(decl: &Decl, bound: &mut Vec<String>, free: &mut FxHashSet<String>) {
    match &decl.kind {
        DeclKind::Const { name, ty, init, .. } => {
            if let Some(ty) = ty {
                collect(ty, bound, free);
            }
            // Lazy bindings may reference themselves; the name is in
            // scope inside its own initializer.
            bound.push(name.clone());
            collect(init, bound, free);
        }
        DeclKind::Import { bindings, .. } => {
            for binding in bindings {
                bound.push(binding.name.clone());
            }
        }
        DeclKind::Expr(expr) => collect(expr, bound, free),
    }
}

fn bind_pattern_names(pattern: &Pattern, bound: &mut Vec<String>) {
    match &pattern.kind {
        PatternKind::Wildcard | PatternKind::Literal(_) => {}
        PatternKind::Binding { name, inner } => {
            bound.push(name.clone());
            if let Some(inner) = inner {
                bind_pattern_names(inner, bound);
            }
        }
        PatternKind::Destructure(fields) => {
            for field in fields {
                match &field.pattern {
                    Some(nested) => bind_pattern_names(nested, bound),
                    None => bound.push(field.name.clone()),
                }
            }
        }
    }
}

/// Does the expression contain a staging-only form outside any lambda
/// body (`await`, or a call of the `runtime` intrinsic)? Such forms make
/// the all-`Now` evaluation shortcut unsound.
pub fn contains_staging_form(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Await(_) => true,
        ExprKind::Lambda(_) => false,
        ExprKind::Call { callee, args } => {
            matches!(&callee.kind, ExprKind::Ident(name) if name == "runtime")
                || contains_staging_form(callee)
                || args.iter().any(|a| contains_staging_form(&a.expr))
        }
        ExprKind::Literal(_) | ExprKind::Ident(_) => false,
        ExprKind::Binary { left, right, .. } => {
            contains_staging_form(left) || contains_staging_form(right)
        }
        ExprKind::Unary { operand, .. } => contains_staging_form(operand),
        ExprKind::Property { object, .. } => contains_staging_form(object),
        ExprKind::Index { object, index } => {
            contains_staging_form(object) || contains_staging_form(index)
        }
        ExprKind::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            contains_staging_form(cond)
                || contains_staging_form(then_branch)
                || contains_staging_form(else_branch)
        }
        ExprKind::Record(items) => items.iter().any(|item| match item {
            RecordItem::Field { value, .. } => contains_staging_form(value),
            RecordItem::Spread(source) => contains_staging_form(source),
        }),
        ExprKind::Array(items) => items.iter().any(|item| match item {
            ArrayItem::Element(e) | ArrayItem::Spread(e) => contains_staging_form(e),
        }),
        ExprKind::Match { scrutinee, cases } => {
            contains_staging_form(scrutinee)
                || cases.iter().any(|case| {
                    case.guard.as_ref().is_some_and(contains_staging_form)
                        || contains_staging_form(&case.body)
                })
        }
        ExprKind::Throw(inner) => contains_staging_form(inner),
        ExprKind::Template(parts) => parts.iter().any(|part| match part {
            TemplatePart::Interp(e) => contains_staging_form(e),
            TemplatePart::Text(_) => false,
        }),
        ExprKind::Block { decls, result } => {
            decls.iter().any(|decl| match &decl.kind {
                DeclKind::Const { ty, init, .. } => {
                    ty.as_ref().is_some_and(contains_staging_form) || contains_staging_form(init)
                }
                DeclKind::Import { .. } => false,
                DeclKind::Expr(e) => contains_staging_form(e),
            }) || result.as_deref().is_some_and(contains_staging_form)
        }
    }
}
