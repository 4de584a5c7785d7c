//! The cluster/template engine.
//!
//! Residual specializations frequently differ only in literal positions.
//! Clustering groups residual function definitions by a literal-blind
//! structural signature, verifies isomorphism pairwise, extracts the
//! differing literal positions as holes, deduplicates holes that always
//! carry the same value into shared parameters, and rewrites the members
//! as thin wrappers around a single template definition.

use crate::js::{JsBody, JsExpr, JsLit, JsPath, JsSeg, JsStmt};
use rustc_hash::FxHashMap;
use std::fmt::Write as _;
use tracing::debug;

/// A cluster of structurally isomorphic residual expressions.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub members: Vec<ClusterMember>,
    /// Hole positions, valid in every member, in pre-order.
    pub holes: Vec<JsPath>,
    pub signature: String,
}

/// One member: its position in the statement stream, the bound name, and
/// the function expression.
#[derive(Debug, Clone)]
pub struct ClusterMember {
    pub index: usize,
    pub name: String,
    pub expr: JsExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// A hole path does not address a literal in some member.
    ExtractError(String),
}

impl std::fmt::Display for ClusterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterError::ExtractError(msg) => write!(f, "template extraction failed: {msg}"),
        }
    }
}

// =============================================================================
// Lockstep comparison
// =============================================================================

/// Walk two trees in lockstep. Identical structure with differing
/// literals yields the hole paths (pre-order); any structural divergence
/// yields `None`.
pub fn compare_js_exprs(a: &JsExpr, b: &JsExpr) -> Option<Vec<JsPath>> {
    let mut holes = Vec::new();
    let mut path = Vec::new();
    compare_expr(a, b, &mut path, &mut holes).then_some(holes)
}

fn compare_expr(a: &JsExpr, b: &JsExpr, path: &mut JsPath, holes: &mut Vec<JsPath>) -> bool {
    match (a, b) {
        (JsExpr::Lit(la), JsExpr::Lit(lb)) => {
            if la != lb {
                holes.push(path.clone());
            }
            true
        }
        (JsExpr::Var(na), JsExpr::Var(nb)) => na == nb,
        (
            JsExpr::Binop {
                op: oa,
                left: la,
                right: ra,
            },
            JsExpr::Binop {
                op: ob,
                left: lb,
                right: rb,
            },
        ) => {
            oa == ob
                && child(path, holes, JsSeg::Child("left"), |p, h| {
                    compare_expr(la, lb, p, h)
                })
                && child(path, holes, JsSeg::Child("right"), |p, h| {
                    compare_expr(ra, rb, p, h)
                })
        }
        (
            JsExpr::Unary {
                op: oa,
                operand: ea,
            },
            JsExpr::Unary {
                op: ob,
                operand: eb,
            },
        ) => {
            oa == ob
                && child(path, holes, JsSeg::Child("operand"), |p, h| {
                    compare_expr(ea, eb, p, h)
                })
        }
        (
            JsExpr::Call {
                callee: ca,
                args: aa,
            },
            JsExpr::Call {
                callee: cb,
                args: ab,
            },
        ) => {
            aa.len() == ab.len()
                && child(path, holes, JsSeg::Child("callee"), |p, h| {
                    compare_expr(ca, cb, p, h)
                })
                && compare_indexed(aa, ab, path, holes)
        }
        (
            JsExpr::Method {
                object: oa,
                name: na,
                args: aa,
            },
            JsExpr::Method {
                object: ob,
                name: nb,
                args: ab,
            },
        ) => {
            na == nb
                && aa.len() == ab.len()
                && child(path, holes, JsSeg::Child("object"), |p, h| {
                    compare_expr(oa, ob, p, h)
                })
                && compare_indexed(aa, ab, path, holes)
        }
        (
            JsExpr::Arrow {
                params: pa,
                body: ba,
                is_async: aa,
            },
            JsExpr::Arrow {
                params: pb,
                body: bb,
                is_async: ab,
            },
        ) => {
            // Function shapes must share parameter names and arity.
            pa == pb
                && aa == ab
                && match (ba, bb) {
                    (JsBody::Expr(ea), JsBody::Expr(eb)) => {
                        child(path, holes, JsSeg::Child("body"), |p, h| {
                            compare_expr(ea, eb, p, h)
                        })
                    }
                    (JsBody::Block(sa), JsBody::Block(sb)) => {
                        sa.len() == sb.len()
                            && compare_stmt_list(sa, sb, path, holes)
                    }
                    _ => false,
                }
        }
        (
            JsExpr::NamedFn {
                name: na,
                params: pa,
                body: ba,
                is_async: aa,
            },
            JsExpr::NamedFn {
                name: nb,
                params: pb,
                body: bb,
                is_async: ab,
            },
        ) => {
            // Named functions must share names.
            na == nb
                && pa == pb
                && aa == ab
                && ba.len() == bb.len()
                && compare_stmt_list(ba, bb, path, holes)
        }
        (
            JsExpr::Ternary {
                cond: ca,
                then_branch: ta,
                else_branch: ea,
            },
            JsExpr::Ternary {
                cond: cb,
                then_branch: tb,
                else_branch: eb,
            },
        ) => {
            child(path, holes, JsSeg::Child("cond"), |p, h| {
                compare_expr(ca, cb, p, h)
            }) && child(path, holes, JsSeg::Child("then"), |p, h| {
                compare_expr(ta, tb, p, h)
            }) && child(path, holes, JsSeg::Child("else"), |p, h| {
                compare_expr(ea, eb, p, h)
            })
        }
        (
            JsExpr::Member {
                object: oa,
                name: na,
            },
            JsExpr::Member {
                object: ob,
                name: nb,
            },
        ) => {
            na == nb
                && child(path, holes, JsSeg::Child("object"), |p, h| {
                    compare_expr(oa, ob, p, h)
                })
        }
        (
            JsExpr::Index {
                object: oa,
                index: ia,
            },
            JsExpr::Index {
                object: ob,
                index: ib,
            },
        ) => {
            child(path, holes, JsSeg::Child("object"), |p, h| {
                compare_expr(oa, ob, p, h)
            }) && child(path, holes, JsSeg::Child("index"), |p, h| {
                compare_expr(ia, ib, p, h)
            })
        }
        (JsExpr::Object(fa), JsExpr::Object(fb)) => {
            fa.len() == fb.len()
                && fa.iter().zip(fb).enumerate().all(|(i, ((na, va), (nb, vb)))| {
                    na == nb
                        && child(path, holes, JsSeg::Index(i), |p, h| {
                            compare_expr(va, vb, p, h)
                        })
                })
        }
        (JsExpr::Array(ea), JsExpr::Array(eb)) => {
            ea.len() == eb.len() && compare_indexed(ea, eb, path, holes)
        }
        (JsExpr::Iife(sa), JsExpr::Iife(sb)) => {
            sa.len() == sb.len() && compare_stmt_list(sa, sb, path, holes)
        }
        (JsExpr::Await(ea), JsExpr::Await(eb)) => {
            child(path, holes, JsSeg::Child("operand"), |p, h| {
                compare_expr(ea, eb, p, h)
            })
        }
        _ => false,
    }
}

fn compare_indexed(
    a: &[JsExpr],
    b: &[JsExpr],
    path: &mut JsPath,
    holes: &mut Vec<JsPath>,
) -> bool {
    a.iter()
        .zip(b)
        .enumerate()
        .all(|(i, (ea, eb))| child(path, holes, JsSeg::Index(i), |p, h| compare_expr(ea, eb, p, h)))
}

fn compare_stmt_list(
    a: &[JsStmt],
    b: &[JsStmt],
    path: &mut JsPath,
    holes: &mut Vec<JsPath>,
) -> bool {
    a.iter()
        .zip(b)
        .enumerate()
        .all(|(i, (sa, sb))| child(path, holes, JsSeg::Index(i), |p, h| compare_stmt(sa, sb, p, h)))
}

fn compare_stmt(a: &JsStmt, b: &JsStmt, path: &mut JsPath, holes: &mut Vec<JsPath>) -> bool {
    match (a, b) {
        (JsStmt::Const { name: na, init: ia }, JsStmt::Const { name: nb, init: ib }) => {
            na == nb
                && child(path, holes, JsSeg::Child("init"), |p, h| {
                    compare_expr(ia, ib, p, h)
                })
        }
        (JsStmt::Let { name: na, init: ia }, JsStmt::Let { name: nb, init: ib }) => {
            na == nb
                && match (ia, ib) {
                    (Some(ea), Some(eb)) => child(path, holes, JsSeg::Child("init"), |p, h| {
                        compare_expr(ea, eb, p, h)
                    }),
                    (None, None) => true,
                    _ => false,
                }
        }
        (JsStmt::Return(ra), JsStmt::Return(rb)) => match (ra, rb) {
            (Some(ea), Some(eb)) => child(path, holes, JsSeg::Child("value"), |p, h| {
                compare_expr(ea, eb, p, h)
            }),
            (None, None) => true,
            _ => false,
        },
        (
            JsStmt::If {
                cond: ca,
                then_branch: ta,
                else_branch: ea,
            },
            JsStmt::If {
                cond: cb,
                then_branch: tb,
                else_branch: eb,
            },
        ) => {
            child(path, holes, JsSeg::Child("cond"), |p, h| {
                compare_expr(ca, cb, p, h)
            }) && ta.len() == tb.len()
                && child(path, holes, JsSeg::Child("then"), |p, h| {
                    compare_stmt_list(ta, tb, p, h)
                })
                && match (ea, eb) {
                    (Some(ea), Some(eb)) => {
                        ea.len() == eb.len()
                            && child(path, holes, JsSeg::Child("else"), |p, h| {
                                compare_stmt_list(ea, eb, p, h)
                            })
                    }
                    (None, None) => true,
                    _ => false,
                }
        }
        (
            JsStmt::ForOf {
                binding: ba,
                iterable: ia,
                body: sa,
            },
            JsStmt::ForOf {
                binding: bb,
                iterable: ib,
                body: sb,
            },
        ) => {
            ba == bb
                && child(path, holes, JsSeg::Child("iterable"), |p, h| {
                    compare_expr(ia, ib, p, h)
                })
                && sa.len() == sb.len()
                && child(path, holes, JsSeg::Child("body"), |p, h| {
                    compare_stmt_list(sa, sb, p, h)
                })
        }
        (JsStmt::Expr(ea), JsStmt::Expr(eb)) => {
            child(path, holes, JsSeg::Child("expr"), |p, h| {
                compare_expr(ea, eb, p, h)
            })
        }
        (
            JsStmt::ConstPattern { names: na, init: ia },
            JsStmt::ConstPattern { names: nb, init: ib },
        ) => {
            na == nb
                && child(path, holes, JsSeg::Child("init"), |p, h| {
                    compare_expr(ia, ib, p, h)
                })
        }
        (JsStmt::Throw(ea), JsStmt::Throw(eb)) => {
            child(path, holes, JsSeg::Child("value"), |p, h| {
                compare_expr(ea, eb, p, h)
            })
        }
        (JsStmt::Continue, JsStmt::Continue) => true,
        (JsStmt::Break, JsStmt::Break) => true,
        _ => false,
    }
}

fn child(
    path: &mut JsPath,
    holes: &mut Vec<JsPath>,
    seg: JsSeg,
    f: impl FnOnce(&mut JsPath, &mut Vec<JsPath>) -> bool,
) -> bool {
    path.push(seg);
    let ok = f(path, holes);
    path.pop();
    ok
}

// =============================================================================
// Signature
// =============================================================================

/// A deterministic string over the tree with every literal collapsed to
/// `L`. Identifiers, operators, and names are preserved.
pub fn signature(expr: &JsExpr) -> String {
    let mut out = String::new();
    write_sig(expr, &mut out);
    out
}

fn write_sig(expr: &JsExpr, out: &mut String) {
    match expr {
        JsExpr::Lit(_) => out.push('L'),
        JsExpr::Var(name) => {
            let _ = write!(out, "v:{name}");
        }
        JsExpr::Binop { op, left, right } => {
            let _ = write!(out, "(b:{op} ");
            write_sig(left, out);
            out.push(' ');
            write_sig(right, out);
            out.push(')');
        }
        JsExpr::Unary { op, operand } => {
            let _ = write!(out, "(u:{op} ");
            write_sig(operand, out);
            out.push(')');
        }
        JsExpr::Call { callee, args } => {
            out.push_str("(call ");
            write_sig(callee, out);
            for arg in args {
                out.push(' ');
                write_sig(arg, out);
            }
            out.push(')');
        }
        JsExpr::Method { object, name, args } => {
            let _ = write!(out, "(m:{name} ");
            write_sig(object, out);
            for arg in args {
                out.push(' ');
                write_sig(arg, out);
            }
            out.push(')');
        }
        JsExpr::Arrow {
            params,
            body,
            is_async,
        } => {
            let _ = write!(out, "(arrow:{}:{} ", is_async, params.join(","));
            match body {
                JsBody::Expr(e) => write_sig(e, out),
                JsBody::Block(stmts) => write_stmts_sig(stmts, out),
            }
            out.push(')');
        }
        JsExpr::NamedFn {
            name,
            params,
            body,
            is_async,
        } => {
            let _ = write!(out, "(fn:{name}:{}:{} ", is_async, params.join(","));
            write_stmts_sig(body, out);
            out.push(')');
        }
        JsExpr::Ternary {
            cond,
            then_branch,
            else_branch,
        } => {
            out.push_str("(?: ");
            write_sig(cond, out);
            out.push(' ');
            write_sig(then_branch, out);
            out.push(' ');
            write_sig(else_branch, out);
            out.push(')');
        }
        JsExpr::Member { object, name } => {
            let _ = write!(out, "(.{name} ");
            write_sig(object, out);
            out.push(')');
        }
        JsExpr::Index { object, index } => {
            out.push_str("(ix ");
            write_sig(object, out);
            out.push(' ');
            write_sig(index, out);
            out.push(')');
        }
        JsExpr::Object(fields) => {
            out.push_str("(obj");
            for (name, value) in fields {
                let _ = write!(out, " {name}:");
                write_sig(value, out);
            }
            out.push(')');
        }
        JsExpr::Array(items) => {
            out.push_str("(arr");
            for item in items {
                out.push(' ');
                write_sig(item, out);
            }
            out.push(')');
        }
        JsExpr::Iife(stmts) => {
            out.push_str("(iife ");
            write_stmts_sig(stmts, out);
            out.push(')');
        }
        JsExpr::Await(operand) => {
            out.push_str("(await ");
            write_sig(operand, out);
            out.push(')');
        }
    }
}

fn write_stmts_sig(stmts: &[JsStmt], out: &mut String) {
    out.push('[');
    for stmt in stmts {
        match stmt {
            JsStmt::Const { name, init } => {
                let _ = write!(out, "(const:{name} ");
                write_sig(init, out);
                out.push(')');
            }
            JsStmt::Let { name, init } => {
                let _ = write!(out, "(let:{name}");
                if let Some(init) = init {
                    out.push(' ');
                    write_sig(init, out);
                }
                out.push(')');
            }
            JsStmt::Return(value) => {
                out.push_str("(ret");
                if let Some(value) = value {
                    out.push(' ');
                    write_sig(value, out);
                }
                out.push(')');
            }
            JsStmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                out.push_str("(if ");
                write_sig(cond, out);
                write_stmts_sig(then_branch, out);
                if let Some(else_branch) = else_branch {
                    write_stmts_sig(else_branch, out);
                }
                out.push(')');
            }
            JsStmt::ForOf {
                binding,
                iterable,
                body,
            } => {
                let _ = write!(out, "(forof:{binding} ");
                write_sig(iterable, out);
                write_stmts_sig(body, out);
                out.push(')');
            }
            JsStmt::Expr(expr) => {
                out.push_str("(expr ");
                write_sig(expr, out);
                out.push(')');
            }
            JsStmt::ConstPattern { names, init } => {
                let _ = write!(out, "(constpat:{} ", names.join(","));
                write_sig(init, out);
                out.push(')');
            }
            JsStmt::Throw(value) => {
                out.push_str("(throw ");
                write_sig(value, out);
                out.push(')');
            }
            JsStmt::Continue => out.push_str("(continue)"),
            JsStmt::Break => out.push_str("(break)"),
        }
    }
    out.push(']');
}

// =============================================================================
// Hole access
// =============================================================================

/// The literal at `path`, if the path addresses one.
pub fn lit_at<'a>(expr: &'a JsExpr, path: &[JsSeg]) -> Option<&'a JsLit> {
    match node_at(expr, path)? {
        JsExpr::Lit(lit) => Some(lit),
        _ => None,
    }
}

fn node_at<'a>(expr: &'a JsExpr, path: &[JsSeg]) -> Option<&'a JsExpr> {
    let Some((seg, rest)) = path.split_first() else {
        return Some(expr);
    };
    let next: &JsExpr = match (expr, seg) {
        (JsExpr::Binop { left, .. }, JsSeg::Child("left")) => left,
        (JsExpr::Binop { right, .. }, JsSeg::Child("right")) => right,
        (JsExpr::Unary { operand, .. }, JsSeg::Child("operand")) => operand,
        (JsExpr::Call { callee, .. }, JsSeg::Child("callee")) => callee,
        (JsExpr::Call { args, .. }, JsSeg::Index(i)) => args.get(*i)?,
        (JsExpr::Method { object, .. }, JsSeg::Child("object")) => object,
        (JsExpr::Method { args, .. }, JsSeg::Index(i)) => args.get(*i)?,
        (
            JsExpr::Arrow {
                body: JsBody::Expr(body),
                ..
            },
            JsSeg::Child("body"),
        ) => body,
        (
            JsExpr::Arrow {
                body: JsBody::Block(stmts),
                ..
            },
            JsSeg::Index(i),
        ) => return stmt_node_at(stmts.get(*i)?, rest),
        (JsExpr::NamedFn { body, .. }, JsSeg::Index(i)) => {
            return stmt_node_at(body.get(*i)?, rest);
        }
        (JsExpr::Ternary { cond, .. }, JsSeg::Child("cond")) => cond,
        (JsExpr::Ternary { then_branch, .. }, JsSeg::Child("then")) => then_branch,
        (JsExpr::Ternary { else_branch, .. }, JsSeg::Child("else")) => else_branch,
        (JsExpr::Member { object, .. }, JsSeg::Child("object")) => object,
        (JsExpr::Index { object, .. }, JsSeg::Child("object")) => object,
        (JsExpr::Index { index, .. }, JsSeg::Child("index")) => index,
        (JsExpr::Object(fields), JsSeg::Index(i)) => &fields.get(*i)?.1,
        (JsExpr::Array(items), JsSeg::Index(i)) => items.get(*i)?,
        (JsExpr::Iife(stmts), JsSeg::Index(i)) => return stmt_node_at(stmts.get(*i)?, rest),
        (JsExpr::Await(operand), JsSeg::Child("operand")) => operand,
        _ => return None,
    };
    node_at(next, rest)
}

fn stmt_node_at<'a>(stmt: &'a JsStmt, path: &[JsSeg]) -> Option<&'a JsExpr> {
    let Some((seg, rest)) = path.split_first() else {
        return None;
    };
    let next: &JsExpr = match (stmt, seg) {
        (JsStmt::Const { init, .. }, JsSeg::Child("init")) => init,
        (JsStmt::Let { init: Some(init), .. }, JsSeg::Child("init")) => init,
        (JsStmt::Return(Some(value)), JsSeg::Child("value")) => value,
        (JsStmt::If { cond, .. }, JsSeg::Child("cond")) => cond,
        (JsStmt::If { then_branch, .. }, JsSeg::Child("then")) => {
            let JsSeg::Index(i) = rest.first()? else {
                return None;
            };
            return stmt_node_at(then_branch.get(*i)?, &rest[1..]);
        }
        (
            JsStmt::If {
                else_branch: Some(else_branch),
                ..
            },
            JsSeg::Child("else"),
        ) => {
            let JsSeg::Index(i) = rest.first()? else {
                return None;
            };
            return stmt_node_at(else_branch.get(*i)?, &rest[1..]);
        }
        (JsStmt::ForOf { iterable, .. }, JsSeg::Child("iterable")) => iterable,
        (JsStmt::ForOf { body, .. }, JsSeg::Child("body")) => {
            let JsSeg::Index(i) = rest.first()? else {
                return None;
            };
            return stmt_node_at(body.get(*i)?, &rest[1..]);
        }
        (JsStmt::Expr(expr), JsSeg::Child("expr")) => expr,
        (JsStmt::ConstPattern { init, .. }, JsSeg::Child("init")) => init,
        (JsStmt::Throw(value), JsSeg::Child("value")) => value,
        _ => return None,
    };
    node_at(next, rest)
}

/// Replace the node at `path` with `replacement`. Returns false when the
/// path does not resolve.
fn replace_at(expr: &mut JsExpr, path: &[JsSeg], replacement: JsExpr) -> bool {
    let Some((seg, rest)) = path.split_first() else {
        *expr = replacement;
        return true;
    };
    match (expr, seg) {
        (JsExpr::Binop { left, .. }, JsSeg::Child("left")) => replace_at(left, rest, replacement),
        (JsExpr::Binop { right, .. }, JsSeg::Child("right")) => {
            replace_at(right, rest, replacement)
        }
        (JsExpr::Unary { operand, .. }, JsSeg::Child("operand")) => {
            replace_at(operand, rest, replacement)
        }
        (JsExpr::Call { callee, .. }, JsSeg::Child("callee")) => {
            replace_at(callee, rest, replacement)
        }
        (JsExpr::Call { args, .. }, JsSeg::Index(i)) => match args.get_mut(*i) {
            Some(arg) => replace_at(arg, rest, replacement),
            None => false,
        },
        (JsExpr::Method { object, .. }, JsSeg::Child("object")) => {
            replace_at(object, rest, replacement)
        }
        (JsExpr::Method { args, .. }, JsSeg::Index(i)) => match args.get_mut(*i) {
            Some(arg) => replace_at(arg, rest, replacement),
            None => false,
        },
        (
            JsExpr::Arrow {
                body: JsBody::Expr(body),
                ..
            },
            JsSeg::Child("body"),
        ) => replace_at(body, rest, replacement),
        (
            JsExpr::Arrow {
                body: JsBody::Block(stmts),
                ..
            },
            JsSeg::Index(i),
        ) => match stmts.get_mut(*i) {
            Some(stmt) => replace_in_stmt(stmt, rest, replacement),
            None => false,
        },
        (JsExpr::NamedFn { body, .. }, JsSeg::Index(i)) => match body.get_mut(*i) {
            Some(stmt) => replace_in_stmt(stmt, rest, replacement),
            None => false,
        },
        (JsExpr::Ternary { cond, .. }, JsSeg::Child("cond")) => replace_at(cond, rest, replacement),
        (JsExpr::Ternary { then_branch, .. }, JsSeg::Child("then")) => {
            replace_at(then_branch, rest, replacement)
        }
        (JsExpr::Ternary { else_branch, .. }, JsSeg::Child("else")) => {
            replace_at(else_branch, rest, replacement)
        }
        (JsExpr::Member { object, .. }, JsSeg::Child("object")) => {
            replace_at(object, rest, replacement)
        }
        (JsExpr::Index { object, .. }, JsSeg::Child("object")) => {
            replace_at(object, rest, replacement)
        }
        (JsExpr::Index { index, .. }, JsSeg::Child("index")) => {
            replace_at(index, rest, replacement)
        }
        (JsExpr::Object(fields), JsSeg::Index(i)) => match fields.get_mut(*i) {
            Some((_, value)) => replace_at(value, rest, replacement),
            None => false,
        },
        (JsExpr::Array(items), JsSeg::Index(i)) => match items.get_mut(*i) {
            Some(item) => replace_at(item, rest, replacement),
            None => false,
        },
        (JsExpr::Iife(stmts), JsSeg::Index(i)) => match stmts.get_mut(*i) {
            Some(stmt) => replace_in_stmt(stmt, rest, replacement),
            None => false,
        },
        (JsExpr::Await(operand), JsSeg::Child("operand")) => {
            replace_at(operand, rest, replacement)
        }
        _ => false,
    }
}

fn replace_in_stmt(stmt: &mut JsStmt, path: &[JsSeg], replacement: JsExpr) -> bool {
    let Some((seg, rest)) = path.split_first() else {
        return false;
    };
    match (stmt, seg) {
        (JsStmt::Const { init, .. }, JsSeg::Child("init")) => replace_at(init, rest, replacement),
        (JsStmt::Let { init: Some(init), .. }, JsSeg::Child("init")) => {
            replace_at(init, rest, replacement)
        }
        (JsStmt::Return(Some(value)), JsSeg::Child("value")) => {
            replace_at(value, rest, replacement)
        }
        (JsStmt::If { cond, .. }, JsSeg::Child("cond")) => replace_at(cond, rest, replacement),
        (JsStmt::If { then_branch, .. }, JsSeg::Child("then")) => {
            let Some(JsSeg::Index(i)) = rest.first() else {
                return false;
            };
            match then_branch.get_mut(*i) {
                Some(stmt) => replace_in_stmt(stmt, &rest[1..], replacement),
                None => false,
            }
        }
        (
            JsStmt::If {
                else_branch: Some(else_branch),
                ..
            },
            JsSeg::Child("else"),
        ) => {
            let Some(JsSeg::Index(i)) = rest.first() else {
                return false;
            };
            match else_branch.get_mut(*i) {
                Some(stmt) => replace_in_stmt(stmt, &rest[1..], replacement),
                None => false,
            }
        }
        (JsStmt::ForOf { iterable, .. }, JsSeg::Child("iterable")) => {
            replace_at(iterable, rest, replacement)
        }
        (JsStmt::ForOf { body, .. }, JsSeg::Child("body")) => {
            let Some(JsSeg::Index(i)) = rest.first() else {
                return false;
            };
            match body.get_mut(*i) {
                Some(stmt) => replace_in_stmt(stmt, &rest[1..], replacement),
                None => false,
            }
        }
        (JsStmt::Expr(expr), JsSeg::Child("expr")) => replace_at(expr, rest, replacement),
        (JsStmt::ConstPattern { init, .. }, JsSeg::Child("init")) => {
            replace_at(init, rest, replacement)
        }
        (JsStmt::Throw(value), JsSeg::Child("value")) => replace_at(value, rest, replacement),
        _ => false,
    }
}

// =============================================================================
// Parameter mapping and template application
// =============================================================================

/// Map each hole to a parameter index: two holes share a parameter iff
/// their observed literal vectors agree on every member. Parameters are
/// assigned greedily in hole order.
pub fn compute_parameter_mapping(cluster: &Cluster) -> Result<Vec<usize>, ClusterError> {
    // vectors[h] = the literal observed at hole h in each member.
    let mut vectors: Vec<Vec<JsLit>> = Vec::with_capacity(cluster.holes.len());
    for hole in &cluster.holes {
        let mut vector = Vec::with_capacity(cluster.members.len());
        for member in &cluster.members {
            let Some(lit) = lit_at(&member.expr, hole) else {
                return Err(ClusterError::ExtractError(format!(
                    "hole {hole:?} does not address a literal in member {}",
                    member.index
                )));
            };
            vector.push(lit.clone());
        }
        vectors.push(vector);
    }
    let mut mapping: Vec<usize> = Vec::with_capacity(cluster.holes.len());
    let mut assigned: Vec<usize> = Vec::new(); // representative hole per parameter
    for (h, vector) in vectors.iter().enumerate() {
        match assigned.iter().position(|&rep| vectors[rep] == *vector) {
            Some(param) => mapping.push(param),
            None => {
                mapping.push(assigned.len());
                assigned.push(h);
            }
        }
    }
    Ok(mapping)
}

/// Rewrite the canonical member, replacing the literal at each hole with
/// a reference to its assigned parameter.
pub fn apply_template(
    expr: &JsExpr,
    holes: &[JsPath],
    mapping: &[usize],
    param_names: &[String],
) -> Result<JsExpr, ClusterError> {
    let mut out = expr.clone();
    for (h, hole) in holes.iter().enumerate() {
        if lit_at(&out, hole).is_none() {
            return Err(ClusterError::ExtractError(format!(
                "hole {hole:?} does not address a literal"
            )));
        }
        let param = mapping.get(h).copied().unwrap_or(h);
        let name = param_names
            .get(param)
            .cloned()
            .unwrap_or_else(|| format!("k{param}"));
        if !replace_at(&mut out, hole, JsExpr::Var(name)) {
            return Err(ClusterError::ExtractError(format!(
                "hole {hole:?} could not be rewritten"
            )));
        }
    }
    Ok(out)
}

// =============================================================================
// Statement-stream clustering
// =============================================================================

/// Group residual function definitions (`const f = <function>`) by
/// signature, refine by pairwise comparison against the first member, and
/// rewrite clusters of two or more as a shared template definition plus
/// thin per-member wrappers. Other statements pass through untouched.
pub fn cluster_statements(stmts: Vec<JsStmt>, next_id: &mut u32) -> Vec<JsStmt> {
    // Collect candidates: function-shaped const initializers.
    let mut groups: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for (i, stmt) in stmts.iter().enumerate() {
        if let JsStmt::Const { init, .. } = stmt
            && matches!(init, JsExpr::Arrow { .. } | JsExpr::NamedFn { .. })
        {
            groups.entry(signature(init)).or_default().push(i);
        }
    }

    // Refine each signature group into clusters via pairwise comparison
    // against the first member; holes accumulate as the union of the
    // observed divergences.
    let mut rewrites: FxHashMap<usize, JsStmt> = FxHashMap::default();
    let mut prologues: FxHashMap<usize, Vec<JsStmt>> = FxHashMap::default();
    let mut group_keys: Vec<&String> = groups.keys().collect();
    group_keys.sort();
    for key in group_keys {
        let indices = &groups[key];
        if indices.len() < 2 {
            continue;
        }
        let mut clusters: Vec<Cluster> = Vec::new();
        'member: for &i in indices {
            let JsStmt::Const { name, init } = &stmts[i] else {
                continue;
            };
            for cluster in &mut clusters {
                let first = &cluster.members[0].expr;
                if let Some(holes) = compare_js_exprs(first, init) {
                    for h in holes {
                        if !cluster.holes.contains(&h) {
                            cluster.holes.push(h);
                        }
                    }
                    cluster.members.push(ClusterMember {
                        index: i,
                        name: name.clone(),
                        expr: init.clone(),
                    });
                    continue 'member;
                }
            }
            clusters.push(Cluster {
                members: vec![ClusterMember {
                    index: i,
                    name: name.clone(),
                    expr: init.clone(),
                }],
                holes: vec![],
                signature: key.clone(),
            });
        }

        for mut cluster in clusters {
            if cluster.members.len() < 2 {
                continue;
            }
            // Hole order must be canonical (pre-order) regardless of the
            // order members were compared in.
            cluster.holes.sort_by(path_order);
            match emit_cluster(&cluster, next_id) {
                Ok((template_stmts, member_rewrites)) => {
                    debug!(
                        members = cluster.members.len(),
                        holes = cluster.holes.len(),
                        "cluster rewritten"
                    );
                    let anchor = cluster.members[0].index;
                    prologues.entry(anchor).or_default().extend(template_stmts);
                    for (i, stmt) in member_rewrites {
                        rewrites.insert(i, stmt);
                    }
                }
                Err(err) => {
                    // Clustering is an optimization; on extraction failure
                    // leave the members as written.
                    debug!(%err, "cluster skipped");
                }
            }
        }
    }

    let mut out = Vec::with_capacity(stmts.len());
    for (i, stmt) in stmts.into_iter().enumerate() {
        if let Some(prologue) = prologues.remove(&i) {
            out.extend(prologue);
        }
        match rewrites.remove(&i) {
            Some(rewritten) => out.push(rewritten),
            None => out.push(stmt),
        }
    }
    out
}

fn path_order(a: &JsPath, b: &JsPath) -> std::cmp::Ordering {
    let key = |p: &JsPath| {
        p.iter()
            .map(|seg| match seg {
                JsSeg::Child(name) => format!("c:{name}"),
                JsSeg::Index(i) => format!("i:{i:08}"),
            })
            .collect::<Vec<_>>()
    };
    key(a).cmp(&key(b))
}

/// Emit the template definition and the per-member rewrites for one
/// cluster.
fn emit_cluster(
    cluster: &Cluster,
    next_id: &mut u32,
) -> Result<(Vec<JsStmt>, Vec<(usize, JsStmt)>), ClusterError> {
    let template_name = format!("__tpl{}", *next_id);
    *next_id += 1;

    let mapping = compute_parameter_mapping(cluster)?;
    let param_count = mapping.iter().copied().max().map_or(0, |m| m + 1);
    let hole_params: Vec<String> = (0..param_count).map(|p| format!("__k{p}")).collect();

    let canonical = &cluster.members[0].expr;
    let mut template = apply_template(canonical, &cluster.holes, &mapping, &hole_params)?;

    let mut rewrites = Vec::with_capacity(cluster.members.len());
    if cluster.holes.is_empty() {
        // Identical members: one definition, aliases for the rest.
        for member in &cluster.members {
            rewrites.push((
                member.index,
                JsStmt::Const {
                    name: member.name.clone(),
                    init: JsExpr::Var(template_name.clone()),
                },
            ));
        }
        let template_stmt = JsStmt::Const {
            name: template_name,
            init: template,
        };
        return Ok((vec![template_stmt], rewrites));
    }

    // Parameterized template: append the hole parameters to the function
    // signature and have each member forward its own literals.
    let (original_params, is_async) = match &mut template {
        JsExpr::Arrow {
            params, is_async, ..
        } => {
            let original = params.clone();
            params.extend(hole_params.iter().cloned());
            (original, *is_async)
        }
        JsExpr::NamedFn {
            params, is_async, ..
        } => {
            let original = params.clone();
            params.extend(hole_params.iter().cloned());
            (original, *is_async)
        }
        _ => {
            return Err(ClusterError::ExtractError(
                "cluster member is not a function".to_string(),
            ));
        }
    };

    for member in &cluster.members {
        // The literal this member passes for each template parameter is
        // read off its representative hole.
        let mut hole_values: Vec<JsExpr> = Vec::with_capacity(param_count);
        for p in 0..param_count {
            let h = mapping
                .iter()
                .position(|&m| m == p)
                .ok_or_else(|| ClusterError::ExtractError("unused parameter".to_string()))?;
            let lit = lit_at(&member.expr, &cluster.holes[h]).ok_or_else(|| {
                ClusterError::ExtractError(format!(
                    "hole {:?} does not address a literal in member {}",
                    cluster.holes[h], member.index
                ))
            })?;
            hole_values.push(JsExpr::Lit(lit.clone()));
        }
        let mut call_args: Vec<JsExpr> =
            original_params.iter().cloned().map(JsExpr::Var).collect();
        call_args.extend(hole_values);
        let wrapper = JsExpr::Arrow {
            params: original_params.clone(),
            body: JsBody::Expr(Box::new(JsExpr::Call {
                callee: Box::new(JsExpr::Var(template_name.clone())),
                args: call_args,
            })),
            is_async,
        };
        rewrites.push((
            member.index,
            JsStmt::Const {
                name: member.name.clone(),
                init: wrapper,
            },
        ));
    }

    let template_stmt = JsStmt::Const {
        name: template_name,
        init: template,
    };
    Ok((vec![template_stmt], rewrites))
}
