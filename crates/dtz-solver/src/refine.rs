//! Guard refinement extraction.
//!
//! Given a boolean condition, derive what holds about each named variable
//! when the condition is true. The else edge uses the per-variable
//! negation of the same extraction. Shapes the extractor does not
//! recognize refine nothing - extraction never fails.

use crate::constraint::{Constraint, negate, simplify};
use crate::types::LitValue;
use dtz_ast::{BinaryOp, Expr, ExprKind, Lit, UnaryOp};
use rustc_hash::FxHashMap;

/// What a guard teaches us: a constraint per refined variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Refinement {
    facts: FxHashMap<String, Constraint>,
}

impl Refinement {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(name: impl Into<String>, c: Constraint) -> Self {
        let mut facts = FxHashMap::default();
        facts.insert(name.into(), c);
        Self { facts }
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Constraint> {
        self.facts.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Constraint)> {
        self.facts.iter()
    }

    /// Conjoin another refinement into this one (`a && b` merging).
    pub fn merge(&mut self, other: Refinement) {
        for (name, c) in other.facts {
            match self.facts.remove(&name) {
                Some(existing) => {
                    self.facts
                        .insert(name, simplify(&Constraint::And(vec![existing, c])));
                }
                None => {
                    self.facts.insert(name, c);
                }
            }
        }
    }
}

/// The well-known type-guard callees and their classifications.
fn guard_classification(name: &str) -> Option<Constraint> {
    match name {
        "isNumber" => Some(Constraint::IsNumber),
        "isString" => Some(Constraint::IsString),
        "isBool" => Some(Constraint::IsBool),
        "isNull" => Some(Constraint::IsNull),
        "isObject" => Some(Constraint::IsObject),
        "isArray" => Some(Constraint::IsArray),
        "isFunction" => Some(Constraint::IsFunction),
        _ => None,
    }
}

fn lit_value(lit: &Lit) -> LitValue {
    match lit {
        Lit::Int(n) => LitValue::Int(*n),
        Lit::Float(n) => LitValue::Float(*n),
        Lit::Str(s) => LitValue::Str(s.clone()),
        Lit::Bool(b) => LitValue::Bool(*b),
        Lit::Null => LitValue::Null,
        Lit::Undefined => LitValue::Undefined,
    }
}

/// Extract the refinement that holds when `cond` is true.
pub fn extract_refinement(cond: &Expr) -> Refinement {
    match &cond.kind {
        ExprKind::Binary { op, left, right } => extract_binary(*op, left, right),
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand,
        } => negate_refinement(&extract_refinement(operand)),
        ExprKind::Call { callee, args } => extract_guard_call(callee, args),
        _ => Refinement::empty(),
    }
}

/// Per-variable negation of a refinement (the else edge of a guard).
pub fn negate_refinement(r: &Refinement) -> Refinement {
    let mut out = Refinement::empty();
    for (name, c) in r.iter() {
        out.facts.insert(name.clone(), simplify(&negate(c)));
    }
    out
}

fn extract_binary(op: BinaryOp, left: &Expr, right: &Expr) -> Refinement {
    if op == BinaryOp::And {
        let mut r = extract_refinement(left);
        r.merge(extract_refinement(right));
        return r;
    }

    // `x op lit` and the reflected `lit op x`.
    let (subject, lit, op) = match (&left.kind, &right.kind) {
        (_, ExprKind::Literal(lit)) => (left, lit, op),
        (ExprKind::Literal(lit), _) => (right, lit, reflect(op)),
        _ => return Refinement::empty(),
    };

    let constraint = match (op, lit_value(lit).as_number()) {
        (BinaryOp::Eq, _) => Constraint::Equals(lit_value(lit)),
        (BinaryOp::Ne, _) => Constraint::Not(Box::new(Constraint::Equals(lit_value(lit)))),
        (BinaryOp::Lt, Some(n)) => Constraint::Lt(n),
        (BinaryOp::Lte, Some(n)) => Constraint::Lte(n),
        (BinaryOp::Gt, Some(n)) => Constraint::Gt(n),
        (BinaryOp::Gte, Some(n)) => Constraint::Gte(n),
        _ => return Refinement::empty(),
    };

    match &subject.kind {
        ExprKind::Ident(name) => Refinement::single(name.clone(), constraint),
        // Discriminant field: `obj.field == lit` refines `obj`.
        ExprKind::Property { object, name, .. } => match &object.kind {
            ExprKind::Ident(obj_name) => Refinement::single(
                obj_name.clone(),
                Constraint::HasField(name.clone(), Box::new(constraint)),
            ),
            _ => Refinement::empty(),
        },
        _ => Refinement::empty(),
    }
}

/// `lit op x` reads as `x (flip op) lit`.
fn reflect(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Lte => BinaryOp::Gte,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Gte => BinaryOp::Lte,
        other => other,
    }
}

fn extract_guard_call(callee: &Expr, args: &[dtz_ast::Arg]) -> Refinement {
    let ExprKind::Ident(fn_name) = &callee.kind else {
        return Refinement::empty();
    };
    let Some(classification) = guard_classification(fn_name) else {
        return Refinement::empty();
    };
    match args {
        [arg] if !arg.spread => match &arg.expr.kind {
            ExprKind::Ident(name) => Refinement::single(name.clone(), classification),
            _ => Refinement::empty(),
        },
        _ => Refinement::empty(),
    }
}
