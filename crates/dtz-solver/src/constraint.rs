//! The constraint algebra.
//!
//! Constraints are the boolean-reasoning view of types: classification
//! predicates, exact-value equalities, numeric bounds, structural field and
//! element predicates, and the logical combinators over them. The algebra
//! provides canonicalization (`simplify`), a decision procedure for
//! implication (`implies`), and negation with bound inversion (`negate`).
//!
//! Canonical form after `simplify`:
//! - `and`/`or` are flat (never directly nested in their own tag),
//!   duplicate-free, and sorted by a stable key;
//! - `any` is the identity of `and` and annihilates `or`; dually for
//!   `never`;
//! - contradictory conjunctions collapse to `never`.
//!
//! `implies` is best-effort: for shapes it cannot decide it answers
//! `false`, never panics.

use crate::types::{LitValue, Prim};
use dtz_common::limits::MAX_SIMPLIFY_DEPTH;
use smallvec::SmallVec;
use tracing::trace;

/// A refinement predicate over a single value.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    // Classifications - pairwise disjoint.
    IsNumber,
    IsString,
    IsBool,
    IsNull,
    IsObject,
    IsArray,
    IsFunction,
    /// Exact primitive value.
    Equals(LitValue),
    // Numeric bounds.
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    // Structural predicates.
    HasField(String, Box<Constraint>),
    Elements(Box<Constraint>),
    ElementAt(usize, Box<Constraint>),
    Length(Box<Constraint>),
    // Logical combinators.
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
    Not(Box<Constraint>),
    /// Bottom: satisfied by nothing.
    Never,
    /// Top: satisfied by everything.
    Any,
    /// Inference variable; opaque to the algebra.
    CVar(u32),
}

impl Constraint {
    pub fn and(cs: Vec<Constraint>) -> Constraint {
        simplify(&Constraint::And(cs))
    }

    pub fn or(cs: Vec<Constraint>) -> Constraint {
        simplify(&Constraint::Or(cs))
    }

    pub fn has_field(name: impl Into<String>, c: Constraint) -> Constraint {
        Constraint::HasField(name.into(), Box::new(c))
    }

    /// The classification a literal value satisfies, if any.
    /// `undefined` satisfies no classification.
    pub fn classification_of(lit: &LitValue) -> Option<Constraint> {
        match lit.base() {
            Prim::Int | Prim::Float => Some(Constraint::IsNumber),
            Prim::String => Some(Constraint::IsString),
            Prim::Boolean => Some(Constraint::IsBool),
            Prim::Null => Some(Constraint::IsNull),
            _ => None,
        }
    }

    fn is_classification(&self) -> bool {
        matches!(
            self,
            Constraint::IsNumber
                | Constraint::IsString
                | Constraint::IsBool
                | Constraint::IsNull
                | Constraint::IsObject
                | Constraint::IsArray
                | Constraint::IsFunction
        )
    }

    fn is_bound(&self) -> bool {
        matches!(
            self,
            Constraint::Gt(_) | Constraint::Gte(_) | Constraint::Lt(_) | Constraint::Lte(_)
        )
    }

    /// Stable ordering key used to canonicalize `and`/`or` member order.
    fn sort_key(&self) -> String {
        self.to_string()
    }
}

// =============================================================================
// Simplification
// =============================================================================

/// Canonicalize a constraint. Total: never fails, never panics.
pub fn simplify(c: &Constraint) -> Constraint {
    simplify_at(c, 0)
}

fn simplify_at(c: &Constraint, depth: u32) -> Constraint {
    if depth > MAX_SIMPLIFY_DEPTH {
        // Non-canonical but sound; implication just gets less precise.
        return c.clone();
    }
    match c {
        Constraint::And(cs) => simplify_and(cs, depth),
        Constraint::Or(cs) => simplify_or(cs, depth),
        Constraint::Not(inner) => negate(&simplify_at(inner, depth + 1)),
        Constraint::HasField(name, inner) => {
            let inner = simplify_at(inner, depth + 1);
            if inner == Constraint::Never {
                // No value can have a field satisfying `never`.
                Constraint::Never
            } else {
                Constraint::HasField(name.clone(), Box::new(inner))
            }
        }
        Constraint::Elements(inner) => {
            // `elements(never)` is satisfiable by the empty array; keep it.
            Constraint::Elements(Box::new(simplify_at(inner, depth + 1)))
        }
        Constraint::ElementAt(i, inner) => {
            let inner = simplify_at(inner, depth + 1);
            if inner == Constraint::Never {
                Constraint::Never
            } else {
                Constraint::ElementAt(*i, Box::new(inner))
            }
        }
        Constraint::Length(inner) => {
            let inner = simplify_at(inner, depth + 1);
            if inner == Constraint::Never {
                Constraint::Never
            } else {
                Constraint::Length(Box::new(inner))
            }
        }
        atom => atom.clone(),
    }
}

fn simplify_and(cs: &[Constraint], depth: u32) -> Constraint {
    // Recurse, then flatten nested `and`s into one level.
    let mut flat: Vec<Constraint> = Vec::with_capacity(cs.len());
    for c in cs {
        match simplify_at(c, depth + 1) {
            Constraint::And(inner) => flat.extend(inner),
            Constraint::Any => {}
            Constraint::Never => return Constraint::Never,
            c => flat.push(c),
        }
    }

    // Merge same-field / same-index structural predicates by conjunction.
    if let Some(merged) = merge_structural(&mut flat, depth) {
        return merged;
    }

    // Merge bounds: lower bounds by max, upper bounds by min.
    if flat.iter().filter(|c| c.is_bound()).count() > 1 {
        let interval = interval_of(&flat);
        flat.retain(|c| !c.is_bound());
        if let Some((lo, strict)) = interval.lower {
            flat.push(if strict {
                Constraint::Gt(lo)
            } else {
                Constraint::Gte(lo)
            });
        }
        if let Some((hi, strict)) = interval.upper {
            flat.push(if strict {
                Constraint::Lt(hi)
            } else {
                Constraint::Lte(hi)
            });
        }
    }

    // Deduplicate.
    let mut members: Vec<Constraint> = Vec::with_capacity(flat.len());
    for c in flat {
        if !members.contains(&c) {
            members.push(c);
        }
    }

    if has_contradiction(&members) {
        trace!(constraint = %Constraint::And(members.clone()), "conjunction collapsed to never");
        return Constraint::Never;
    }

    members.sort_by_key(|c| c.sort_key());
    match members.len() {
        0 => Constraint::Any,
        1 => members.pop().unwrap_or(Constraint::Any),
        _ => Constraint::And(members),
    }
}

fn simplify_or(cs: &[Constraint], depth: u32) -> Constraint {
    let mut flat: Vec<Constraint> = Vec::with_capacity(cs.len());
    for c in cs {
        match simplify_at(c, depth + 1) {
            Constraint::Or(inner) => flat.extend(inner),
            Constraint::Never => {}
            Constraint::Any => return Constraint::Any,
            c => flat.push(c),
        }
    }
    let mut members: Vec<Constraint> = Vec::with_capacity(flat.len());
    for c in flat {
        if !members.contains(&c) {
            members.push(c);
        }
    }
    members.sort_by_key(|c| c.sort_key());
    match members.len() {
        0 => Constraint::Never,
        1 => members.pop().unwrap_or(Constraint::Never),
        _ => Constraint::Or(members),
    }
}

/// Merge `hasField` predicates on the same field name (and `elements` /
/// `elementAt` / `length` pairs) by recursive conjunction. Returns
/// `Some(Never)` when a merge collapses.
fn merge_structural(flat: &mut Vec<Constraint>, depth: u32) -> Option<Constraint> {
    let mut i = 0;
    while i < flat.len() {
        let mut j = i + 1;
        while j < flat.len() {
            let conjoin = |ca: &Constraint, cb: &Constraint| {
                simplify_at(&Constraint::And(vec![ca.clone(), cb.clone()]), depth + 1)
            };
            let merged = match (&flat[i], &flat[j]) {
                (Constraint::HasField(a, ca), Constraint::HasField(b, cb)) if a == b => {
                    let inner = conjoin(ca, cb);
                    Some(if inner == Constraint::Never {
                        Constraint::Never
                    } else {
                        Constraint::HasField(a.clone(), Box::new(inner))
                    })
                }
                (Constraint::Elements(ca), Constraint::Elements(cb)) => {
                    // elements(never) stays satisfiable (by the empty array).
                    Some(Constraint::Elements(Box::new(conjoin(ca, cb))))
                }
                (Constraint::ElementAt(ia, ca), Constraint::ElementAt(ib, cb)) if ia == ib => {
                    let inner = conjoin(ca, cb);
                    Some(if inner == Constraint::Never {
                        Constraint::Never
                    } else {
                        Constraint::ElementAt(*ia, Box::new(inner))
                    })
                }
                (Constraint::Length(ca), Constraint::Length(cb)) => {
                    let inner = conjoin(ca, cb);
                    Some(if inner == Constraint::Never {
                        Constraint::Never
                    } else {
                        Constraint::Length(Box::new(inner))
                    })
                }
                _ => None,
            };
            if let Some(merged) = merged {
                if merged == Constraint::Never {
                    return Some(Constraint::Never);
                }
                flat[i] = merged;
                flat.remove(j);
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    None
}

/// Numeric interval implied by the bounds of a flattened conjunction.
#[derive(Debug, Clone, Copy, Default)]
struct Interval {
    lower: Option<(f64, bool)>, // (value, strict)
    upper: Option<(f64, bool)>,
}

impl Interval {
    fn add_lower(&mut self, v: f64, strict: bool) {
        self.lower = Some(match self.lower {
            // Higher value wins; at the same value the strict bound wins.
            Some((cur, cur_strict)) if cur > v || (cur == v && cur_strict) => (cur, cur_strict),
            _ => (v, strict),
        });
    }

    fn add_upper(&mut self, v: f64, strict: bool) {
        self.upper = Some(match self.upper {
            Some((cur, cur_strict)) if cur < v || (cur == v && cur_strict) => (cur, cur_strict),
            _ => (v, strict),
        });
    }

    fn is_empty(&self) -> bool {
        match (self.lower, self.upper) {
            (Some((lo, lo_strict)), Some((hi, hi_strict))) => {
                lo > hi || (lo == hi && (lo_strict || hi_strict))
            }
            _ => false,
        }
    }

    fn contains(&self, n: f64) -> bool {
        let above = match self.lower {
            Some((lo, true)) => n > lo,
            Some((lo, false)) => n >= lo,
            None => true,
        };
        let below = match self.upper {
            Some((hi, true)) => n < hi,
            Some((hi, false)) => n <= hi,
            None => true,
        };
        above && below
    }
}

fn interval_of(members: &[Constraint]) -> Interval {
    let mut iv = Interval::default();
    for c in members {
        match c {
            Constraint::Gt(n) => iv.add_lower(*n, true),
            Constraint::Gte(n) => iv.add_lower(*n, false),
            Constraint::Lt(n) => iv.add_upper(*n, true),
            Constraint::Lte(n) => iv.add_upper(*n, false),
            _ => {}
        }
    }
    iv
}

/// Contradiction scan over a flattened, deduplicated conjunction.
fn has_contradiction(members: &[Constraint]) -> bool {
    // (i) Two distinct classifications are disjoint.
    let classifications: SmallVec<[&Constraint; 4]> =
        members.iter().filter(|c| c.is_classification()).collect();
    if classifications.len() > 1 {
        return true;
    }

    // (ii) Two distinct equalities.
    let equalities: SmallVec<[&LitValue; 4]> = members
        .iter()
        .filter_map(|c| match c {
            Constraint::Equals(v) => Some(v),
            _ => None,
        })
        .collect();
    if equalities.len() > 1 {
        return true;
    }

    // (iii) An equality whose value fails a classification in the conjunction.
    if let Some(value) = equalities.first() {
        let value_class = Constraint::classification_of(value);
        for class in &classifications {
            if value_class.as_ref() != Some(*class) {
                return true;
            }
        }
    }

    // (iv) Empty bound interval.
    let interval = interval_of(members);
    if interval.is_empty() {
        return true;
    }

    // (v) An equality outside the bounds (non-numbers fail any bound).
    if let Some(value) = equalities.first()
        && members.iter().any(|c| c.is_bound())
    {
        match value.as_number() {
            Some(n) => {
                if !interval.contains(n) {
                    return true;
                }
            }
            None => return true,
        }
    }

    // A positive fact alongside the negation of something it entails.
    for member in members {
        if let Constraint::Not(negated) = member {
            for other in members {
                if !matches!(other, Constraint::Not(_)) && implies_canon(other, negated) {
                    return true;
                }
            }
        }
    }

    false
}

// =============================================================================
// Implication
// =============================================================================

/// Decide `a ⊨ b`: every value satisfying `a` also satisfies `b`.
/// Best-effort: returns `false` for undecidable shapes, never panics.
pub fn implies(a: &Constraint, b: &Constraint) -> bool {
    let a = simplify(a);
    let b = simplify(b);
    implies_canon(&a, &b)
}

fn implies_canon(a: &Constraint, b: &Constraint) -> bool {
    if a == b {
        return true;
    }
    if *b == Constraint::Any || *a == Constraint::Never {
        return true;
    }
    if *a == Constraint::Any || *b == Constraint::Never {
        return false;
    }

    // Logical structure, strongest rules first.
    if let Constraint::And(bs) = b {
        return bs.iter().all(|bc| implies_canon(a, bc));
    }
    if let Constraint::Or(branches) = a {
        return branches.iter().all(|ac| implies_canon(ac, b));
    }
    if let Constraint::Or(bs) = b {
        return bs.iter().any(|bc| implies_canon(a, bc));
    }
    if let Constraint::And(conjuncts) = a {
        return conjuncts.iter().any(|ac| implies_canon(ac, b));
    }

    // Contrapositive between negations: !x ⊨ !y iff y ⊨ x.
    if let (Constraint::Not(na), Constraint::Not(nb)) = (a, b) {
        return implies_canon(nb, na);
    }
    // A positive fact implies a negation when the two are disjoint.
    if let Constraint::Not(nb) = b {
        return disjoint(a, nb);
    }

    match (a, b) {
        // equals ⊨ classification iff the value's kind matches.
        (Constraint::Equals(v), b) if b.is_classification() => {
            Constraint::classification_of(v).as_ref() == Some(b)
        }
        // equals ⊨ bound by evaluating the comparison.
        (Constraint::Equals(v), Constraint::Gt(k)) => v.as_number().is_some_and(|n| n > *k),
        (Constraint::Equals(v), Constraint::Gte(k)) => v.as_number().is_some_and(|n| n >= *k),
        (Constraint::Equals(v), Constraint::Lt(k)) => v.as_number().is_some_and(|n| n < *k),
        (Constraint::Equals(v), Constraint::Lte(k)) => v.as_number().is_some_and(|n| n <= *k),
        // Bound subsumption.
        (Constraint::Gt(k), Constraint::Gt(k2)) => k >= k2,
        (Constraint::Gt(k), Constraint::Gte(k2)) => k >= k2,
        (Constraint::Gte(k), Constraint::Gte(k2)) => k >= k2,
        (Constraint::Gte(k), Constraint::Gt(k2)) => k > k2,
        (Constraint::Lt(k), Constraint::Lt(k2)) => k <= k2,
        (Constraint::Lt(k), Constraint::Lte(k2)) => k <= k2,
        (Constraint::Lte(k), Constraint::Lte(k2)) => k <= k2,
        (Constraint::Lte(k), Constraint::Lt(k2)) => k < k2,
        // A bound only holds for numbers.
        (bound, Constraint::IsNumber) if bound.is_bound() => true,
        // Structural compositionality.
        (Constraint::HasField(n1, c1), Constraint::HasField(n2, c2)) => {
            n1 == n2 && implies_canon(c1, c2)
        }
        (Constraint::HasField(_, _), Constraint::IsObject) => true,
        (Constraint::Elements(c1), Constraint::Elements(c2)) => implies_canon(c1, c2),
        (Constraint::ElementAt(i1, c1), Constraint::ElementAt(i2, c2)) => {
            i1 == i2 && implies_canon(c1, c2)
        }
        (Constraint::Length(c1), Constraint::Length(c2)) => implies_canon(c1, c2),
        (Constraint::ElementAt(_, _) | Constraint::Length(_), Constraint::IsArray) => true,
        _ => false,
    }
}

/// Are `a` and `b` mutually exclusive? Used for `a ⊨ !b`.
fn disjoint(a: &Constraint, b: &Constraint) -> bool {
    simplify(&Constraint::And(vec![a.clone(), b.clone()])) == Constraint::Never
}

// =============================================================================
// Combinators
// =============================================================================

/// Conjoin and canonicalize.
pub fn unify(a: &Constraint, b: &Constraint) -> Constraint {
    simplify(&Constraint::And(vec![a.clone(), b.clone()]))
}

/// Narrow `base` by `refinement`. A disjunctive base narrows branchwise
/// (dropping branches that collapse); anything else conjoins.
pub fn narrow(base: &Constraint, refinement: &Constraint) -> Constraint {
    match simplify(base) {
        Constraint::Or(_) => narrow_or(base, refinement),
        base => unify(&base, refinement),
    }
}

/// Map each branch of an `or` through `narrow`, dropping branches that
/// reduce to `never`.
pub fn narrow_or(c: &Constraint, refinement: &Constraint) -> Constraint {
    match simplify(c) {
        Constraint::Or(branches) => Constraint::or(
            branches
                .iter()
                .map(|branch| unify(branch, refinement))
                .filter(|branch| *branch != Constraint::Never)
                .collect(),
        ),
        other => unify(&other, refinement),
    }
}

/// Negate a constraint: bound inversion, De Morgan over `and`/`or`,
/// double-negation elimination, `Not(..)` wrapping otherwise.
pub fn negate(c: &Constraint) -> Constraint {
    match c {
        Constraint::Any => Constraint::Never,
        Constraint::Never => Constraint::Any,
        Constraint::Gt(n) => Constraint::Lte(*n),
        Constraint::Gte(n) => Constraint::Lt(*n),
        Constraint::Lt(n) => Constraint::Gte(*n),
        Constraint::Lte(n) => Constraint::Gt(*n),
        Constraint::Not(inner) => (**inner).clone(),
        Constraint::And(cs) => simplify(&Constraint::Or(cs.iter().map(negate).collect())),
        Constraint::Or(cs) => simplify(&Constraint::And(cs.iter().map(negate).collect())),
        other => Constraint::Not(Box::new(other.clone())),
    }
}

/// Denotational equality, decided on canonical forms with an implication
/// cross-check for shapes canonicalization cannot unify.
pub fn constraint_equals(a: &Constraint, b: &Constraint) -> bool {
    let a = simplify(a);
    let b = simplify(b);
    a == b || (implies_canon(&a, &b) && implies_canon(&b, &a))
}

// =============================================================================
// Display
// =============================================================================

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::IsNumber => f.write_str("number"),
            Constraint::IsString => f.write_str("string"),
            Constraint::IsBool => f.write_str("bool"),
            Constraint::IsNull => f.write_str("null"),
            Constraint::IsObject => f.write_str("object"),
            Constraint::IsArray => f.write_str("array"),
            Constraint::IsFunction => f.write_str("function"),
            Constraint::Equals(v) => write!(f, "== {v}"),
            Constraint::Gt(n) => write!(f, "> {n}"),
            Constraint::Gte(n) => write!(f, ">= {n}"),
            Constraint::Lt(n) => write!(f, "< {n}"),
            Constraint::Lte(n) => write!(f, "<= {n}"),
            Constraint::HasField(name, c) => write!(f, ".{name}({c})"),
            Constraint::Elements(c) => write!(f, "elements({c})"),
            Constraint::ElementAt(i, c) => write!(f, "[{i}]({c})"),
            Constraint::Length(c) => write!(f, "length({c})"),
            Constraint::And(cs) => {
                f.write_str("(")?;
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
            Constraint::Or(cs) => {
                f.write_str("(")?;
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
            Constraint::Not(c) => write!(f, "!({c})"),
            Constraint::Never => f.write_str("never"),
            Constraint::Any => f.write_str("any"),
            Constraint::CVar(id) => write!(f, "?{id}"),
        }
    }
}
