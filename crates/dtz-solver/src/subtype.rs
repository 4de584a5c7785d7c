//! Structural subtyping.
//!
//! `is_subtype(a, b)` decides whether every value of `a` is a value of
//! `b`. The relation is depth-guarded: past `MAX_SUBTYPE_DEPTH` it answers
//! a conservative `false` instead of overflowing the stack.

use crate::types::{Prim, Type};
use dtz_common::limits::MAX_SUBTYPE_DEPTH;
use tracing::trace;

/// Decide `a <= b`.
pub fn is_subtype(a: &Type, b: &Type) -> bool {
    subtype_at(a, b, 0)
}

fn subtype_at(a: &Type, b: &Type, depth: u32) -> bool {
    if depth > MAX_SUBTYPE_DEPTH {
        trace!("subtype depth limit hit; answering false");
        return false;
    }
    // Metadata is transparent for subtyping.
    let a = a.unwrap_metadata();
    let b = b.unwrap_metadata();

    if a == b {
        return true;
    }

    // Bottom and top.
    if matches!(a, Type::Primitive(Prim::Never)) {
        return true;
    }
    if matches!(b, Type::Primitive(Prim::Unknown | Prim::Any)) {
        return true;
    }

    // Union on the left: every member must fit.
    if let Type::Union(members) = a {
        return members.iter().all(|m| subtype_at(m, b, depth + 1));
    }
    // Intersection on the right: must fit every member.
    if let Type::Intersection(members) = b {
        return members.iter().all(|m| subtype_at(a, m, depth + 1));
    }
    // Union on the right: fits some member.
    if let Type::Union(members) = b {
        return members.iter().any(|m| subtype_at(a, m, depth + 1));
    }
    // Intersection on the left: some member fits.
    if let Type::Intersection(members) = a {
        return members.iter().any(|m| subtype_at(m, b, depth + 1));
    }

    match (a, b) {
        (Type::Primitive(pa), Type::Primitive(pb)) => prim_subtype(*pa, *pb),
        // A literal fits its base (and anything the base widens to).
        (Type::Literal(_, base), Type::Primitive(_)) => {
            subtype_at(&Type::Primitive(*base), b, depth + 1)
        }
        (Type::Literal(va, ba), Type::Literal(vb, bb)) => va == vb && ba == bb,

        (
            Type::Record {
                fields: fa,
                index_type: ia,
                closed: _,
            },
            Type::Record {
                fields: fb,
                index_type: ib,
                closed: closed_b,
            },
        ) => {
            // Width + depth: every field of B must be satisfied by A.
            for (name, field_b) in fb {
                match fa.get(name) {
                    Some(field_a) => {
                        if !subtype_at(&field_a.ty, &field_b.ty, depth + 1) {
                            return false;
                        }
                        // An optional field cannot satisfy a required one.
                        if field_a.optional && !field_b.optional {
                            return false;
                        }
                    }
                    None => {
                        if !field_b.optional {
                            return false;
                        }
                    }
                }
            }
            // Extra fields of A must be admitted by B when B is closed or
            // carries an index type.
            let extras = fa.iter().filter(|(name, _)| !fb.contains_key(*name));
            if *closed_b {
                match ib {
                    Some(index) => {
                        for (_, field_a) in extras {
                            if !subtype_at(&field_a.ty, index, depth + 1) {
                                return false;
                            }
                        }
                    }
                    None => {
                        if extras.count() > 0 {
                            return false;
                        }
                    }
                }
            } else if let Some(index) = ib {
                for (_, field_a) in extras {
                    if !subtype_at(&field_a.ty, index, depth + 1) {
                        return false;
                    }
                }
                // A's own index type must be at least as precise.
                if let Some(index_a) = ia
                    && !subtype_at(index_a, index, depth + 1)
                {
                    return false;
                }
            }
            true
        }

        (
            Type::Array {
                elements: ea,
                variadic: va,
            },
            Type::Array {
                elements: eb,
                variadic: vb,
            },
        ) => match (va, vb) {
            (true, true) => match (ea.first(), eb.first()) {
                (Some(a), Some(b)) => subtype_at(a, b, depth + 1),
                _ => ea.is_empty() && eb.is_empty(),
            },
            // Tuple of length n fits T[] iff each element fits T.
            (false, true) => match eb.first() {
                Some(elem_b) => ea.iter().all(|e| subtype_at(e, elem_b, depth + 1)),
                None => false,
            },
            // A variadic array has unknown length; it never fits a tuple.
            (true, false) => false,
            (false, false) => {
                ea.len() == eb.len()
                    && ea
                        .iter()
                        .zip(eb)
                        .all(|(a, b)| subtype_at(a, b, depth + 1))
            }
        },

        (
            Type::Function {
                params: pa,
                return_type: ra,
                is_async: aa,
            },
            Type::Function {
                params: pb,
                return_type: rb,
                is_async: ab,
            },
        ) => {
            if aa != ab {
                return false;
            }
            // A must accept any call B's signature allows: no more required
            // parameters than B provides, contravariant in each shared
            // position, covariant in the result.
            let required_a = pa.iter().filter(|p| !p.optional).count();
            if required_a > pb.len() {
                return false;
            }
            for (param_a, param_b) in pa.iter().zip(pb) {
                if !subtype_at(&param_b.ty, &param_a.ty, depth + 1) {
                    return false;
                }
            }
            subtype_at(ra, rb, depth + 1)
        }

        // Brands are fully opaque: only the identical branded type fits,
        // with no variance in the base.
        (
            Type::Branded {
                base: base_a,
                brand: brand_a,
            },
            Type::Branded {
                base: base_b,
                brand: brand_b,
            },
        ) => brand_a == brand_b && base_a == base_b,

        // Type-of-type values: covariant in the bound.
        (Type::Bounded(bound_a), Type::Bounded(bound_b)) => {
            subtype_at(bound_a, bound_b, depth + 1)
        }
        (Type::Bounded(_), Type::Primitive(Prim::Type)) => true,

        _ => false,
    }
}

fn prim_subtype(a: Prim, b: Prim) -> bool {
    a == b || matches!((a, b), (Prim::Int | Prim::Float, Prim::Number))
}
