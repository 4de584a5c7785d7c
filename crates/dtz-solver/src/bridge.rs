//! The bridge between the two views of a type.
//!
//! `type_to_constraint` projects a structural type onto the boolean
//! algebra; `constraint_to_type` rebuilds a structural type from the
//! subset of constraints that name one. `narrow_type` uses the bridge to
//! filter union branches against a refined constraint, which is how
//! guard refinements reach property access.

use crate::constraint::{Constraint, simplify, unify};
use crate::types::{Field, LitValue, Prim, Type};
use indexmap::IndexMap;

/// Project a structural type onto the constraint algebra.
pub fn type_to_constraint(t: &Type) -> Constraint {
    match t.unwrap_metadata() {
        Type::Primitive(p) => match p {
            Prim::Int | Prim::Float | Prim::Number => Constraint::IsNumber,
            Prim::String => Constraint::IsString,
            Prim::Boolean => Constraint::IsBool,
            Prim::Null => Constraint::IsNull,
            Prim::Undefined => Constraint::Equals(LitValue::Undefined),
            Prim::Never => Constraint::Never,
            // Unknown/Any and the type of types carry no runtime predicate.
            Prim::Unknown | Prim::Any | Prim::Type => Constraint::Any,
        },
        Type::Literal(v, _) => Constraint::Equals(v.clone()),
        Type::Record { fields, .. } => {
            let mut cs = vec![Constraint::IsObject];
            for (name, field) in fields {
                if !field.optional {
                    cs.push(Constraint::HasField(
                        name.clone(),
                        Box::new(type_to_constraint(&field.ty)),
                    ));
                }
            }
            Constraint::and(cs)
        }
        Type::Array { elements, variadic } => {
            let mut cs = vec![Constraint::IsArray];
            if *variadic {
                if let Some(elem) = elements.first() {
                    cs.push(Constraint::Elements(Box::new(type_to_constraint(elem))));
                }
            } else {
                cs.push(Constraint::Length(Box::new(Constraint::Equals(
                    LitValue::Int(elements.len() as i64),
                ))));
                for (i, elem) in elements.iter().enumerate() {
                    cs.push(Constraint::ElementAt(i, Box::new(type_to_constraint(elem))));
                }
            }
            Constraint::and(cs)
        }
        Type::Union(members) => Constraint::or(members.iter().map(type_to_constraint).collect()),
        Type::Intersection(members) => {
            Constraint::and(members.iter().map(type_to_constraint).collect())
        }
        Type::Function { .. } => Constraint::IsFunction,
        // Brands are a type-level fiction; the runtime value is the base.
        Type::Branded { base, .. } => type_to_constraint(base),
        Type::Bounded(_) => Constraint::Any,
        Type::WithMetadata { .. } => unreachable!("unwrapped above"),
    }
}

/// Rebuild a structural type from a constraint, for the subset of
/// constraints that name a concrete type. Returns `None` outside it.
pub fn constraint_to_type(c: &Constraint) -> Option<Type> {
    match simplify(c) {
        Constraint::IsNumber => Some(Type::NUMBER),
        Constraint::IsString => Some(Type::STRING),
        Constraint::IsBool => Some(Type::BOOLEAN),
        Constraint::IsNull => Some(Type::NULL),
        Constraint::Equals(v) => {
            let base = v.base();
            Some(Type::Literal(v, base))
        }
        Constraint::Never => Some(Type::NEVER),
        Constraint::Any => Some(Type::UNKNOWN),
        Constraint::Or(branches) => {
            let members: Option<Vec<Type>> = branches.iter().map(constraint_to_type).collect();
            members.map(Type::union)
        }
        Constraint::And(conjuncts) => and_to_type(&conjuncts),
        Constraint::Elements(inner) => {
            constraint_to_type(&inner).map(Type::array_of)
        }
        _ => None,
    }
}

/// A conjunction names a type when it is a classification refined by
/// structural predicates (`isObject & hasField...`, `isArray & ...`).
fn and_to_type(conjuncts: &[Constraint]) -> Option<Type> {
    if conjuncts.contains(&Constraint::IsObject) {
        let mut fields = IndexMap::new();
        for c in conjuncts {
            match c {
                Constraint::IsObject => {}
                Constraint::HasField(name, inner) => {
                    fields.insert(name.clone(), Field::required(constraint_to_type(inner)?));
                }
                _ => return None,
            }
        }
        return Some(Type::Record {
            fields,
            index_type: None,
            closed: false,
        });
    }
    if conjuncts.contains(&Constraint::IsArray) {
        let mut element = None;
        for c in conjuncts {
            match c {
                Constraint::IsArray => {}
                Constraint::Elements(inner) => element = Some(constraint_to_type(inner)?),
                _ => return None,
            }
        }
        return Some(Type::array_of(element.unwrap_or(Type::UNKNOWN)));
    }
    None
}

/// Narrow a structural type by a refined constraint: union branches whose
/// projection contradicts `c` are dropped. Non-union types are returned
/// unchanged unless they contradict entirely (then `Never`).
pub fn narrow_type(t: &Type, c: &Constraint) -> Type {
    if *c == Constraint::Any {
        return t.clone();
    }
    match t.unwrap_metadata() {
        Type::Union(members) => Type::union(
            members
                .iter()
                .filter(|m| unify(&type_to_constraint(m), c) != Constraint::Never)
                .cloned()
                .collect(),
        ),
        other => {
            if unify(&type_to_constraint(other), c) == Constraint::Never {
                Type::NEVER
            } else {
                other.clone()
            }
        }
    }
}
