//! Type <-> Constraint bridge tests.

use crate::bridge::{constraint_to_type, narrow_type, type_to_constraint};
use crate::constraint::Constraint;
use crate::types::{Field, LitValue, Prim, Type};
use indexmap::IndexMap;

fn record(fields: &[(&str, Type)]) -> Type {
    let mut map = IndexMap::new();
    for (name, ty) in fields {
        map.insert((*name).to_string(), Field::required(ty.clone()));
    }
    Type::Record {
        fields: map,
        index_type: None,
        closed: false,
    }
}

fn str_lit(s: &str) -> Type {
    Type::Literal(LitValue::Str(s.to_string()), Prim::String)
}

#[test]
fn roundtrip_on_concrete_constraints() {
    let concrete = vec![
        Constraint::IsNumber,
        Constraint::IsString,
        Constraint::IsBool,
        Constraint::IsNull,
        Constraint::Equals(LitValue::Int(5)),
        Constraint::Equals(LitValue::Str("hi".into())),
        Constraint::Or(vec![Constraint::IsNumber, Constraint::IsString]),
        Constraint::Never,
    ];
    for c in concrete {
        let ty = constraint_to_type(&c).unwrap_or_else(|| panic!("{c} should name a type"));
        assert_eq!(
            type_to_constraint(&ty),
            crate::constraint::simplify(&c),
            "roundtrip failed for {c}"
        );
    }
}

#[test]
fn record_type_projects_field_constraints() {
    let circle = record(&[("kind", str_lit("circle")), ("r", Type::INT)]);
    let c = type_to_constraint(&circle);
    assert!(crate::constraint::implies(&c, &Constraint::IsObject));
    assert!(crate::constraint::implies(
        &c,
        &Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into())))
    ));
    assert!(crate::constraint::implies(
        &c,
        &Constraint::has_field("r", Constraint::IsNumber)
    ));
}

#[test]
fn narrow_type_filters_union_branches() {
    let circle = record(&[("kind", str_lit("circle")), ("r", Type::INT)]);
    let square = record(&[("kind", str_lit("square")), ("s", Type::INT)]);
    let shape = Type::union(vec![circle.clone(), square]);

    let narrowed = narrow_type(
        &shape,
        &Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into()))),
    );
    assert_eq!(narrowed, circle);
}

#[test]
fn narrow_type_of_contradicting_scalar_is_never() {
    assert_eq!(
        narrow_type(&Type::STRING, &Constraint::IsNumber),
        Type::NEVER
    );
    assert_eq!(narrow_type(&Type::INT, &Constraint::Gt(0.0)), Type::INT);
}

#[test]
fn brands_are_transparent_to_constraints() {
    let branded = Type::Branded {
        base: Box::new(Type::STRING),
        brand: "UserId".to_string(),
    };
    assert_eq!(type_to_constraint(&branded), Constraint::IsString);
}

#[test]
fn tuple_projects_length_and_elements() {
    let pair = Type::Array {
        elements: vec![Type::INT, Type::STRING],
        variadic: false,
    };
    let c = type_to_constraint(&pair);
    assert!(crate::constraint::implies(&c, &Constraint::IsArray));
    assert!(crate::constraint::implies(
        &c,
        &Constraint::Length(Box::new(Constraint::Equals(LitValue::Int(2))))
    ));
    assert!(crate::constraint::implies(
        &c,
        &Constraint::ElementAt(0, Box::new(Constraint::IsNumber))
    ));
}
