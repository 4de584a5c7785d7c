//! Narrowing through the bridge: guard refinements applied to union types.

use dtz_solver::{
    Constraint, Field, LitValue, Prim, Refinement, Type, extract_refinement, narrow_type,
    negate_refinement,
};
use dtz_ast::{BinaryOp, Expr, ExprKind, Lit};
use dtz_common::span::Span;
use indexmap::IndexMap;

fn shape_union() -> (Type, Type, Type) {
    let mut circle_fields = IndexMap::new();
    circle_fields.insert(
        "kind".to_string(),
        Field::required(Type::Literal(LitValue::Str("circle".into()), Prim::String)),
    );
    circle_fields.insert("r".to_string(), Field::required(Type::INT));
    let circle = Type::Record {
        fields: circle_fields,
        index_type: None,
        closed: false,
    };

    let mut square_fields = IndexMap::new();
    square_fields.insert(
        "kind".to_string(),
        Field::required(Type::Literal(LitValue::Str("square".into()), Prim::String)),
    );
    square_fields.insert("s".to_string(), Field::required(Type::INT));
    let square = Type::Record {
        fields: square_fields,
        index_type: None,
        closed: false,
    };

    let union = Type::union(vec![circle.clone(), square.clone()]);
    (circle, square, union)
}

fn discriminant_guard() -> Expr {
    // shape.kind == "circle"
    Expr::new(
        ExprKind::Binary {
            op: BinaryOp::Eq,
            left: Box::new(Expr::new(
                ExprKind::Property {
                    object: Box::new(Expr::new(
                        ExprKind::Ident("shape".to_string()),
                        Span::dummy(),
                    )),
                    name: "kind".to_string(),
                    name_span: Span::dummy(),
                },
                Span::dummy(),
            )),
            right: Box::new(Expr::new(
                ExprKind::Literal(Lit::Str("circle".to_string())),
                Span::dummy(),
            )),
        },
        Span::dummy(),
    )
}

#[test]
fn then_branch_selects_circle() {
    let (circle, _, union) = shape_union();
    let refinement = extract_refinement(&discriminant_guard());
    let fact = refinement.get("shape").expect("shape refined");
    assert_eq!(narrow_type(&union, fact), circle);
}

#[test]
fn else_branch_selects_square() {
    let (_, square, union) = shape_union();
    let refinement = negate_refinement(&extract_refinement(&discriminant_guard()));
    let fact = refinement.get("shape").expect("shape refined");
    assert_eq!(narrow_type(&union, fact), square);
}

#[test]
fn narrowed_branch_carries_its_fields() {
    let (_, _, union) = shape_union();
    let refinement = extract_refinement(&discriminant_guard());
    let narrowed = narrow_type(&union, refinement.get("shape").unwrap());
    match narrowed {
        Type::Record { fields, .. } => {
            assert!(fields.contains_key("r"));
            assert!(!fields.contains_key("s"));
        }
        other => panic!("expected record, got {other}"),
    }
}

#[test]
fn irrelevant_refinement_keeps_every_branch() {
    let (_, _, union) = shape_union();
    let unrelated = Refinement::empty();
    assert!(unrelated.get("shape").is_none());
    // Narrowing by `any` is the identity.
    assert_eq!(narrow_type(&union, &Constraint::Any), union);
}
