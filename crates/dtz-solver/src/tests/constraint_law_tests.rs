//! Constraint algebra law tests.
//!
//! Laws under test:
//! - idempotence: simplify(simplify(c)) == simplify(c)
//! - reflexivity: implies(c, c)
//! - top/bottom: implies(c, any), implies(never, c)
//! - disjoint classifications annihilate under `and`
//! - commutativity of unify up to constraint_equals

use crate::constraint::{
    Constraint, constraint_equals, implies, narrow_or, negate, simplify, unify,
};
use crate::types::LitValue;

fn sample_constraints() -> Vec<Constraint> {
    vec![
        Constraint::IsNumber,
        Constraint::IsString,
        Constraint::Equals(LitValue::Int(3)),
        Constraint::Equals(LitValue::Str("circle".into())),
        Constraint::Gt(2.0),
        Constraint::Lte(10.0),
        Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into()))),
        Constraint::Elements(Box::new(Constraint::IsNumber)),
        Constraint::And(vec![Constraint::IsNumber, Constraint::Gt(0.0)]),
        Constraint::Or(vec![Constraint::IsNumber, Constraint::IsString]),
        Constraint::Not(Box::new(Constraint::Equals(LitValue::Int(0)))),
        Constraint::Never,
        Constraint::Any,
        Constraint::CVar(0),
    ]
}

#[test]
fn simplify_is_idempotent() {
    for c in sample_constraints() {
        let once = simplify(&c);
        let twice = simplify(&once);
        assert_eq!(once, twice, "simplify not idempotent for {c}");
    }
}

#[test]
fn implies_is_reflexive() {
    for c in sample_constraints() {
        assert!(implies(&c, &c), "implies not reflexive for {c}");
    }
}

#[test]
fn any_is_top_never_is_bottom() {
    for c in sample_constraints() {
        assert!(implies(&c, &Constraint::Any), "{c} should imply any");
        assert!(implies(&Constraint::Never, &c), "never should imply {c}");
    }
}

#[test]
fn disjoint_classifications_collapse() {
    let classes = [
        Constraint::IsNumber,
        Constraint::IsString,
        Constraint::IsBool,
        Constraint::IsNull,
        Constraint::IsObject,
        Constraint::IsArray,
        Constraint::IsFunction,
    ];
    for (i, a) in classes.iter().enumerate() {
        for (j, b) in classes.iter().enumerate() {
            let conj = simplify(&Constraint::And(vec![a.clone(), b.clone()]));
            if i == j {
                assert_eq!(conj, a.clone());
            } else {
                assert_eq!(conj, Constraint::Never, "{a} & {b} should be never");
            }
        }
    }
}

#[test]
fn unify_is_commutative() {
    let cs = sample_constraints();
    for a in &cs {
        for b in &cs {
            assert!(
                constraint_equals(&unify(a, b), &unify(b, a)),
                "unify not commutative for {a}, {b}"
            );
        }
    }
}

#[test]
fn and_or_flatten_and_dedup() {
    let nested = Constraint::And(vec![
        Constraint::IsNumber,
        Constraint::And(vec![Constraint::Gt(0.0), Constraint::IsNumber]),
    ]);
    let canon = simplify(&nested);
    match canon {
        Constraint::And(members) => {
            assert_eq!(members.len(), 2);
            assert!(members.contains(&Constraint::IsNumber));
            assert!(members.contains(&Constraint::Gt(0.0)));
        }
        other => panic!("expected flat and, got {other}"),
    }

    let ors = Constraint::Or(vec![
        Constraint::IsString,
        Constraint::Or(vec![Constraint::IsString, Constraint::Never]),
    ]);
    assert_eq!(simplify(&ors), Constraint::IsString);
}

#[test]
fn identity_and_annihilator() {
    let c = Constraint::IsNumber;
    assert_eq!(
        simplify(&Constraint::And(vec![c.clone(), Constraint::Any])),
        c
    );
    assert_eq!(
        simplify(&Constraint::Or(vec![c.clone(), Constraint::Never])),
        c
    );
    assert_eq!(
        simplify(&Constraint::And(vec![c.clone(), Constraint::Never])),
        Constraint::Never
    );
    assert_eq!(
        simplify(&Constraint::Or(vec![c, Constraint::Any])),
        Constraint::Any
    );
}

#[test]
fn distinct_equalities_collapse() {
    let conj = Constraint::And(vec![
        Constraint::Equals(LitValue::Int(1)),
        Constraint::Equals(LitValue::Int(2)),
    ]);
    assert_eq!(simplify(&conj), Constraint::Never);
}

#[test]
fn equality_against_wrong_classification_collapses() {
    let conj = Constraint::And(vec![
        Constraint::Equals(LitValue::Str("hi".into())),
        Constraint::IsNumber,
    ]);
    assert_eq!(simplify(&conj), Constraint::Never);

    let ok = Constraint::And(vec![
        Constraint::Equals(LitValue::Str("hi".into())),
        Constraint::IsString,
    ]);
    assert_ne!(simplify(&ok), Constraint::Never);
}

#[test]
fn bound_intervals_merge_and_collapse() {
    // Lower bounds merge by max, upper by min.
    let merged = simplify(&Constraint::And(vec![
        Constraint::Gt(1.0),
        Constraint::Gt(5.0),
        Constraint::Lte(10.0),
    ]));
    match merged {
        Constraint::And(ref members) => {
            assert!(members.contains(&Constraint::Gt(5.0)));
            assert!(members.contains(&Constraint::Lte(10.0)));
            assert!(!members.contains(&Constraint::Gt(1.0)));
        }
        ref other => panic!("expected conjunction, got {other}"),
    }
    assert!(implies(&merged, &Constraint::Gt(5.0)));

    // Empty interval.
    assert_eq!(
        simplify(&Constraint::And(vec![
            Constraint::Gt(5.0),
            Constraint::Lt(5.0)
        ])),
        Constraint::Never
    );
    // Strict against non-strict at the same value.
    assert_eq!(
        simplify(&Constraint::And(vec![
            Constraint::Gt(5.0),
            Constraint::Lte(5.0)
        ])),
        Constraint::Never
    );
    // Non-strict pair at the same value pins the point; satisfiable.
    assert_ne!(
        simplify(&Constraint::And(vec![
            Constraint::Gte(5.0),
            Constraint::Lte(5.0)
        ])),
        Constraint::Never
    );
}

#[test]
fn equality_outside_bounds_collapses() {
    assert_eq!(
        simplify(&Constraint::And(vec![
            Constraint::Equals(LitValue::Int(3)),
            Constraint::Gt(5.0)
        ])),
        Constraint::Never
    );
    assert_ne!(
        simplify(&Constraint::And(vec![
            Constraint::Equals(LitValue::Int(7)),
            Constraint::Gt(5.0)
        ])),
        Constraint::Never
    );
}

#[test]
fn conflicting_field_equalities_collapse() {
    let conj = Constraint::And(vec![
        Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into()))),
        Constraint::has_field("kind", Constraint::Equals(LitValue::Str("square".into()))),
    ]);
    assert_eq!(simplify(&conj), Constraint::Never);

    let same = Constraint::And(vec![
        Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into()))),
        Constraint::has_field("kind", Constraint::IsString),
    ]);
    assert_ne!(simplify(&same), Constraint::Never);
}

#[test]
fn implication_over_equality_and_bounds() {
    assert!(implies(
        &Constraint::Equals(LitValue::Int(7)),
        &Constraint::IsNumber
    ));
    assert!(!implies(
        &Constraint::Equals(LitValue::Str("x".into())),
        &Constraint::IsNumber
    ));
    assert!(implies(
        &Constraint::Equals(LitValue::Int(7)),
        &Constraint::Gt(5.0)
    ));
    assert!(!implies(
        &Constraint::Equals(LitValue::Int(3)),
        &Constraint::Gt(5.0)
    ));
    assert!(implies(&Constraint::Gt(7.0), &Constraint::Gt(5.0)));
    assert!(!implies(&Constraint::Gt(5.0), &Constraint::Gt(7.0)));
    assert!(implies(&Constraint::Gte(6.0), &Constraint::Gt(5.0)));
    assert!(!implies(&Constraint::Gte(5.0), &Constraint::Gt(5.0)));
}

#[test]
fn implication_respects_logical_structure() {
    let conj = Constraint::And(vec![Constraint::IsNumber, Constraint::Gt(0.0)]);
    assert!(implies(&conj, &Constraint::IsNumber));
    assert!(implies(&conj, &Constraint::Gt(0.0)));

    let branch = Constraint::IsNumber;
    let disj = Constraint::Or(vec![Constraint::IsNumber, Constraint::IsString]);
    assert!(implies(&branch, &disj));
    assert!(!implies(&disj, &branch));
}

#[test]
fn hasfield_implication_is_compositional() {
    let circle = Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into())));
    let any_kind = Constraint::has_field("kind", Constraint::IsString);
    assert!(implies(&circle, &any_kind));
    assert!(!implies(&any_kind, &circle));
    assert!(implies(&circle, &Constraint::IsObject));
}

#[test]
fn negate_inverts_bounds() {
    assert_eq!(negate(&Constraint::Gt(5.0)), Constraint::Lte(5.0));
    assert_eq!(negate(&Constraint::Gte(5.0)), Constraint::Lt(5.0));
    assert_eq!(negate(&Constraint::Lt(5.0)), Constraint::Gte(5.0));
    assert_eq!(negate(&Constraint::Lte(5.0)), Constraint::Gt(5.0));
    assert_eq!(
        negate(&Constraint::Not(Box::new(Constraint::IsNumber))),
        Constraint::IsNumber
    );
}

#[test]
fn negate_uses_de_morgan() {
    let conj = Constraint::And(vec![Constraint::Gt(0.0), Constraint::Lt(10.0)]);
    let negated = negate(&conj);
    // !(x > 0 & x < 10) == x <= 0 | x >= 10
    assert!(constraint_equals(
        &negated,
        &Constraint::Or(vec![Constraint::Lte(0.0), Constraint::Gte(10.0)])
    ));
}

#[test]
fn narrow_or_drops_dead_branches() {
    let shapes = Constraint::Or(vec![
        Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into()))),
        Constraint::has_field("kind", Constraint::Equals(LitValue::Str("square".into()))),
    ]);
    let refined = narrow_or(
        &shapes,
        &Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into()))),
    );
    assert!(constraint_equals(
        &refined,
        &Constraint::has_field("kind", Constraint::Equals(LitValue::Str("circle".into())))
    ));
}

#[test]
fn positive_fact_implies_negation_of_disjoint_fact() {
    assert!(implies(
        &Constraint::IsNumber,
        &Constraint::Not(Box::new(Constraint::IsString))
    ));
    assert!(implies(
        &Constraint::Equals(LitValue::Int(1)),
        &Constraint::Not(Box::new(Constraint::Equals(LitValue::Int(2))))
    ));
}
