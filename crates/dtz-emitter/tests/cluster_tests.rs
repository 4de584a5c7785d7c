//! Cluster/template engine tests.

use dtz_emitter::{
    JsBody, JsExpr, JsLit, JsStmt, apply_template, cluster_statements, compare_js_exprs,
    compute_parameter_mapping, lit_at, signature,
};

fn var(name: &str) -> JsExpr {
    JsExpr::Var(name.to_string())
}

fn int(n: i64) -> JsExpr {
    JsExpr::Lit(JsLit::Int(n))
}

fn add(left: JsExpr, right: JsExpr) -> JsExpr {
    JsExpr::Binop {
        op: "+".to_string(),
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn arrow(params: &[&str], body: JsExpr) -> JsExpr {
    JsExpr::Arrow {
        params: params.iter().map(|p| (*p).to_string()).collect(),
        body: JsBody::Expr(Box::new(body)),
        is_async: false,
    }
}

fn const_stmt(name: &str, init: JsExpr) -> JsStmt {
    JsStmt::Const {
        name: name.to_string(),
        init,
    }
}

#[test]
fn identical_trees_have_no_holes() {
    let a = arrow(&["x"], var("x"));
    let b = arrow(&["x"], var("x"));
    assert_eq!(compare_js_exprs(&a, &b), Some(vec![]));
}

#[test]
fn differing_literals_become_holes() {
    let a = arrow(&["x"], add(var("x"), int(1)));
    let b = arrow(&["x"], add(var("x"), int(2)));
    let holes = compare_js_exprs(&a, &b).expect("isomorphic");
    assert_eq!(holes.len(), 1);
    assert_eq!(lit_at(&a, &holes[0]), Some(&JsLit::Int(1)));
    assert_eq!(lit_at(&b, &holes[0]), Some(&JsLit::Int(2)));
}

#[test]
fn structural_divergence_is_a_mismatch() {
    let a = arrow(&["x"], add(var("x"), int(1)));
    let b = arrow(&["x"], add(int(1), var("x")));
    assert_eq!(compare_js_exprs(&a, &b), None);
}

#[test]
fn different_parameter_names_mismatch() {
    let a = arrow(&["x"], var("x"));
    let b = arrow(&["y"], var("y"));
    assert_eq!(compare_js_exprs(&a, &b), None);
}

#[test]
fn signature_collapses_literals_only() {
    let a = arrow(&["x"], add(var("x"), int(1)));
    let b = arrow(&["x"], add(var("x"), int(2)));
    let c = arrow(&["x"], add(var("x"), var("k")));
    assert_eq!(signature(&a), signature(&b));
    assert_ne!(signature(&a), signature(&c));
    assert!(signature(&a).contains('L'));
}

#[test]
fn mapping_shares_parameters_for_equal_vectors() {
    // Members: (x) => x + 1 + 1 and (x) => x + 2 + 2: both holes always
    // carry the same value, so they share one parameter.
    let member = |k: i64| arrow(&["x"], add(add(var("x"), int(k)), int(k)));
    let a = member(1);
    let b = member(2);
    let holes = compare_js_exprs(&a, &b).unwrap();
    assert_eq!(holes.len(), 2);
    let cluster = dtz_emitter::Cluster {
        members: vec![
            dtz_emitter::ClusterMember {
                index: 0,
                name: "f1".into(),
                expr: a.clone(),
            },
            dtz_emitter::ClusterMember {
                index: 1,
                name: "f2".into(),
                expr: b,
            },
        ],
        holes: holes.clone(),
        signature: signature(&a),
    };
    let mapping = compute_parameter_mapping(&cluster).unwrap();
    assert_eq!(mapping, vec![0, 0]);
}

#[test]
fn mapping_splits_parameters_for_distinct_vectors() {
    // (x) => x + 1 + 10 and (x) => x + 2 + 20: distinct vectors.
    let member = |k1: i64, k2: i64| arrow(&["x"], add(add(var("x"), int(k1)), int(k2)));
    let a = member(1, 10);
    let b = member(2, 20);
    let holes = compare_js_exprs(&a, &b).unwrap();
    let cluster = dtz_emitter::Cluster {
        members: vec![
            dtz_emitter::ClusterMember {
                index: 0,
                name: "f1".into(),
                expr: a.clone(),
            },
            dtz_emitter::ClusterMember {
                index: 1,
                name: "f2".into(),
                expr: b,
            },
        ],
        holes,
        signature: signature(&a),
    };
    let mapping = compute_parameter_mapping(&cluster).unwrap();
    assert_eq!(mapping, vec![0, 1]);
}

#[test]
fn apply_template_substitutes_parameters() {
    let a = arrow(&["x"], add(var("x"), int(1)));
    let b = arrow(&["x"], add(var("x"), int(2)));
    let holes = compare_js_exprs(&a, &b).unwrap();
    let template = apply_template(&a, &holes, &[0], &["k".to_string()]).unwrap();
    assert_eq!(template, arrow(&["x"], add(var("x"), var("k"))));
}

#[test]
fn substituting_holes_back_reproduces_members() {
    // Clustering soundness: template with the member's hole literals
    // substituted at the hole paths reproduces the original expression.
    let a = arrow(&["x"], add(var("x"), int(1)));
    let b = arrow(&["x"], add(var("x"), int(2)));
    let holes = compare_js_exprs(&a, &b).unwrap();
    for member in [&a, &b] {
        let lit = lit_at(member, &holes[0]).unwrap().clone();
        // Re-apply the member's own literal as a "parameter" and confirm
        // the tree round-trips bytewise.
        let rebuilt = {
            let template = apply_template(member, &holes, &[0], &["k".to_string()]).unwrap();
            // Substitute back by comparing: template with k replaced by
            // the literal must equal the member.
            let JsExpr::Arrow { params, body, .. } = template else {
                panic!()
            };
            let JsBody::Expr(body) = body else { panic!() };
            let substituted = substitute_var(*body, "k", &JsExpr::Lit(lit));
            JsExpr::Arrow {
                params,
                body: JsBody::Expr(Box::new(substituted)),
                is_async: false,
            }
        };
        assert_eq!(&rebuilt, member);
    }
}

fn substitute_var(expr: JsExpr, name: &str, value: &JsExpr) -> JsExpr {
    match expr {
        JsExpr::Var(n) if n == name => value.clone(),
        JsExpr::Binop { op, left, right } => JsExpr::Binop {
            op,
            left: Box::new(substitute_var(*left, name, value)),
            right: Box::new(substitute_var(*right, name, value)),
        },
        other => other,
    }
}

#[test]
fn identical_definitions_merge_into_one() {
    let stmts = vec![
        const_stmt("f1", arrow(&["x"], var("x"))),
        const_stmt("f2", arrow(&["x"], var("x"))),
    ];
    let mut next_id = 0;
    let out = cluster_statements(stmts, &mut next_id);
    // One template + two aliases.
    assert_eq!(out.len(), 3);
    let JsStmt::Const { name, init } = &out[0] else {
        panic!()
    };
    assert_eq!(name, "__tpl0");
    assert!(matches!(init, JsExpr::Arrow { .. }));
    assert!(matches!(
        &out[1],
        JsStmt::Const { name, init: JsExpr::Var(v) } if name == "f1" && v == "__tpl0"
    ));
    assert!(matches!(
        &out[2],
        JsStmt::Const { name, init: JsExpr::Var(v) } if name == "f2" && v == "__tpl0"
    ));
}

#[test]
fn parameterized_cluster_forwards_hole_values() {
    let stmts = vec![
        const_stmt("f1", arrow(&["x"], add(var("x"), int(1)))),
        const_stmt("f2", arrow(&["x"], add(var("x"), int(2)))),
    ];
    let mut next_id = 0;
    let out = cluster_statements(stmts, &mut next_id);
    assert_eq!(out.len(), 3);
    // Template takes (x, __k0) and adds them.
    let JsStmt::Const { init: template, .. } = &out[0] else {
        panic!()
    };
    let JsExpr::Arrow { params, .. } = template else {
        panic!()
    };
    assert_eq!(params, &["x".to_string(), "__k0".to_string()]);
    // Members wrap the template with their own literal.
    let JsStmt::Const { name, init } = &out[1] else {
        panic!()
    };
    assert_eq!(name, "f1");
    let JsExpr::Arrow { body, .. } = init else {
        panic!()
    };
    let JsBody::Expr(body) = body else { panic!() };
    let JsExpr::Call { args, .. } = &**body else {
        panic!()
    };
    assert_eq!(args[1], int(1));
}

#[test]
fn unrelated_statements_pass_through() {
    let stmts = vec![
        const_stmt("a", int(1)),
        const_stmt("f1", arrow(&["x"], var("x"))),
        JsStmt::Expr(var("sideEffect")),
    ];
    let mut next_id = 0;
    let out = cluster_statements(stmts.clone(), &mut next_id);
    assert_eq!(out, stmts);
}
