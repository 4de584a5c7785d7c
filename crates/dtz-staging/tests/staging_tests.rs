//! Staged evaluator tests: Now/Later partitioning, refinement
//! propagation, and staged-closure specialization.

use dtz_emitter::{JsExpr, print_expr};
use dtz_eval::{EvalOptions, Evaluator, TypedValue, Value, global_env};
use dtz_parser::parse_program;
use dtz_solver::{Constraint, LitValue, Type};
use dtz_staging::{Origin, SEnv, SValue, Stager};

fn first_init(source: &str) -> dtz_ast::Expr {
    let program = parse_program(source).expect("parse failed");
    match &program.decls[0].kind {
        dtz_ast::DeclKind::Const { init, .. } => init.clone(),
        dtz_ast::DeclKind::Expr(e) => e.clone(),
        other => panic!("unexpected decl {other:?}"),
    }
}

fn stage_with<F: FnOnce(&SEnv)>(source: &str, setup: F) -> (SValue, Vec<dtz_emitter::JsStmt>) {
    let expr = first_init(source);
    let mut evaluator = Evaluator::new(EvalOptions::default());
    let env = SEnv::root(global_env().child());
    setup(&env);
    let mut stager = Stager::new(&mut evaluator);
    let sv = stager.stage(&expr, &env).expect("staging failed");
    let stmts = stager.take_stmts();
    (sv, stmts)
}

fn later_int(name: &str) -> SValue {
    SValue::Later {
        origin: Origin::RuntimeInput {
            name: name.to_string(),
        },
        ty: Type::INT,
        constraint: Constraint::IsNumber,
    }
}

fn render(stager_sv: &SValue) -> String {
    let mut evaluator = Evaluator::new(EvalOptions::default());
    let mut stager = Stager::new(&mut evaluator);
    let js = stager
        .residualize(stager_sv, dtz_common::span::Span::dummy())
        .expect("residualize failed");
    print_expr(&js)
}

// =============================================================================
// The Now invariant
// =============================================================================

#[test]
fn all_now_inputs_produce_now_and_no_residual() {
    let (sv, stmts) = stage_with("const x = 2 + 3 * 4;", |_| {});
    assert!(stmts.is_empty());
    let SValue::Now(tv) = sv else {
        panic!("expected Now, got {sv:?}");
    };
    assert!(matches!(tv.value, Value::Int(14)));
}

#[test]
fn later_input_propagates() {
    let (sv, _) = stage_with("const y = n + 1;", |env| env.define("n", later_int("n")));
    assert!(!sv.is_now());
    assert_eq!(render(&sv), "n + 1");
}

#[test]
fn now_subtrees_fold_inside_later_expressions() {
    let (sv, _) = stage_with("const y = n + (2 + 3);", |env| {
        env.define("n", later_int("n"))
    });
    assert_eq!(render(&sv), "n + 5");
}

#[test]
fn short_circuit_with_deciding_now_operand() {
    // `false && later` decides without touching the right side.
    let (sv, _) = stage_with("const y = false && n;", |env| {
        env.define("n", later_int("n"))
    });
    let SValue::Now(tv) = sv else {
        panic!("expected Now");
    };
    assert!(matches!(tv.value, Value::Bool(false)));
}

#[test]
fn now_conditional_stages_only_the_taken_branch() {
    // The untaken branch references an undefined name; staging must not
    // touch it.
    let (sv, _) = stage_with("const y = 1 < 2 ? 10 : explodes;", |_| {});
    let SValue::Now(tv) = sv else {
        panic!("expected Now");
    };
    assert!(matches!(tv.value, Value::Int(10)));
}

// =============================================================================
// Refinement propagation
// =============================================================================

#[test]
fn bound_refinement_narrows_across_if() {
    // Inside the then branch of `n > 0`, n's constraint gains `> 0`.
    let (sv, _) = stage_with("const y = n > 0 ? n : 0 - n;", |env| {
        env.define("n", later_int("n"))
    });
    assert!(!sv.is_now());
    assert_eq!(render(&sv), "n > 0 ? n : 0 - n");
}

#[test]
fn discriminant_refinement_types_branch_fields() {
    let source = r#"
type Circle = { kind: "circle", r: Int };
type Square = { kind: "square", s: Int };
const area = (shape: Circle | Square) =>
  shape.kind == "circle" ? shape.r : shape.s;
"#;
    let program = parse_program(source).unwrap();
    let mut evaluator = Evaluator::new(EvalOptions::default());
    let comptime_env = global_env().child();
    let env = SEnv::root(comptime_env.clone());
    let mut stager = Stager::new(&mut evaluator);

    // Evaluate the two type declarations into the comptime base.
    for decl in &program.decls[..2] {
        let dtz_ast::DeclKind::Const { name, init, .. } = &decl.kind else {
            panic!();
        };
        let sv = stager.stage(init, &env).unwrap();
        let SValue::Now(tv) = sv else { panic!() };
        env.define(name, SValue::Now(tv));
    }
    let dtz_ast::DeclKind::Const { init, .. } = &program.decls[2].kind else {
        panic!();
    };
    let sv = stager.stage(init, &env).unwrap();
    let js = stager
        .residualize_decl(&sv, "area", dtz_common::span::Span::dummy())
        .unwrap();
    let printed = print_expr(&js);
    assert!(printed.contains("shape.r"), "got: {printed}");
    assert!(printed.contains("shape.s"));
}

// =============================================================================
// Staged closures
// =============================================================================

#[test]
fn closure_over_later_capture_stays_symbolic() {
    let (sv, _) = stage_with("const f = (x) => x + n;", |env| {
        env.define("n", later_int("n"))
    });
    assert!(matches!(sv, SValue::StagedClosure(_)));
}

#[test]
fn staged_closure_restages_per_call() {
    // Calling the staged closure with a Now argument folds what it can.
    let source = "const y = do { const f = (x) => x + n; f(1) };";
    let (sv, _) = stage_with(source, |env| env.define("n", later_int("n")));
    assert_eq!(render(&sv), "1 + n");
}

#[test]
fn later_array_keeps_compile_time_length() {
    let (sv, _) = stage_with("const y = [1, n, 3].length;", |env| {
        env.define("n", later_int("n"))
    });
    let SValue::Now(tv) = sv else {
        panic!("expected Now length");
    };
    assert!(matches!(tv.value, Value::Int(3)));
}

#[test]
fn later_array_indexes_at_compile_time() {
    let (sv, _) = stage_with("const y = [1, n, 3][1];", |env| {
        env.define("n", later_int("n"))
    });
    assert_eq!(render(&sv), "n");
}

// =============================================================================
// Intrinsics
// =============================================================================

#[test]
fn comptime_intrinsic_forces_now() {
    let (sv, _) = stage_with("const y = comptime(2 + 2);", |_| {});
    let SValue::Now(tv) = sv else { panic!() };
    assert!(matches!(tv.value, Value::Int(4)));
}

#[test]
fn comptime_intrinsic_rejects_later() {
    let expr = first_init("const y = comptime(n);");
    let mut evaluator = Evaluator::new(EvalOptions::default());
    let env = SEnv::root(global_env().child());
    env.define("n", later_int("n"));
    let mut stager = Stager::new(&mut evaluator);
    let err = stager.stage(&expr, &env).unwrap_err();
    assert!(err.message().contains("not computable at compile time"));
}

#[test]
fn runtime_intrinsic_emits_a_hoisted_const() {
    let (sv, stmts) = stage_with("const y = runtime(41 + 1, \"answer\");", |_| {});
    assert_eq!(stmts.len(), 1);
    assert!(matches!(
        &sv,
        SValue::Later {
            origin: Origin::RuntimeInput { name },
            ..
        } if name == "answer"
    ));
    // The hoisted binding carries the computed value.
    let dtz_emitter::JsStmt::Const { name, init } = &stmts[0] else {
        panic!();
    };
    assert_eq!(name, "answer");
    assert!(matches!(init, JsExpr::Lit(dtz_emitter::JsLit::Int(42))));
}

#[test]
fn runtime_intrinsic_keeps_static_constraint() {
    let (sv, _) = stage_with("const y = runtime(5);", |_| {});
    let SValue::Later { constraint, .. } = sv else {
        panic!("expected Later");
    };
    assert_eq!(constraint, dtz_eval::constraint_of(&Value::Int(5)));
    assert_eq!(constraint, Constraint::Equals(LitValue::Int(5)));
}

#[test]
fn await_passes_through_as_later() {
    let (sv, _) = stage_with("const y = await p;", |env| {
        env.define(
            "p",
            SValue::later(
                Origin::RuntimeInput {
                    name: "p".to_string(),
                },
                Type::UNKNOWN,
            ),
        )
    });
    assert_eq!(render(&sv), "await p");
}

#[test]
fn evaluation_is_deterministic() {
    // Staging the same expression twice with fresh fuel produces the
    // same partition and residual.
    let run = || {
        let (sv, _) = stage_with("const y = n * (1 + 1);", |env| {
            env.define("n", later_int("n"))
        });
        render(&sv)
    };
    assert_eq!(run(), run());
}

#[test]
fn now_values_carry_types() {
    let (sv, _) = stage_with("const y = 2 + 3;", |_| {});
    let SValue::Now(TypedValue { ty, .. }) = sv else {
        panic!();
    };
    assert_eq!(ty.to_string(), "5");
}
