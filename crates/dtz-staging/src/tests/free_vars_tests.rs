//! Free-variable analysis tests.

use crate::free_vars::{contains_staging_form, free_vars};
use dtz_parser::parse_program;

fn free_of(source: &str) -> Vec<String> {
    let program = parse_program(source).expect("parse failed");
    let dtz_ast::DeclKind::Const { init, .. } = &program.decls[0].kind else {
        panic!("expected const");
    };
    let mut names: Vec<String> = free_vars(init).into_iter().collect();
    names.sort();
    names
}

#[test]
fn lambda_params_are_bound() {
    assert_eq!(free_of("const f = (x) => x + y;"), vec!["y"]);
}

#[test]
fn annotations_and_defaults_are_scanned() {
    // The annotation references T (free), the default references d (free).
    assert_eq!(free_of("const f = (x: T, z = d) => x;"), vec!["T", "d"]);
}

#[test]
fn dependent_annotation_is_not_free() {
    // The generic lowers to (T: Type(Number), x: T) => x; `T` is bound by
    // the time x's annotation mentions it, so only the lowered builtins
    // and the bound remain free.
    assert_eq!(
        free_of("const id = <T extends Number>(x: T) => x;"),
        vec!["Number".to_string(), "Type".to_string()]
    );
}

#[test]
fn block_decls_bind_later_uses() {
    assert_eq!(free_of("const x = do { const a = b; a + a };"), vec!["b"]);
}

#[test]
fn match_patterns_bind_guard_and_body() {
    assert_eq!(
        free_of("const f = match (s) { { kind, r } if r > lo => kind, _ => fallback };"),
        vec!["fallback", "lo", "s"]
    );
}

#[test]
fn staging_forms_are_detected_outside_lambdas() {
    let program = parse_program("const x = runtime(1 + 2);").unwrap();
    let dtz_ast::DeclKind::Const { init, .. } = &program.decls[0].kind else {
        panic!();
    };
    assert!(contains_staging_form(init));

    // Inside a lambda body the form is latent, not active.
    let program = parse_program("const f = (x) => runtime(x);").unwrap();
    let dtz_ast::DeclKind::Const { init, .. } = &program.decls[0].kind else {
        panic!();
    };
    assert!(!contains_staging_form(init));
}
