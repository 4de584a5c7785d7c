//! Parser and desugaring tests.

use dtz_ast::{BinaryOp, DeclKind, ExprKind, Lit, PatternKind, RecordItem, TemplatePart};
use dtz_parser::parse_program;

fn parse_one_init(source: &str) -> dtz_ast::Expr {
    let program = parse_program(source).expect("parse failed");
    match &program.decls[0].kind {
        DeclKind::Const { init, .. } => init.clone(),
        other => panic!("expected const, got {other:?}"),
    }
}

#[test]
fn precedence_and_associativity() {
    let init = parse_one_init("const x = 1 + 2 * 3;");
    let ExprKind::Binary { op, right, .. } = &init.kind else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(
        &right.kind,
        ExprKind::Binary {
            op: BinaryOp::Mul,
            ..
        }
    ));
}

#[test]
fn conditional_is_right_associative() {
    let init = parse_one_init("const x = a ? 1 : b ? 2 : 3;");
    let ExprKind::Conditional { else_branch, .. } = &init.kind else {
        panic!("expected conditional");
    };
    assert!(matches!(&else_branch.kind, ExprKind::Conditional { .. }));
}

#[test]
fn comptime_and_export_flags() {
    let program = parse_program("export comptime const x = 1;").unwrap();
    let DeclKind::Const {
        comptime, exported, ..
    } = &program.decls[0].kind
    else {
        panic!("expected const");
    };
    assert!(comptime);
    assert!(exported);
}

#[test]
fn arrow_with_annotations_and_default() {
    let init = parse_one_init("const f = (a: Int, b = 2) => a + b;");
    let ExprKind::Lambda(lambda) = &init.kind else {
        panic!("expected lambda");
    };
    assert_eq!(lambda.params.len(), 2);
    assert!(lambda.params[0].ty.is_some());
    assert!(lambda.params[1].default.is_some());
}

#[test]
fn parenthesized_expression_is_not_an_arrow() {
    let init = parse_one_init("const x = (1 + 2) * 3;");
    assert!(matches!(
        &init.kind,
        ExprKind::Binary {
            op: BinaryOp::Mul,
            ..
        }
    ));
}

#[test]
fn generic_arrow_lowers_to_bounded_param() {
    let init = parse_one_init("const id = <T extends Number>(x: T) => x;");
    let ExprKind::Lambda(lambda) = &init.kind else {
        panic!("expected lambda");
    };
    assert_eq!(lambda.params.len(), 2);
    assert_eq!(lambda.params[0].name, "T");
    // The lowered bound is `Type(Number)`.
    let ty = lambda.params[0].ty.as_ref().unwrap();
    let ExprKind::Call { callee, args } = &ty.kind else {
        panic!("expected Type(...) call");
    };
    assert!(matches!(&callee.kind, ExprKind::Ident(name) if name == "Type"));
    assert!(matches!(&args[0].expr.kind, ExprKind::Ident(name) if name == "Number"));
}

#[test]
fn call_type_arguments_become_leading_args() {
    let program = parse_program("id<String>(\"hi\");").unwrap();
    let DeclKind::Expr(expr) = &program.decls[0].kind else {
        panic!("expected expression statement");
    };
    let ExprKind::Call { args, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert_eq!(args.len(), 2);
    assert!(matches!(&args[0].expr.kind, ExprKind::Ident(name) if name == "String"));
    assert!(matches!(
        &args[1].expr.kind,
        ExprKind::Literal(Lit::Str(s)) if s == "hi"
    ));
}

#[test]
fn less_than_still_parses_as_comparison() {
    let program = parse_program("const x = a < b;").unwrap();
    let DeclKind::Const { init, .. } = &program.decls[0].kind else {
        panic!();
    };
    assert!(matches!(
        &init.kind,
        ExprKind::Binary {
            op: BinaryOp::Lt,
            ..
        }
    ));
}

#[test]
fn type_decl_desugars_to_comptime_const() {
    let program = parse_program("type Circle = { kind: \"circle\", r: Int };").unwrap();
    let DeclKind::Const {
        name,
        comptime,
        init,
        ..
    } = &program.decls[0].kind
    else {
        panic!("expected const");
    };
    assert_eq!(name, "Circle");
    assert!(comptime);
    // WithMetadata(RecordType({...}), { name: "Circle" })
    let ExprKind::Call { callee, args } = &init.kind else {
        panic!("expected call");
    };
    assert!(matches!(&callee.kind, ExprKind::Ident(n) if n == "WithMetadata"));
    let ExprKind::Call { callee: inner, .. } = &args[0].expr.kind else {
        panic!("expected RecordType call");
    };
    assert!(matches!(&inner.kind, ExprKind::Ident(n) if n == "RecordType"));
}

#[test]
fn union_type_syntax() {
    let program = parse_program("const area = (shape: Circle | Square) => 0;").unwrap();
    let DeclKind::Const { init, .. } = &program.decls[0].kind else {
        panic!();
    };
    let ExprKind::Lambda(lambda) = &init.kind else {
        panic!("expected lambda");
    };
    let ty = lambda.params[0].ty.as_ref().unwrap();
    let ExprKind::Call { callee, args } = &ty.kind else {
        panic!("expected Union call");
    };
    assert!(matches!(&callee.kind, ExprKind::Ident(n) if n == "Union"));
    assert_eq!(args.len(), 2);
}

#[test]
fn array_type_postfix() {
    let program = parse_program("const xs: Int[] = [1, 2];").unwrap();
    let DeclKind::Const { ty: Some(ty), .. } = &program.decls[0].kind else {
        panic!();
    };
    let ExprKind::Call { callee, args } = &ty.kind else {
        panic!("expected Array call");
    };
    assert!(matches!(&callee.kind, ExprKind::Ident(n) if n == "Array"));
    assert_eq!(args.len(), 1);
}

#[test]
fn record_shorthand_and_spread() {
    let init = parse_one_init("const r = { x, y: 2, ...rest };");
    let ExprKind::Record(items) = &init.kind else {
        panic!("expected record");
    };
    assert!(matches!(&items[0], RecordItem::Field { name, .. } if name == "x"));
    assert!(matches!(&items[2], RecordItem::Spread(_)));
}

#[test]
fn match_with_guard_and_destructure() {
    let init = parse_one_init(
        "const f = match (shape) { { kind: \"circle\", r } if r > 0 => r, _ => 0 };",
    );
    let ExprKind::Match { cases, .. } = &init.kind else {
        panic!("expected match");
    };
    assert_eq!(cases.len(), 2);
    assert!(cases[0].guard.is_some());
    assert!(matches!(&cases[0].pattern.kind, PatternKind::Destructure(_)));
    assert!(matches!(&cases[1].pattern.kind, PatternKind::Wildcard));
}

#[test]
fn binding_pattern_with_alias() {
    let init = parse_one_init("const f = match (x) { n @ 3 => n, _ => 0 };");
    let ExprKind::Match { cases, .. } = &init.kind else {
        panic!();
    };
    let PatternKind::Binding { name, inner } = &cases[0].pattern.kind else {
        panic!("expected binding");
    };
    assert_eq!(name, "n");
    assert!(matches!(
        inner.as_deref().map(|p| &p.kind),
        Some(PatternKind::Literal(Lit::Int(3)))
    ));
}

#[test]
fn do_block_with_result() {
    let init = parse_one_init("const x = do { const a = 1; a + 1 };");
    let ExprKind::Block { decls, result } = &init.kind else {
        panic!("expected block");
    };
    assert_eq!(decls.len(), 1);
    assert!(result.is_some());
}

#[test]
fn template_interpolation_parses_expressions() {
    let init = parse_one_init("const s = `sum=${1 + 2}!`;");
    let ExprKind::Template(parts) = &init.kind else {
        panic!("expected template");
    };
    assert_eq!(parts.len(), 3);
    assert!(matches!(
        &parts[1],
        TemplatePart::Interp(e) if matches!(&e.kind, ExprKind::Binary { .. })
    ));
}

#[test]
fn import_declaration() {
    let program = parse_program("import { a, b } from \"./lib\";").unwrap();
    let DeclKind::Import { bindings, module } = &program.decls[0].kind else {
        panic!("expected import");
    };
    assert_eq!(bindings.len(), 2);
    assert_eq!(module, "./lib");
}

#[test]
fn spans_point_into_source() {
    let source = "const answer = 41 + 1;";
    let program = parse_program(source).unwrap();
    let DeclKind::Const {
        name_span, init, ..
    } = &program.decls[0].kind
    else {
        panic!();
    };
    assert_eq!(name_span.slice(source), "answer");
    assert_eq!(init.span.slice(source), "41 + 1");
}

#[test]
fn parse_errors_carry_spans() {
    let err = parse_program("const = 1;").unwrap_err();
    assert_eq!(err.stage, dtz_common::diagnostics::Stage::Parse);
    assert!(err.span.is_some());
}

#[test]
fn deep_nesting_is_rejected_not_crashed() {
    let mut source = String::from("const x = ");
    for _ in 0..3000 {
        source.push('(');
    }
    source.push('1');
    for _ in 0..3000 {
        source.push(')');
    }
    source.push(';');
    assert!(parse_program(&source).is_err());
}
