//! End-to-end compilations: source text through check, erasure,
//! clustering, and printing.

use dtz_checker::{check_source, erase};
use dtz_emitter::{cluster_statements, print_program};
use dtz_eval::EvalOptions;

fn compile(source: &str) -> Result<String, dtz_common::diagnostics::Diagnostic> {
    let checked = check_source(source, EvalOptions::default())?;
    let stmts = erase(&checked);
    let mut next_id = 0;
    let stmts = cluster_statements(stmts, &mut next_id);
    Ok(print_program(&stmts))
}

fn compile_ok(source: &str) -> String {
    match compile(source) {
        Ok(js) => js,
        Err(diag) => panic!("compile failed: {}", diag.render(source)),
    }
}

fn compile_err(source: &str) -> dtz_common::diagnostics::Diagnostic {
    match compile(source) {
        Ok(js) => panic!("expected failure, got:\n{js}"),
        Err(diag) => diag,
    }
}

// =============================================================================
// The end-to-end scenarios
// =============================================================================

#[test]
fn literal_arithmetic_folds() {
    let js = compile_ok("const x = 2 + 3;");
    assert_eq!(js, "const x = 5;\n");
}

#[test]
fn literal_arithmetic_records_literal_type() {
    let checked = check_source("const x = 2 + 3;", EvalOptions::default()).unwrap();
    assert_eq!(checked.decls[0].decl_type.to_string(), "5");
    assert!(dtz_solver::is_subtype(
        &checked.decls[0].decl_type,
        &dtz_solver::Type::INT
    ));
}

#[test]
fn comptime_assertion_leaves_no_residual() {
    let js = compile_ok("comptime const _ = assert(1 < 2);");
    assert_eq!(js, "");
}

#[test]
fn failed_assertion_is_a_diagnostic() {
    let diag = compile_err("comptime const _ = assert(1 > 2, \"math broke\");");
    assert!(diag.message.contains("assertion failed"));
    assert!(diag.message.contains("math broke"));
}

#[test]
fn bounded_generic_rejects_wide_argument() {
    let source = "const id = <T extends Number>(x: T) => x;\nid<String>(\"hi\");\n";
    let diag = compile_err(source);
    assert!(
        diag.message.contains("does not satisfy bound"),
        "unexpected message: {}",
        diag.message
    );
}

#[test]
fn bounded_generic_specializes_to_value() {
    let source = "const id = <T extends Number>(x: T) => x;\nconst y = id<Int>(3);\n";
    let js = compile_ok(source);
    // The generic itself is comptime-only; only the specialization
    // remains.
    assert_eq!(js, "const y = 3;\n");
}

#[test]
fn discriminated_union_narrowing() {
    let source = r#"
type Circle = { kind: "circle", r: Int };
type Square = { kind: "square", s: Int };
const area = (shape: Circle | Square) =>
  shape.kind == "circle" ? shape.r * shape.r * 3 : shape.s * shape.s;
"#;
    let js = compile_ok(source);
    // The ternary survives untouched; both field accesses were accepted.
    assert!(js.contains("shape.kind == \"circle\""));
    assert!(js.contains("shape.r * shape.r * 3"));
    assert!(js.contains("shape.s * shape.s"));
}

#[test]
fn open_record_admits_unknown_fields_dynamically() {
    let source = r#"
type Circle = { kind: "circle", r: Int };
type Square = { kind: "square", s: Int };
const area = (shape: Circle | Square) =>
  shape.kind == "circle" ? shape.extra * 2 : 0;
"#;
    // Narrowed to Circle, an open record: the unknown field types as
    // Unknown and survives to runtime. Closed records reject instead
    // (see `closed_record_rejects_unknown_field`).
    let js = compile_ok(source);
    assert!(js.contains("shape.extra * 2"));
}

#[test]
fn cluster_merges_identical_specializations() {
    let source = r#"
comptime const make = (k) => (x) => x;
const f1 = make(1);
const f2 = make(2);
"#;
    let js = compile_ok(source);
    // Both definitions collapse into one shared template.
    assert!(js.contains("const __tpl0 = (x) => x;"));
    assert!(js.contains("const f1 = __tpl0;"));
    assert!(js.contains("const f2 = __tpl0;"));
}

#[test]
fn cluster_parameterizes_differing_literals() {
    let source = r#"
comptime const make = (k) => (x) => x + k;
const f1 = make(1);
const f2 = make(2);
"#;
    let js = compile_ok(source);
    assert!(
        js.contains("const __tpl0 = (x, __k0) => x + __k0;"),
        "missing template in:\n{js}"
    );
    assert!(js.contains("const f1 = (x) => __tpl0(x, 1);"));
    assert!(js.contains("const f2 = (x) => __tpl0(x, 2);"));
}

#[test]
fn fuel_exhaustion_terminates_self_reference() {
    let source = "const loop = () => loop();\ncomptime const _ = loop();\n";
    let diag = compile_err(source);
    assert!(
        diag.message.contains("fuel exhausted"),
        "unexpected message: {}",
        diag.message
    );
}

// =============================================================================
// Further pipeline behavior
// =============================================================================

#[test]
fn recursive_function_residualizes_as_recursive_call() {
    let source = "const loop = () => loop();";
    let js = compile_ok(source);
    assert_eq!(js, "const loop = () => loop();\n");
}

#[test]
fn comptime_only_types_are_erased() {
    let source = r#"
type Point = { x: Int, y: Int };
const origin: Point = { x: 0, y: 0 };
"#;
    let js = compile_ok(source);
    assert_eq!(js, "const origin = { x: 0, y: 0 };\n");
}

#[test]
fn annotation_mismatch_is_reported() {
    let diag = compile_err("const n: Int = \"not a number\";");
    assert!(diag.message.contains("type mismatch"));
}

#[test]
fn runtime_intrinsic_hoists_a_binding() {
    let js = compile_ok("const x = runtime(1 + 2, \"input\");\nconst y = x;\n");
    assert!(js.contains("const input = 5;"), "got:\n{js}");
    assert!(js.contains("const x = input;"));
    assert!(js.contains("const y = x;"));
}

#[test]
fn comptime_rejects_later_input() {
    let source = "const x = runtime(1);\ncomptime const y = comptime(x + 1);\n";
    let diag = compile_err(source);
    assert!(diag.message.contains("not computable at compile time"));
}

#[test]
fn effectful_later_statement_survives_erasure() {
    let source = "import { log } from \"./io\";\nlog(1);\n";
    let js = compile_ok(source);
    assert!(js.contains("const { log } = require(\"./io\");"));
    assert!(js.contains("log(1);"));
}

#[test]
fn pure_comptime_statement_is_dropped() {
    let js = compile_ok("1 + 1;");
    assert_eq!(js, "");
}

#[test]
fn comptime_map_over_array() {
    let source = "const xs = [1, 2, 3].map((n) => n * n);";
    let js = compile_ok(source);
    assert_eq!(js, "const xs = [1, 4, 9];\n");
}

#[test]
fn string_methods_fold_at_compile_time() {
    let js = compile_ok("const s = \"hello\".toUpperCase().slice(0, 4);");
    assert_eq!(js, "const s = \"HELL\";\n");
}

#[test]
fn template_folds_when_fully_known() {
    let js = compile_ok("const s = `v=${1 + 2}`;");
    assert_eq!(js, "const s = \"v=3\";\n");
}

#[test]
fn keys_type_introspection() {
    let source = r#"
type Point = { x: Int, y: Int };
comptime const _ = assert(Point.fieldNames.length == 2);
comptime const _k = assert(Point.fieldNames[0] == "x");
"#;
    let js = compile_ok(source);
    assert_eq!(js, "");
}

#[test]
fn extends_is_first_class() {
    let source = "comptime const _ = assert(Int.extends(Number));\n\
                  comptime const _b = assert(!String.extends(Number));\n";
    let js = compile_ok(source);
    assert_eq!(js, "");
}

#[test]
fn match_selects_at_compile_time() {
    let source = r#"
const shape = { kind: "circle", r: 3 };
const area = match (shape) {
  { kind: "circle", r } => r * r * 3,
  { kind: "square", s } => s * s,
  _ => 0,
};
"#;
    let js = compile_ok(source);
    assert!(js.contains("const area = 27;"));
}

#[test]
fn closed_record_rejects_unknown_field() {
    let source = r#"
comptime const Point = RecordType({ x: Int }, Never);
const get = (p: Point) => p.missing;
"#;
    let diag = compile_err(source);
    assert!(diag.message.contains("no field `missing`"));
}

#[test]
fn guards_residualize_to_typeof_checks() {
    let source = "const f = (x) => isNumber(x) ? x : 0;";
    let js = compile_ok(source);
    assert!(js.contains("typeof x === \"number\""), "got:\n{js}");
}

#[test]
fn cyclic_value_binding_is_reported() {
    let diag = compile_err("comptime const x = x + 1;");
    assert!(
        diag.message.contains("depends on itself"),
        "unexpected message: {}",
        diag.message
    );
}

#[test]
fn division_always_floats() {
    let js = compile_ok("const x = 4 / 2;");
    assert_eq!(js, "const x = 2.0;\n");
}

#[test]
fn driver_reports_first_error_with_span() {
    let source = "const a = 1;\nconst b = missing;\n";
    let diag = compile_err(source);
    assert!(diag.message.contains("undefined identifier"));
    let span = diag.span.expect("span");
    assert_eq!(span.slice(source), "missing");
}
