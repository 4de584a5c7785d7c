//! Driver tests: the compile pipeline and file round-trips.

use dtz_cli::{CompileOutcome, compile_text};
use std::io::Write;

fn compile_ok(source: &str) -> String {
    match compile_text(source, dtz_common::limits::DEFAULT_FUEL) {
        CompileOutcome::Success { js } => js,
        CompileOutcome::Failure { diagnostic } => {
            panic!("compile failed: {}", diagnostic.render(source))
        }
    }
}

#[test]
fn compile_produces_plain_js() {
    // Comptime values are folded everywhere, including inside residual
    // function bodies.
    let js = compile_ok("const x = 2 + 3;\nconst f = (n) => n + x;\n");
    assert_eq!(js, "const x = 5;\nconst f = (n) => n + 5;\n");
}

#[test]
fn diagnostics_render_with_stage_and_caret() {
    let source = "const y = nope;\n";
    let CompileOutcome::Failure { diagnostic } =
        compile_text(source, dtz_common::limits::DEFAULT_FUEL)
    else {
        panic!("expected failure");
    };
    let rendered = diagnostic.render(source);
    assert!(rendered.starts_with("typecheck error:"));
    assert!(rendered.contains('^'));
}

#[test]
fn diagnostics_serialize_to_json() {
    let source = "const y = (;\n";
    let CompileOutcome::Failure { diagnostic } =
        compile_text(source, dtz_common::limits::DEFAULT_FUEL)
    else {
        panic!("expected failure");
    };
    let json = serde_json::to_string(&diagnostic).unwrap();
    assert!(json.contains("\"stage\":\"parse\""));
}

#[test]
fn custom_fuel_budget_applies() {
    let source = "const loop = () => loop();\ncomptime const _ = loop();\n";
    let CompileOutcome::Failure { diagnostic } = compile_text(source, 50) else {
        panic!("expected fuel exhaustion");
    };
    assert!(diagnostic.message.contains("fuel exhausted"));
}

#[test]
fn compiled_file_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let src_path = dir.path().join("main.dtz");
    let mut file = std::fs::File::create(&src_path).unwrap();
    writeln!(file, "const x = 40 + 2;").unwrap();

    let source = std::fs::read_to_string(&src_path).unwrap();
    let js = compile_ok(&source);
    let out_path = dir.path().join("main.js");
    std::fs::write(&out_path, &js).unwrap();
    assert_eq!(std::fs::read_to_string(&out_path).unwrap(), "const x = 42;\n");
}
