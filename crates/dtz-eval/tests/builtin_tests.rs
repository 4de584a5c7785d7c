//! Builtin surface tests: type constructors, guards, methods, and
//! type-value properties.

use dtz_eval::{EvalErrorKind, EvalOptions, Evaluator, TypedValue, Value, global_env};
use dtz_parser::parse_program;
use dtz_solver::{LitValue, Prim, Type};

fn eval(source: &str) -> Result<TypedValue, dtz_eval::EvalError> {
    let program = parse_program(source).expect("parse failed");
    let mut evaluator = Evaluator::new(EvalOptions::default());
    let env = global_env().child();
    let mut last = None;
    for decl in &program.decls {
        match &decl.kind {
            dtz_ast::DeclKind::Const { name, init, .. } => {
                let tv = evaluator.evaluate(init, &env)?;
                env.define_value(name, tv.clone());
                last = Some(tv);
            }
            dtz_ast::DeclKind::Expr(e) => last = Some(evaluator.evaluate(e, &env)?),
            dtz_ast::DeclKind::Import { .. } => {}
        }
    }
    Ok(last.expect("no declarations"))
}

fn eval_type(source: &str) -> Type {
    match eval(source).expect("evaluation failed").value {
        Value::Type(t) => t,
        other => panic!("expected type-value, got {other}"),
    }
}

// =============================================================================
// Type constructors
// =============================================================================

#[test]
fn union_and_intersection() {
    assert_eq!(
        eval_type("const t = Union(Int, String);"),
        Type::Union(vec![Type::INT, Type::STRING])
    );
    let t = eval_type("const t = Intersection(RecordType({ a: Int }), RecordType({ b: Int }));");
    assert!(matches!(t, Type::Intersection(_)));
}

#[test]
fn record_type_with_never_index_is_closed() {
    let t = eval_type("const t = RecordType({ x: Int }, Never);");
    let Type::Record { closed, .. } = t else { panic!() };
    assert!(closed);

    let t = eval_type("const t = RecordType({ x: Int });");
    let Type::Record { closed, .. } = t else { panic!() };
    assert!(!closed);
}

#[test]
fn array_type_arity_selects_variadic_or_tuple() {
    assert!(matches!(
        eval_type("const t = Array(Int);"),
        Type::Array { variadic: true, .. }
    ));
    let t = eval_type("const t = Array(Int, String);");
    let Type::Array { elements, variadic } = t else {
        panic!()
    };
    assert!(!variadic);
    assert_eq!(elements, vec![Type::INT, Type::STRING]);
}

#[test]
fn function_type_constructor() {
    let t = eval_type("const t = FunctionType([Int, String], Boolean);");
    let Type::Function {
        params,
        return_type,
        ..
    } = t
    else {
        panic!()
    };
    assert_eq!(params.len(), 2);
    assert_eq!(*return_type, Type::BOOLEAN);
}

#[test]
fn branded_and_literal_types() {
    let t = eval_type("const t = Branded(String, \"UserId\");");
    assert!(matches!(t, Type::Branded { ref brand, .. } if brand == "UserId"));

    let t = eval_type("const t = LiteralType(42);");
    assert_eq!(t, Type::Literal(LitValue::Int(42), Prim::Int));
}

#[test]
fn with_metadata_wraps() {
    let t = eval_type(
        "const t = WithMetadata(Int, { name: \"Age\", annotations: [\"doc\"] });",
    );
    let Type::WithMetadata {
        inner,
        name,
        annotations,
        ..
    } = t
    else {
        panic!()
    };
    assert_eq!(*inner, Type::INT);
    assert_eq!(name.as_deref(), Some("Age"));
    assert_eq!(annotations, vec![LitValue::Str("doc".into())]);
}

#[test]
fn type_of_bound_creates_bounded() {
    let t = eval_type("const t = Type(Number);");
    assert_eq!(t, Type::Bounded(Box::new(Type::NUMBER)));
}

// =============================================================================
// Guards and assert
// =============================================================================

#[test]
fn classification_guards() {
    let truthy = [
        "isNumber(1)",
        "isNumber(1.5)",
        "isString(\"s\")",
        "isBool(true)",
        "isNull(null)",
        "isObject({ a: 1 })",
        "isArray([1])",
        "isFunction((x) => x)",
    ];
    for case in truthy {
        let tv = eval(&format!("const x = {case};")).unwrap();
        assert!(matches!(tv.value, Value::Bool(true)), "{case}");
    }
    let tv = eval("const x = isNumber(\"no\");").unwrap();
    assert!(matches!(tv.value, Value::Bool(false)));
}

#[test]
fn assert_passes_and_fails() {
    assert!(eval("assert(1 < 2);").is_ok());
    let err = eval("assert(false, \"nope\");").unwrap_err();
    assert!(matches!(
        err.kind,
        EvalErrorKind::AssertionFailed(Some(ref m)) if m == "nope"
    ));
}

// =============================================================================
// Type-value properties
// =============================================================================

#[test]
fn record_properties() {
    let tv = eval("const t = RecordType({ x: Int, y: String });\nconst n = t.fieldNames;")
        .unwrap();
    let Value::Array(names) = tv.value else { panic!() };
    assert_eq!(names.len(), 2);

    let tv = eval("const t = RecordType({ x: Int });\nconst f = t.fields.x;").unwrap();
    assert!(matches!(tv.value, Value::Type(Type::Primitive(Prim::Int))));
}

#[test]
fn keys_type_is_a_union_of_literals() {
    let t = eval_type("const t = RecordType({ x: Int, y: Int }).keysType;");
    assert_eq!(
        t,
        Type::Union(vec![
            Type::Literal(LitValue::Str("x".into()), Prim::String),
            Type::Literal(LitValue::Str("y".into()), Prim::String),
        ])
    );
}

#[test]
fn union_variants_property() {
    let tv = eval("const t = Union(Int, String).variants;").unwrap();
    let Value::Array(variants) = tv.value else { panic!() };
    assert_eq!(variants.len(), 2);
}

#[test]
fn function_properties() {
    let t = eval_type("const t = FunctionType([Int], String).returnType;");
    assert_eq!(t, Type::STRING);
    let tv = eval("const t = FunctionType([Int], String).parameterTypes;").unwrap();
    assert!(matches!(tv.value, Value::Array(v) if v.len() == 1));
}

#[test]
fn intersection_signature_access_is_ambiguous() {
    let err = eval(
        "const t = Intersection(FunctionType([Int], Int), FunctionType([String], String));\n\
         const r = t.returnType;",
    )
    .unwrap_err();
    assert!(matches!(err.kind, EvalErrorKind::AmbiguousSignature(_)));
}

#[test]
fn branded_properties() {
    let t = eval_type("const t = Branded(String, \"Id\").baseType;");
    assert_eq!(t, Type::STRING);
    let tv = eval("const b = Branded(String, \"Id\").brand;").unwrap();
    assert!(matches!(tv.value, Value::Str(s) if s == "Id"));
}

#[test]
fn metadata_properties_default_elsewhere() {
    let tv = eval("const n = Int.typeArgs;").unwrap();
    assert!(matches!(tv.value, Value::Array(v) if v.is_empty()));
    let tv = eval("const n = WithMetadata(Int, { name: \"Age\" }).name;").unwrap();
    assert!(matches!(tv.value, Value::Str(s) if s == "Age"));
}

#[test]
fn extends_method_on_type_values() {
    let tv = eval("const b = Int.extends(Number);").unwrap();
    assert!(matches!(tv.value, Value::Bool(true)));
    let tv = eval("const b = Number.extends(Int);").unwrap();
    assert!(matches!(tv.value, Value::Bool(false)));
}

// =============================================================================
// Array and string methods
// =============================================================================

#[test]
fn array_callback_methods() {
    let tv = eval("const v = [1, 2, 3, 4].filter((n) => n % 2 == 0).map((n) => n * 10);")
        .unwrap();
    let Value::Array(items) = tv.value else { panic!() };
    assert!(matches!(items[0], Value::Int(20)));
    assert!(matches!(items[1], Value::Int(40)));
}

#[test]
fn callback_receives_element_index_array() {
    let tv = eval("const v = [10, 20].map((x, i) => x + i);").unwrap();
    let Value::Array(items) = tv.value else { panic!() };
    assert!(matches!(items[0], Value::Int(10)));
    assert!(matches!(items[1], Value::Int(21)));
}

#[test]
fn reduce_with_and_without_initial() {
    let tv = eval("const v = [1, 2, 3].reduce((a, b) => a + b);").unwrap();
    assert!(matches!(tv.value, Value::Int(6)));
    let tv = eval("const v = [1, 2, 3].reduce((a, b) => a + b, 10);").unwrap();
    assert!(matches!(tv.value, Value::Int(16)));
}

#[test]
fn find_and_find_index() {
    let tv = eval("const v = [1, 8, 3].find((n) => n > 5);").unwrap();
    assert!(matches!(tv.value, Value::Int(8)));
    let tv = eval("const v = [1, 8, 3].findIndex((n) => n > 5);").unwrap();
    assert!(matches!(tv.value, Value::Int(1)));
    let tv = eval("const v = [1, 2].find((n) => n > 5);").unwrap();
    assert!(matches!(tv.value, Value::Undefined));
}

#[test]
fn some_every_includes_index_of() {
    assert!(matches!(
        eval("const v = [1, 2].some((n) => n == 2);").unwrap().value,
        Value::Bool(true)
    ));
    assert!(matches!(
        eval("const v = [1, 2].every((n) => n > 0);").unwrap().value,
        Value::Bool(true)
    ));
    assert!(matches!(
        eval("const v = [1, 2, 3].indexOf(3);").unwrap().value,
        Value::Int(2)
    ));
    assert!(matches!(
        eval("const v = [1, 2].includes(9);").unwrap().value,
        Value::Bool(false)
    ));
}

#[test]
fn flat_and_flat_map() {
    let tv = eval("const v = [[1, 2], [3]].flat();").unwrap();
    let Value::Array(items) = tv.value else { panic!() };
    assert_eq!(items.len(), 3);
    let tv = eval("const v = [1, 2].flatMap((n) => [n, n]);").unwrap();
    let Value::Array(items) = tv.value else { panic!() };
    assert_eq!(items.len(), 4);
}

#[test]
fn join_slice_concat() {
    assert!(matches!(
        eval("const v = [1, 2, 3].join(\"-\");").unwrap().value,
        Value::Str(s) if s == "1-2-3"
    ));
    let tv = eval("const v = [1, 2, 3, 4].slice(1, 3);").unwrap();
    let Value::Array(items) = tv.value else { panic!() };
    assert_eq!(items.len(), 2);
    let tv = eval("const v = [1].concat([2, 3], 4);").unwrap();
    let Value::Array(items) = tv.value else { panic!() };
    assert_eq!(items.len(), 4);
}

#[test]
fn string_methods() {
    let cases: &[(&str, &str)] = &[
        ("\"hello\".toUpperCase()", "HELLO"),
        ("\"  pad  \".trim()", "pad"),
        ("\"a-b-c\".replace(\"-\", \"+\")", "a+b-c"),
        ("\"a-b-c\".replaceAll(\"-\", \"+\")", "a+b+c"),
        ("\"ab\".repeat(3)", "ababab"),
        ("\"7\".padStart(3, \"0\")", "007"),
        ("\"abcdef\".substring(1, 3)", "bc"),
        ("\"abcdef\".slice(0 - 2)", "ef"),
        ("\"abc\".charAt(1)", "b"),
    ];
    for (expr, expected) in cases {
        let tv = eval(&format!("const v = {expr};")).unwrap();
        assert!(
            matches!(&tv.value, Value::Str(s) if s == expected),
            "{expr} => {:?}",
            tv.value
        );
    }
}

#[test]
fn string_predicates_and_split() {
    assert!(matches!(
        eval("const v = \"hello\".startsWith(\"he\");").unwrap().value,
        Value::Bool(true)
    ));
    assert!(matches!(
        eval("const v = \"hello\".indexOf(\"l\");").unwrap().value,
        Value::Int(2)
    ));
    assert!(matches!(
        eval("const v = \"hello\".lastIndexOf(\"l\");").unwrap().value,
        Value::Int(3)
    ));
    let tv = eval("const v = \"a,b,c\".split(\",\");").unwrap();
    let Value::Array(items) = tv.value else { panic!() };
    assert_eq!(items.len(), 3);
    let tv = eval("const v = \"abc\".split(\"\");").unwrap();
    let Value::Array(items) = tv.value else { panic!() };
    assert_eq!(items.len(), 3);
}

#[test]
fn string_length_and_char_code() {
    assert!(matches!(
        eval("const v = \"hello\".length;").unwrap().value,
        Value::Int(5)
    ));
    assert!(matches!(
        eval("const v = \"A\".charCodeAt(0);").unwrap().value,
        Value::Int(65)
    ));
}
