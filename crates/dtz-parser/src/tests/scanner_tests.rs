//! Scanner tests.

use crate::scanner::{Keyword, Scanner, TemplateRaw, TokenKind};

fn kinds(source: &str) -> Vec<TokenKind> {
    Scanner::new(source)
        .scan_all()
        .expect("scan failed")
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn punctuation_and_operators() {
    let toks = kinds("( ) => = == != <= >= && || ... . @");
    assert_eq!(
        toks,
        vec![
            TokenKind::LParen,
            TokenKind::RParen,
            TokenKind::Arrow,
            TokenKind::Assign,
            TokenKind::EqEq,
            TokenKind::NotEq,
            TokenKind::Lte,
            TokenKind::Gte,
            TokenKind::AndAnd,
            TokenKind::OrOr,
            TokenKind::DotDotDot,
            TokenKind::Dot,
            TokenKind::At,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn numbers() {
    assert_eq!(
        kinds("42 3.5 0"),
        vec![
            TokenKind::Int(42),
            TokenKind::Float(3.5),
            TokenKind::Int(0),
            TokenKind::Eof
        ]
    );
}

#[test]
fn member_access_after_int_is_not_a_float() {
    // `xs.0` is invalid anyway, but `1.toString` style input must not
    // swallow the dot into a float.
    assert_eq!(
        kinds("1.x"),
        vec![
            TokenKind::Int(1),
            TokenKind::Dot,
            TokenKind::Ident("x".into()),
            TokenKind::Eof
        ]
    );
}

#[test]
fn strings_and_escapes() {
    assert_eq!(
        kinds(r#""a\nb" 'c'"#),
        vec![
            TokenKind::Str("a\nb".into()),
            TokenKind::Str("c".into()),
            TokenKind::Eof
        ]
    );
}

#[test]
fn keywords_vs_identifiers() {
    assert_eq!(
        kinds("const constant comptime"),
        vec![
            TokenKind::Keyword(Keyword::Const),
            TokenKind::Ident("constant".into()),
            TokenKind::Keyword(Keyword::Comptime),
            TokenKind::Eof
        ]
    );
}

#[test]
fn comments_are_trivia() {
    assert_eq!(
        kinds("1 // line\n/* block */ 2"),
        vec![TokenKind::Int(1), TokenKind::Int(2), TokenKind::Eof]
    );
}

#[test]
fn template_literal_parts() {
    let toks = kinds("`a${x}b`");
    let TokenKind::Template(parts) = &toks[0] else {
        panic!("expected template, got {:?}", toks[0]);
    };
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], TemplateRaw::Text("a".into()));
    assert!(matches!(parts[1], TemplateRaw::Interp(span) if span.slice("`a${x}b`") == "x"));
    assert_eq!(parts[2], TemplateRaw::Text("b".into()));
}

#[test]
fn template_interpolation_with_nested_braces() {
    let src = "`v=${ do { const a = 1; a } }`";
    let toks = kinds(src);
    let TokenKind::Template(parts) = &toks[0] else {
        panic!("expected template");
    };
    let TemplateRaw::Interp(span) = &parts[1] else {
        panic!("expected interpolation");
    };
    assert!(span.slice(src).contains("const a = 1"));
}

#[test]
fn unterminated_string_is_an_error() {
    assert!(Scanner::new("\"abc").scan_all().is_err());
    assert!(Scanner::new("`abc").scan_all().is_err());
}
