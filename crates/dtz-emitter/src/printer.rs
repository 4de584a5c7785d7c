//! Textual JS printer.
//!
//! A deterministic walk of the residual model: 2-space indent,
//! parentheses by precedence. The output is plain ES2020; no formatting
//! guarantees beyond determinism and re-parseability.

use crate::js::{JsBody, JsExpr, JsLit, JsStmt};
use std::fmt::Write as _;

/// Print a whole residual program.
pub fn print_program(stmts: &[JsStmt]) -> String {
    let mut printer = Printer::new();
    for stmt in stmts {
        printer.stmt(stmt);
    }
    printer.out
}

/// Print a single expression (tests and diagnostics).
pub fn print_expr(expr: &JsExpr) -> String {
    let mut printer = Printer::new();
    printer.expr(expr, 0);
    printer.out
}

struct Printer {
    out: String,
    indent: usize,
}

// Precedence levels, loosest to tightest. An operand is parenthesized
// when its own level is looser than its context requires.
const PREC_TERNARY: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_EQ: u8 = 4;
const PREC_REL: u8 = 5;
const PREC_ADD: u8 = 6;
const PREC_MUL: u8 = 7;
const PREC_UNARY: u8 = 8;
const PREC_POSTFIX: u8 = 9;

fn binop_prec(op: &str) -> u8 {
    match op {
        "||" => PREC_OR,
        "&&" => PREC_AND,
        "==" | "!=" | "===" | "!==" => PREC_EQ,
        "<" | "<=" | ">" | ">=" => PREC_REL,
        "+" | "-" => PREC_ADD,
        "*" | "/" | "%" => PREC_MUL,
        _ => PREC_EQ,
    }
}

impl Printer {
    fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    fn stmt(&mut self, stmt: &JsStmt) {
        match stmt {
            JsStmt::Const { name, init } => {
                self.write_indent();
                let _ = write!(self.out, "const {name} = ");
                self.expr(init, 0);
                self.out.push_str(";\n");
            }
            JsStmt::Let { name, init } => {
                self.write_indent();
                match init {
                    Some(init) => {
                        let _ = write!(self.out, "let {name} = ");
                        self.expr(init, 0);
                        self.out.push_str(";\n");
                    }
                    None => {
                        let _ = writeln!(self.out, "let {name};");
                    }
                }
            }
            JsStmt::Return(value) => {
                self.write_indent();
                match value {
                    Some(value) => {
                        self.out.push_str("return ");
                        self.expr(value, 0);
                        self.out.push_str(";\n");
                    }
                    None => self.out.push_str("return;\n"),
                }
            }
            JsStmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.write_indent();
                self.out.push_str("if (");
                self.expr(cond, 0);
                self.out.push_str(") {\n");
                self.indent += 1;
                for stmt in then_branch {
                    self.stmt(stmt);
                }
                self.indent -= 1;
                match else_branch {
                    Some(else_branch) => {
                        self.line("} else {");
                        self.indent += 1;
                        for stmt in else_branch {
                            self.stmt(stmt);
                        }
                        self.indent -= 1;
                        self.line("}");
                    }
                    None => self.line("}"),
                }
            }
            JsStmt::ForOf {
                binding,
                iterable,
                body,
            } => {
                self.write_indent();
                let _ = write!(self.out, "for (const {binding} of ");
                self.expr(iterable, 0);
                self.out.push_str(") {\n");
                self.indent += 1;
                for stmt in body {
                    self.stmt(stmt);
                }
                self.indent -= 1;
                self.line("}");
            }
            JsStmt::Expr(expr) => {
                self.write_indent();
                self.expr(expr, 0);
                self.out.push_str(";\n");
            }
            JsStmt::ConstPattern { names, init } => {
                self.write_indent();
                let _ = write!(self.out, "const {{ {} }} = ", names.join(", "));
                self.expr(init, 0);
                self.out.push_str(";\n");
            }
            JsStmt::Throw(value) => {
                self.write_indent();
                self.out.push_str("throw ");
                self.expr(value, 0);
                self.out.push_str(";\n");
            }
            JsStmt::Continue => self.line("continue;"),
            JsStmt::Break => self.line("break;"),
        }
    }

    fn expr(&mut self, expr: &JsExpr, min_prec: u8) {
        match expr {
            JsExpr::Lit(lit) => self.lit(lit),
            JsExpr::Var(name) => self.out.push_str(name),
            JsExpr::Binop { op, left, right } => {
                let prec = binop_prec(op);
                let parens = prec < min_prec;
                if parens {
                    self.out.push('(');
                }
                self.expr(left, prec);
                let _ = write!(self.out, " {op} ");
                self.expr(right, prec + 1);
                if parens {
                    self.out.push(')');
                }
            }
            JsExpr::Unary { op, operand } => {
                let parens = PREC_UNARY < min_prec;
                if parens {
                    self.out.push('(');
                }
                self.out.push_str(op);
                self.expr(operand, PREC_UNARY);
                if parens {
                    self.out.push(')');
                }
            }
            JsExpr::Call { callee, args } => {
                self.maybe_paren_callee(callee);
                self.out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(arg, 0);
                }
                self.out.push(')');
            }
            JsExpr::Method { object, name, args } => {
                self.expr(object, PREC_POSTFIX);
                let _ = write!(self.out, ".{name}(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(arg, 0);
                }
                self.out.push(')');
            }
            JsExpr::Arrow {
                params,
                body,
                is_async,
            } => {
                let parens = min_prec > 0;
                if parens {
                    self.out.push('(');
                }
                if *is_async {
                    self.out.push_str("async ");
                }
                let _ = write!(self.out, "({})", params.join(", "));
                self.out.push_str(" => ");
                match body {
                    JsBody::Expr(body) => {
                        // An object literal body needs parentheses.
                        if matches!(**body, JsExpr::Object(_)) {
                            self.out.push('(');
                            self.expr(body, 0);
                            self.out.push(')');
                        } else {
                            self.expr(body, PREC_TERNARY);
                        }
                    }
                    JsBody::Block(stmts) => self.block(stmts),
                }
                if parens {
                    self.out.push(')');
                }
            }
            JsExpr::NamedFn {
                name,
                params,
                body,
                is_async,
            } => {
                if *is_async {
                    self.out.push_str("async ");
                }
                let _ = write!(self.out, "function {name}({}) ", params.join(", "));
                self.block(body);
            }
            JsExpr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                let parens = PREC_TERNARY < min_prec;
                if parens {
                    self.out.push('(');
                }
                self.expr(cond, PREC_OR);
                self.out.push_str(" ? ");
                self.expr(then_branch, PREC_TERNARY);
                self.out.push_str(" : ");
                self.expr(else_branch, PREC_TERNARY);
                if parens {
                    self.out.push(')');
                }
            }
            JsExpr::Member { object, name } => {
                self.maybe_paren_callee(object);
                let _ = write!(self.out, ".{name}");
            }
            JsExpr::Index { object, index } => {
                self.maybe_paren_callee(object);
                self.out.push('[');
                self.expr(index, 0);
                self.out.push(']');
            }
            JsExpr::Object(fields) => {
                if fields.is_empty() {
                    self.out.push_str("{}");
                    return;
                }
                self.out.push_str("{ ");
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    let _ = write!(self.out, "{name}: ");
                    self.expr(value, 0);
                }
                self.out.push_str(" }");
            }
            JsExpr::Array(items) => {
                self.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.out.push_str(", ");
                    }
                    self.expr(item, 0);
                }
                self.out.push(']');
            }
            JsExpr::Iife(stmts) => {
                self.out.push_str("(() => ");
                self.block(stmts);
                self.out.push_str(")()");
            }
            JsExpr::Await(operand) => {
                let parens = PREC_UNARY < min_prec;
                if parens {
                    self.out.push('(');
                }
                self.out.push_str("await ");
                self.expr(operand, PREC_UNARY);
                if parens {
                    self.out.push(')');
                }
            }
        }
    }

    /// Function expressions in callee/member position need parentheses.
    fn maybe_paren_callee(&mut self, expr: &JsExpr) {
        if matches!(
            expr,
            JsExpr::Arrow { .. }
                | JsExpr::NamedFn { .. }
                | JsExpr::Ternary { .. }
                | JsExpr::Binop { .. }
                | JsExpr::Unary { .. }
                | JsExpr::Object(_)
                | JsExpr::Await(_)
        ) {
            self.out.push('(');
            self.expr(expr, 0);
            self.out.push(')');
        } else {
            self.expr(expr, PREC_POSTFIX);
        }
    }

    fn block(&mut self, stmts: &[JsStmt]) {
        self.out.push_str("{\n");
        self.indent += 1;
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.write_indent();
        self.out.push('}');
    }

    fn lit(&mut self, lit: &JsLit) {
        match lit {
            JsLit::Int(n) => {
                if *n < 0 {
                    let _ = write!(self.out, "({n})");
                } else {
                    let _ = write!(self.out, "{n}");
                }
            }
            JsLit::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    let _ = write!(self.out, "{n:.1}");
                } else {
                    let _ = write!(self.out, "{n}");
                }
            }
            JsLit::Str(s) => {
                let _ = write!(self.out, "{s:?}");
            }
            JsLit::Bool(b) => {
                let _ = write!(self.out, "{b}");
            }
            JsLit::Null => self.out.push_str("null"),
            JsLit::Undefined => self.out.push_str("undefined"),
        }
    }
}
