//! The declaration walk.

use dtz_ast::{Decl, DeclKind, Program};
use dtz_common::diagnostics::Diagnostic;
use dtz_emitter::{JsExpr, JsLit, JsStmt};
use dtz_eval::{
    Binding, Env, EvalError, EvalErrorKind, EvalOptions, Evaluator, Value, global_env,
};
use std::rc::Rc;
use dtz_parser::parse_program;
use dtz_solver::{Prim, Type, is_subtype};
use dtz_staging::{Origin, SEnv, SValue, Stager};
use tracing::debug;

/// One checked declaration, ready for erasure.
#[derive(Debug)]
pub struct CheckedDecl {
    pub name: Option<String>,
    /// The declaration's recorded type.
    pub decl_type: Type,
    /// True when the declaration (and its transitive uses) never reach
    /// runtime: type-values, builtins, and `comptime` constants.
    pub comptime_only: bool,
    pub outcome: DeclOutcome,
}

/// What a declaration contributes to the residual program.
#[derive(Debug)]
pub enum DeclOutcome {
    /// Nothing: the value lives only at compile time.
    Comptime,
    /// A residual statement, preceded by any statements staging hoisted
    /// (`runtime(...)` bindings).
    Residual {
        hoisted: Vec<JsStmt>,
        stmt: JsStmt,
    },
    /// An expression statement with runtime effects.
    Effect {
        hoisted: Vec<JsStmt>,
        stmt: JsStmt,
    },
}

/// The result of checking a whole program.
#[derive(Debug)]
pub struct CheckedProgram {
    pub decls: Vec<CheckedDecl>,
}

/// Parse and check a source file.
pub fn check_source(source: &str, options: EvalOptions) -> Result<CheckedProgram, Diagnostic> {
    let program = parse_program(source)?;
    check_program(&program, options)
}

/// Check a parsed program. Fails fast: the first failing declaration
/// aborts with its diagnostic (the CLI decides whether to continue with
/// other files).
pub fn check_program(
    program: &Program,
    options: EvalOptions,
) -> Result<CheckedProgram, Diagnostic> {
    let mut evaluator = Evaluator::new(options);
    let comptime_env = global_env().child();
    let senv = SEnv::root(comptime_env.clone());
    let mut stager = Stager::new(&mut evaluator);
    let mut decls = Vec::with_capacity(program.decls.len());

    for decl in &program.decls {
        let checked = check_decl(&mut stager, &senv, &comptime_env, decl)
            .map_err(|err| decl_context(err, decl))?;
        decls.push(checked);
    }
    Ok(CheckedProgram { decls })
}

fn decl_context(err: EvalError, decl: &Decl) -> Diagnostic {
    let diagnostic = err.into_diagnostic();
    match &decl.kind {
        DeclKind::Const { name, .. } => {
            diagnostic.with_note(format!("while checking `{name}`"), Some(decl.span))
        }
        _ => diagnostic,
    }
}

fn check_decl(
    stager: &mut Stager<'_>,
    senv: &SEnv,
    comptime_env: &Env,
    decl: &Decl,
) -> Result<CheckedDecl, EvalError> {
    match &decl.kind {
        DeclKind::Import { bindings, module } => {
            // Module resolution is external; imported names are runtime
            // inputs of unknown type and the import survives erasure.
            for binding in bindings {
                senv.define(
                    &binding.name,
                    SValue::later(
                        Origin::ImportRef {
                            name: binding.name.clone(),
                        },
                        Type::UNKNOWN,
                    ),
                );
            }
            let stmt = JsStmt::ConstPattern {
                names: bindings.iter().map(|b| b.name.clone()).collect(),
                init: JsExpr::Call {
                    callee: Box::new(JsExpr::Var("require".to_string())),
                    args: vec![JsExpr::Lit(JsLit::Str(module.clone()))],
                },
            };
            Ok(CheckedDecl {
                name: None,
                decl_type: Type::UNKNOWN,
                comptime_only: false,
                outcome: DeclOutcome::Residual {
                    hoisted: vec![],
                    stmt,
                },
            })
        }

        DeclKind::Const {
            name,
            ty,
            init,
            comptime,
            ..
        } => {
            // Register the binding lazily before staging so recursive
            // definitions (a function calling itself) resolve; forcing a
            // true value cycle reports `CyclicBinding`.
            comptime_env.define(
                name,
                Binding::Unevaluated {
                    expr: Rc::new(init.clone()),
                    env: comptime_env.clone(),
                    ty: None,
                },
            );
            let sv = stager.stage(init, senv)?;
            let hoisted = stager.take_stmts();

            // Annotation check against the staged result.
            let annotated = match ty {
                Some(ty_expr) => {
                    let tv = {
                        let value_env = senv.bases().into_iter().next().unwrap_or_default();
                        stager.eval.evaluate(ty_expr, &value_env)?
                    };
                    match tv.value.as_type() {
                        Some(t) => Some(t.clone()),
                        None => {
                            return Err(EvalError::new(
                                EvalErrorKind::TypeMismatch {
                                    expected: "type".to_string(),
                                    found: tv.value.kind_name().to_string(),
                                },
                                ty_expr.span,
                            ));
                        }
                    }
                }
                None => None,
            };
            if let Some(annotated) = &annotated {
                let actual = sv.ty();
                if !matches!(actual.unwrap_metadata(), Type::Primitive(Prim::Unknown))
                    && !is_subtype(&actual, annotated)
                {
                    return Err(EvalError::new(
                        EvalErrorKind::TypeMismatch {
                            expected: annotated.to_string(),
                            found: actual.to_string(),
                        },
                        init.span,
                    ));
                }
            }
            let decl_type = annotated.unwrap_or_else(|| sv.ty());

            if *comptime {
                let SValue::Now(tv) = sv else {
                    return Err(EvalError::new(
                        EvalErrorKind::StagingError(
                            "not computable at compile time".to_string(),
                        ),
                        init.span,
                    ));
                };
                // Visible to later comptime lookups and type annotations.
                comptime_env.define(name, Binding::Evaluated(tv.clone()));
                senv.define(name, SValue::Now(tv.clone()));
                debug!(%name, "comptime constant recorded");
                return Ok(CheckedDecl {
                    name: Some(name.clone()),
                    decl_type,
                    comptime_only: true,
                    outcome: DeclOutcome::Comptime,
                });
            }

            match sv {
                SValue::Now(tv) => {
                    comptime_env.define(name, Binding::Evaluated(tv.clone()));
                    let comptime_only = is_comptime_only(&tv.value);
                    let outcome = if comptime_only {
                        DeclOutcome::Comptime
                    } else {
                        let js =
                            stager.residualize_decl(&SValue::Now(tv.clone()), name, init.span)?;
                        DeclOutcome::Residual {
                            hoisted,
                            stmt: JsStmt::Const {
                                name: name.clone(),
                                init: js,
                            },
                        }
                    };
                    senv.define(name, SValue::Now(tv));
                    Ok(CheckedDecl {
                        name: Some(name.clone()),
                        decl_type,
                        comptime_only,
                        outcome,
                    })
                }
                sv @ SValue::StagedClosure(_) => {
                    let js = stager.residualize_decl(&sv, name, init.span)?;
                    // Keep the symbolic closure for later comptime calls;
                    // runtime references use the emitted const.
                    senv.define(name, sv);
                    Ok(CheckedDecl {
                        name: Some(name.clone()),
                        decl_type,
                        comptime_only: false,
                        outcome: DeclOutcome::Residual {
                            hoisted,
                            stmt: JsStmt::Const {
                                name: name.clone(),
                                init: js,
                            },
                        },
                    })
                }
                sv => {
                    let js = stager.residualize(&sv, init.span)?;
                    senv.define(
                        name,
                        SValue::later(Origin::Residual(JsExpr::Var(name.clone())), sv.ty()),
                    );
                    Ok(CheckedDecl {
                        name: Some(name.clone()),
                        decl_type,
                        comptime_only: false,
                        outcome: DeclOutcome::Residual {
                            hoisted,
                            stmt: JsStmt::Const {
                                name: name.clone(),
                                init: js,
                            },
                        },
                    })
                }
            }
        }

        DeclKind::Expr(expr) => {
            let sv = stager.stage(expr, senv)?;
            let hoisted = stager.take_stmts();
            match sv {
                // Fully evaluated: any compile-time effects (assertions)
                // already ran; nothing remains for runtime.
                SValue::Now(_) => Ok(CheckedDecl {
                    name: None,
                    decl_type: Type::UNDEFINED,
                    comptime_only: true,
                    outcome: DeclOutcome::Comptime,
                }),
                sv => {
                    let js = stager.residualize(&sv, expr.span)?;
                    Ok(CheckedDecl {
                        name: None,
                        decl_type: Type::UNDEFINED,
                        comptime_only: false,
                        outcome: DeclOutcome::Effect {
                            hoisted,
                            stmt: JsStmt::Expr(js),
                        },
                    })
                }
            }
        }
    }
}

/// Values that never reach runtime: types and builtins, aggregates
/// containing them, and generic functions (a bounded type parameter can
/// only be supplied at compile time, so every surviving use is a
/// specialization).
fn is_comptime_only(value: &Value) -> bool {
    match value {
        Value::Type(_) | Value::Builtin(_) => true,
        Value::Record(fields) => fields.values().any(is_comptime_only),
        Value::Array(items) => items.iter().any(is_comptime_only),
        Value::Closure(closure) => closure
            .params
            .iter()
            .any(|p| matches!(&p.ty, Some(Type::Bounded(_)))),
        _ => false,
    }
}
