//! The staged evaluator.
//!
//! `stage` first tries the all-`Now` shortcut: when every free
//! identifier of the expression resolves to a compile-time value and no
//! staging-only form (`await`, `runtime`) appears outside a lambda body,
//! the expression is handed to the ordinary evaluator and the result is
//! `Now`. Otherwise the expression residualizes structurally, with guard
//! refinements narrowing `Later` bindings per `if` branch.

use crate::free_vars::{contains_staging_form, free_vars};
use crate::svalue::{Origin, Resolution, SEnv, SValue, StagedClosure};
use dtz_ast::{
    Arg, ArrayItem, BinaryOp, Decl, DeclKind, Expr, ExprKind, RecordItem, TemplatePart, UnaryOp,
};
use dtz_common::limits::MAX_RESIDUAL_NODES;
use dtz_common::span::Span;
use dtz_emitter::{JsBody, JsExpr, JsLit, JsStmt};
use dtz_eval::{
    Builtin, BuiltinFn, Closure, Env, EvalError, EvalErrorKind, EvalResult, Evaluator, TypedValue,
    Value, interp,
};
use dtz_solver::{
    Constraint, Prim, Type, extract_refinement, is_subtype, narrow, narrow_type,
    negate_refinement, type_to_constraint,
};
use std::rc::Rc;
use tracing::trace;

/// The staged evaluator. Owns the residual statement buffer; counters
/// live on the wrapped [`Evaluator`].
pub struct Stager<'e> {
    pub eval: &'e mut Evaluator,
    /// Residual statements hoisted to the current declaration boundary
    /// (`runtime(...)` bindings).
    stmts: Vec<JsStmt>,
    residual_nodes: u32,
}

impl<'e> Stager<'e> {
    pub fn new(eval: &'e mut Evaluator) -> Self {
        Self {
            eval,
            stmts: Vec::new(),
            residual_nodes: 0,
        }
    }

    /// Drain the residual statements accumulated since the last call.
    pub fn take_stmts(&mut self) -> Vec<JsStmt> {
        std::mem::take(&mut self.stmts)
    }

    fn bump_residual(&mut self, span: Span) -> EvalResult<()> {
        self.residual_nodes += 1;
        if self.residual_nodes > MAX_RESIDUAL_NODES {
            return Err(EvalError::new(
                EvalErrorKind::StagingError("residual graph grew without bound".to_string()),
                span,
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Entry point
    // =========================================================================

    pub fn stage(&mut self, expr: &Expr, env: &SEnv) -> EvalResult<SValue> {
        // Specialization recursion grows the stack like evaluation does.
        stacker::maybe_grow(64 * 1024, 1024 * 1024, || self.stage_grown(expr, env))
    }

    fn stage_grown(&mut self, expr: &Expr, env: &SEnv) -> EvalResult<SValue> {
        // The all-Now shortcut: evaluate outright when nothing Later (or
        // staging-only) is involved.
        if !contains_staging_form(expr) && self.all_free_now(expr, env) {
            let value_env = self.materialize(expr, env)?;
            let tv = self.eval.evaluate(expr, &value_env)?;
            return Ok(SValue::Now(tv));
        }
        self.stage_structural(expr, env)
    }

    /// Every free identifier resolves to a `Now` slot or a comptime base
    /// binding.
    fn all_free_now(&mut self, expr: &Expr, env: &SEnv) -> bool {
        for name in free_vars(expr) {
            match env.resolve(&name) {
                Some(Resolution::Staged(SValue::Now(_))) => {}
                Some(Resolution::Staged(_)) => return false,
                Some(Resolution::Base(_)) => {}
                // Unknown names become errors during evaluation.
                None => {}
            }
        }
        true
    }

    /// Build a value environment for the all-Now shortcut: the innermost
    /// base env extended with every free name the expression uses, in
    /// lexical resolution order. Base bindings are carried over as-is so
    /// laziness is preserved.
    fn materialize(&mut self, expr: &Expr, env: &SEnv) -> EvalResult<Env> {
        let base = env.bases().into_iter().next().unwrap_or_default();
        let value_env = base.child();
        for name in free_vars(expr) {
            match env.resolve(&name) {
                Some(Resolution::Staged(SValue::Now(tv))) => {
                    value_env.define_value(name, tv);
                }
                Some(Resolution::Base(owner)) => {
                    if let Some((binding, _)) = owner.lookup(&name) {
                        value_env.define(name, binding);
                    }
                }
                _ => {}
            }
        }
        Ok(value_env)
    }

    // =========================================================================
    // Structural staging
    // =========================================================================

    fn stage_structural(&mut self, expr: &Expr, env: &SEnv) -> EvalResult<SValue> {
        match &expr.kind {
            ExprKind::Literal(_) => {
                // Reached only under a staging form; evaluate directly.
                let tv = self.eval.evaluate(expr, &Env::new())?;
                Ok(SValue::Now(tv))
            }
            ExprKind::Ident(name) => self.lookup(name, env, expr.span),
            ExprKind::Binary { op, left, right } => {
                self.stage_binary(*op, left, right, env, expr.span)
            }
            ExprKind::Unary { op, operand } => {
                let sv = self.stage(operand, env)?;
                match sv {
                    SValue::Now(tv) => Ok(SValue::Now(self.eval.unary_op(*op, &tv, operand.span)?)),
                    later => {
                        self.bump_residual(expr.span)?;
                        let js = self.residualize(&later, operand.span)?;
                        let ty = match op {
                            UnaryOp::Not => Type::BOOLEAN,
                            UnaryOp::Neg => Type::NUMBER,
                        };
                        Ok(SValue::later(
                            Origin::Residual(JsExpr::Unary {
                                op: op.as_str().to_string(),
                                operand: Box::new(js),
                            }),
                            ty,
                        ))
                    }
                }
            }
            ExprKind::Call { callee, args } => self.stage_call(callee, args, env, expr.span),
            ExprKind::Property {
                object,
                name,
                name_span,
            } => self.stage_property(object, name, *name_span, env),
            ExprKind::Index { object, index } => self.stage_index(object, index, env, expr.span),
            ExprKind::Lambda(lambda) => Ok(SValue::StagedClosure(Rc::new(StagedClosure {
                lambda: (**lambda).clone(),
                env: env.clone(),
            }))),
            ExprKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => self.stage_conditional(cond, then_branch, else_branch, env, expr.span),
            ExprKind::Record(items) => self.stage_record(items, env, expr.span),
            ExprKind::Array(items) => self.stage_array(items, env, expr.span),
            ExprKind::Match { scrutinee, cases } => {
                self.stage_match(scrutinee, cases, env, expr.span)
            }
            ExprKind::Throw(inner) => {
                let sv = self.stage(inner, env)?;
                let js = self.residualize(&sv, inner.span)?;
                self.bump_residual(expr.span)?;
                Ok(SValue::later(
                    Origin::Residual(JsExpr::Iife(vec![JsStmt::Throw(js)])),
                    Type::NEVER,
                ))
            }
            // `await` passes through as a Later wrapped around its operand.
            ExprKind::Await(inner) => {
                let sv = self.stage(inner, env)?;
                let js = self.residualize(&sv, inner.span)?;
                self.bump_residual(expr.span)?;
                Ok(SValue::later(
                    Origin::Residual(JsExpr::Await(Box::new(js))),
                    Type::UNKNOWN,
                ))
            }
            ExprKind::Template(parts) => self.stage_template(parts, env, expr.span),
            ExprKind::Block { decls, result } => {
                self.stage_block(decls, result.as_deref(), env, expr.span)
            }
        }
    }

    /// Identifier staging: staged slots win, base bindings force to Now.
    fn lookup(&mut self, name: &str, env: &SEnv, span: Span) -> EvalResult<SValue> {
        match env.resolve(name) {
            Some(Resolution::Staged(sv)) => Ok(sv),
            Some(Resolution::Base(base)) => {
                let tv = self.eval.get_value(name, &base, span)?;
                Ok(SValue::Now(tv))
            }
            None => Err(EvalError::new(
                EvalErrorKind::UndefinedIdentifier(name.to_string()),
                span,
            )),
        }
    }

    fn stage_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        // Short-circuit operators decide on a Now left operand without
        // touching the right.
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let l = self.stage(left, env)?;
            if let SValue::Now(tv) = &l {
                let decides = match op {
                    BinaryOp::And => !tv.value.is_truthy(),
                    _ => tv.value.is_truthy(),
                };
                return if decides { Ok(l) } else { self.stage(right, env) };
            }
            let r = self.stage(right, env)?;
            let l_js = self.residualize(&l, left.span)?;
            let r_js = self.residualize(&r, right.span)?;
            self.bump_residual(span)?;
            return Ok(SValue::later(
                Origin::Residual(JsExpr::Binop {
                    op: op.as_str().to_string(),
                    left: Box::new(l_js),
                    right: Box::new(r_js),
                }),
                Type::union(vec![l.ty(), r.ty()]),
            ));
        }

        let l = self.stage(left, env)?;
        let r = self.stage(right, env)?;
        if let (SValue::Now(lv), SValue::Now(rv)) = (&l, &r) {
            return Ok(SValue::Now(self.eval.binary_op(op, lv, rv, span)?));
        }
        let l_js = self.residualize(&l, left.span)?;
        let r_js = self.residualize(&r, right.span)?;
        self.bump_residual(span)?;
        let ty = match op {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Lte
            | BinaryOp::Gt
            | BinaryOp::Gte => Type::BOOLEAN,
            BinaryOp::Add => {
                if is_subtype(&l.ty(), &Type::NUMBER) && is_subtype(&r.ty(), &Type::NUMBER) {
                    Type::NUMBER
                } else if is_subtype(&l.ty(), &Type::STRING) || is_subtype(&r.ty(), &Type::STRING)
                {
                    Type::STRING
                } else {
                    Type::UNKNOWN
                }
            }
            _ => Type::NUMBER,
        };
        Ok(SValue::later(
            Origin::Residual(JsExpr::Binop {
                op: op.as_str().to_string(),
                left: Box::new(l_js),
                right: Box::new(r_js),
            }),
            ty,
        ))
    }

    /// Refinements conjoin along the then edge and negate along the else
    /// edge; both branches residualize into a ternary.
    fn stage_conditional(
        &mut self,
        cond: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        let cond_sv = self.stage(cond, env)?;
        if let SValue::Now(tv) = &cond_sv {
            // Exactly one branch is staged; the other is never touched.
            return if tv.value.is_truthy() {
                self.stage(then_branch, env)
            } else {
                self.stage(else_branch, env)
            };
        }

        let refinement = extract_refinement(cond);
        let then_env = self.refine_env(env, &refinement);
        let else_env = self.refine_env(env, &negate_refinement(&refinement));

        let then_sv = self.stage(then_branch, &then_env)?;
        let else_sv = self.stage(else_branch, &else_env)?;

        let cond_js = self.residualize(&cond_sv, cond.span)?;
        let then_js = self.residualize(&then_sv, then_branch.span)?;
        let else_js = self.residualize(&else_sv, else_branch.span)?;
        self.bump_residual(span)?;
        Ok(SValue::later(
            Origin::Residual(JsExpr::Ternary {
                cond: Box::new(cond_js),
                then_branch: Box::new(then_js),
                else_branch: Box::new(else_js),
            }),
            Type::union(vec![then_sv.ty(), else_sv.ty()]),
        ))
    }

    /// Apply a refinement to the `Later` bindings it names.
    fn refine_env(&self, env: &SEnv, refinement: &dtz_solver::Refinement) -> SEnv {
        if refinement.is_empty() {
            return env.clone();
        }
        let refined = env.child();
        for (name, fact) in refinement.iter() {
            if let Some(Resolution::Staged(SValue::Later {
                origin,
                ty,
                constraint,
            })) = env.resolve(name)
            {
                let narrowed_constraint = narrow(&constraint, fact);
                let narrowed_ty = narrow_type(&ty, &narrowed_constraint);
                trace!(%name, constraint = %narrowed_constraint, "refined");
                refined.define(
                    name.clone(),
                    SValue::Later {
                        origin,
                        ty: narrowed_ty,
                        constraint: narrowed_constraint,
                    },
                );
            }
        }
        refined
    }

    fn stage_property(
        &mut self,
        object: &Expr,
        name: &str,
        name_span: Span,
        env: &SEnv,
    ) -> EvalResult<SValue> {
        let obj = self.stage(object, env)?;
        match obj {
            SValue::Now(tv) => Ok(SValue::Now(self.eval.property_of(
                &tv,
                name,
                name_span,
                object.span,
            )?)),
            SValue::LaterArray(entries) => match name {
                "length" => {
                    let value = Value::Int(entries.len() as i64);
                    let ty = dtz_eval::value::literal_type(&value);
                    Ok(SValue::Now(TypedValue::new(value, ty)))
                }
                _ => {
                    let js = self.residualize(&SValue::LaterArray(entries), object.span)?;
                    self.bump_residual(name_span)?;
                    Ok(SValue::later(
                        Origin::Residual(JsExpr::Member {
                            object: Box::new(js),
                            name: name.to_string(),
                        }),
                        Type::UNKNOWN,
                    ))
                }
            },
            SValue::StagedClosure(_) => Err(EvalError::new(
                EvalErrorKind::NoSuchField(name.to_string()),
                name_span,
            )),
            SValue::Later {
                origin,
                ty,
                constraint,
            } => {
                let narrowed = narrow_type(&ty, &constraint);
                let field_ty = match narrowed.unwrap_metadata() {
                    Type::Record { fields, closed, .. } => match fields.get(name) {
                        Some(field) => field.ty.clone(),
                        None if *closed => {
                            return Err(EvalError::new(
                                EvalErrorKind::NoSuchField(name.to_string()),
                                name_span,
                            ));
                        }
                        None => Type::UNKNOWN,
                    },
                    Type::Primitive(Prim::Never) => {
                        return Err(EvalError::new(
                            EvalErrorKind::NoSuchField(name.to_string()),
                            name_span,
                        ));
                    }
                    _ => Type::UNKNOWN,
                };
                // A field fact recorded in the refined constraint is more
                // precise than the declared field type.
                let field_constraint = field_fact(&constraint, name)
                    .unwrap_or_else(|| type_to_constraint(&field_ty));
                self.bump_residual(name_span)?;
                Ok(SValue::Later {
                    origin: Origin::Residual(JsExpr::Member {
                        object: Box::new(origin.to_js()),
                        name: name.to_string(),
                    }),
                    ty: field_ty,
                    constraint: field_constraint,
                })
            }
        }
    }

    fn stage_index(
        &mut self,
        object: &Expr,
        index: &Expr,
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        let obj = self.stage(object, env)?;
        let idx = self.stage(index, env)?;
        match (&obj, &idx) {
            (SValue::Now(o), SValue::Now(i)) => {
                Ok(SValue::Now(self.eval.index_of(o, i, span)?))
            }
            (SValue::LaterArray(entries), SValue::Now(i)) => match &i.value {
                Value::Int(n) => {
                    let i = usize::try_from(*n).map_err(|_| {
                        EvalError::new(
                            EvalErrorKind::BadIndex(format!("negative index {n}")),
                            span,
                        )
                    })?;
                    entries.get(i).cloned().ok_or_else(|| {
                        EvalError::new(
                            EvalErrorKind::BadIndex(format!(
                                "index {i} out of bounds for array of length {}",
                                entries.len()
                            )),
                            span,
                        )
                    })
                }
                other => Err(EvalError::new(
                    EvalErrorKind::BadIndex(format!(
                        "cannot index array with {}",
                        other.kind_name()
                    )),
                    span,
                )),
            },
            _ => {
                let obj_js = self.residualize(&obj, object.span)?;
                let idx_js = self.residualize(&idx, index.span)?;
                self.bump_residual(span)?;
                let ty = interp::element_type(&obj.ty()).unwrap_or(Type::UNKNOWN);
                Ok(SValue::later(
                    Origin::Residual(JsExpr::Index {
                        object: Box::new(obj_js),
                        index: Box::new(idx_js),
                    }),
                    ty,
                ))
            }
        }
    }

    fn stage_record(
        &mut self,
        items: &[RecordItem],
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        let mut fields: Vec<(String, SValue, Span)> = Vec::new();
        for item in items {
            match item {
                RecordItem::Field { name, value, span } => {
                    let sv = self.stage(value, env)?;
                    fields.retain(|(n, _, _)| n != name);
                    fields.push((name.clone(), sv, *span));
                }
                RecordItem::Spread(source) => {
                    let sv = self.stage(source, env)?;
                    let SValue::Now(tv) = sv else {
                        return Err(EvalError::new(
                            EvalErrorKind::StagingError(
                                "cannot spread a runtime value into a record".to_string(),
                            ),
                            source.span,
                        ));
                    };
                    let Value::Record(spread_fields) = &tv.value else {
                        return Err(EvalError::new(EvalErrorKind::SpreadNonRecord, source.span));
                    };
                    let names: Vec<String> = spread_fields.keys().cloned().collect();
                    for name in names {
                        let field_tv =
                            self.eval.property_of(&tv, &name, source.span, source.span)?;
                        fields.retain(|(n, _, _)| *n != name);
                        fields.push((name, SValue::Now(field_tv), source.span));
                    }
                }
            }
        }
        if fields.iter().all(|(_, sv, _)| sv.is_now()) {
            // Assemble the Now record directly.
            let mut values = indexmap::IndexMap::new();
            let mut types = indexmap::IndexMap::new();
            for (name, sv, _) in fields {
                let SValue::Now(tv) = sv else { unreachable!() };
                values.insert(name.clone(), tv.value);
                types.insert(name, dtz_solver::Field::required(tv.ty));
            }
            return Ok(SValue::Now(TypedValue::new(
                Value::Record(values),
                Type::Record {
                    fields: types,
                    index_type: None,
                    closed: false,
                },
            )));
        }
        let mut js_fields = Vec::with_capacity(fields.len());
        let mut types = indexmap::IndexMap::new();
        for (name, sv, field_span) in &fields {
            let js = self.residualize(sv, *field_span)?;
            js_fields.push((name.clone(), js));
            types.insert(name.clone(), dtz_solver::Field::required(sv.ty()));
        }
        self.bump_residual(span)?;
        Ok(SValue::later(
            Origin::Residual(JsExpr::Object(js_fields)),
            Type::Record {
                fields: types,
                index_type: None,
                closed: false,
            },
        ))
    }

    fn stage_array(&mut self, items: &[ArrayItem], env: &SEnv, span: Span) -> EvalResult<SValue> {
        let mut entries: Vec<SValue> = Vec::new();
        for item in items {
            match item {
                ArrayItem::Element(e) => entries.push(self.stage(e, env)?),
                ArrayItem::Spread(source) => {
                    let sv = self.stage(source, env)?;
                    match sv {
                        SValue::Now(tv) => {
                            let Value::Array(values) = &tv.value else {
                                return Err(EvalError::new(
                                    EvalErrorKind::BadSpread,
                                    source.span,
                                ));
                            };
                            let elem_ty = interp::element_type(&tv.ty);
                            for value in values {
                                let ty = elem_ty.clone().unwrap_or_else(|| {
                                    dtz_eval::value::type_of_value(value)
                                });
                                entries
                                    .push(SValue::Now(TypedValue::new(value.clone(), ty)));
                            }
                        }
                        SValue::LaterArray(inner) => entries.extend(inner),
                        _ => {
                            return Err(EvalError::new(
                                EvalErrorKind::StagingError(
                                    "cannot spread a runtime value into an array".to_string(),
                                ),
                                source.span,
                            ));
                        }
                    }
                }
            }
        }
        if entries.iter().all(SValue::is_now) {
            let mut values = Vec::with_capacity(entries.len());
            let mut types = Vec::with_capacity(entries.len());
            for sv in entries {
                let SValue::Now(tv) = sv else { unreachable!() };
                values.push(tv.value);
                types.push(tv.ty);
            }
            return Ok(SValue::Now(TypedValue::new(
                Value::Array(values),
                Type::Array {
                    elements: types,
                    variadic: false,
                },
            )));
        }
        self.bump_residual(span)?;
        Ok(SValue::LaterArray(entries))
    }

    /// `match` selection happens at compile time; a runtime scrutinee
    /// cannot choose an arm.
    fn stage_match(
        &mut self,
        scrutinee: &Expr,
        cases: &[dtz_ast::MatchCase],
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        let scrutinee_sv = self.stage(scrutinee, env)?;
        let SValue::Now(scrutinee_tv) = scrutinee_sv else {
            return Err(EvalError::new(
                EvalErrorKind::StagingError(
                    "match scrutinee must be computable at compile time".to_string(),
                ),
                scrutinee.span,
            ));
        };
        for case in cases {
            let Some(bindings) = interp::bind_pattern(&case.pattern, &scrutinee_tv) else {
                continue;
            };
            let case_env = env.child();
            for (name, tv) in bindings {
                case_env.define(name, SValue::Now(tv));
            }
            if let Some(guard) = &case.guard {
                let guard_sv = self.stage(guard, &case_env)?;
                let SValue::Now(guard_tv) = guard_sv else {
                    return Err(EvalError::new(
                        EvalErrorKind::StagingError(
                            "match guard must be computable at compile time".to_string(),
                        ),
                        guard.span,
                    ));
                };
                if !guard_tv.value.is_truthy() {
                    continue;
                }
            }
            return self.stage(&case.body, &case_env);
        }
        Err(EvalError::new(EvalErrorKind::NoMatch, span))
    }

    fn stage_template(
        &mut self,
        parts: &[TemplatePart],
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        let mut staged: Vec<(Option<String>, SValue)> = Vec::new();
        let mut all_now = true;
        for part in parts {
            match part {
                TemplatePart::Text(text) => staged.push((Some(text.clone()), SValue::Now(
                    TypedValue::new(Value::Str(text.clone()), Type::STRING),
                ))),
                TemplatePart::Interp(e) => {
                    let sv = self.stage(e, env)?;
                    all_now &= sv.is_now();
                    staged.push((None, sv));
                }
            }
        }
        if all_now {
            let mut out = String::new();
            for (text, sv) in staged {
                match text {
                    Some(text) => out.push_str(&text),
                    None => {
                        let SValue::Now(tv) = sv else { unreachable!() };
                        out.push_str(&tv.value.to_display_string());
                    }
                }
            }
            let value = Value::Str(out);
            let ty = dtz_eval::value::literal_type(&value);
            return Ok(SValue::Now(TypedValue::new(value, ty)));
        }
        // Residualize as string concatenation, seeded with "" so the
        // first `+` coerces.
        let mut acc = JsExpr::Lit(JsLit::Str(String::new()));
        for (text, sv) in staged {
            let piece = match text {
                Some(text) => JsExpr::Lit(JsLit::Str(text)),
                None => self.residualize(&sv, span)?,
            };
            acc = JsExpr::Binop {
                op: "+".to_string(),
                left: Box::new(acc),
                right: Box::new(piece),
            };
        }
        self.bump_residual(span)?;
        Ok(SValue::later(Origin::Residual(acc), Type::STRING))
    }

    fn stage_block(
        &mut self,
        decls: &[Decl],
        result: Option<&Expr>,
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        let block_env = env.child();
        let mut stmts: Vec<JsStmt> = Vec::new();
        for decl in decls {
            match &decl.kind {
                DeclKind::Const { name, ty, init, .. } => {
                    let sv = self.stage(init, &block_env)?;
                    if let Some(ty_expr) = ty {
                        self.check_annotation(&sv, ty_expr, &block_env, init.span)?;
                    }
                    match sv {
                        SValue::Now(tv) => block_env.define(name, SValue::Now(tv)),
                        // Symbolic values stay symbolic: closures re-stage
                        // per call, arrays keep compile-time structure.
                        sv @ (SValue::StagedClosure(_) | SValue::LaterArray(_)) => {
                            block_env.define(name, sv);
                        }
                        later => {
                            let js = self.residualize(&later, init.span)?;
                            let fresh = format!("_t{}", self.eval.fresh_var());
                            stmts.push(JsStmt::Const {
                                name: fresh.clone(),
                                init: js,
                            });
                            block_env.define(
                                name,
                                SValue::later(
                                    Origin::Residual(JsExpr::Var(fresh)),
                                    later.ty(),
                                ),
                            );
                        }
                    }
                }
                DeclKind::Expr(e) => {
                    let sv = self.stage(e, &block_env)?;
                    if !sv.is_now() {
                        let js = self.residualize(&sv, e.span)?;
                        stmts.push(JsStmt::Expr(js));
                    }
                }
                DeclKind::Import { .. } => {}
            }
        }
        let result_sv = match result {
            Some(result) => self.stage(result, &block_env)?,
            None => SValue::Now(TypedValue::undefined()),
        };
        if stmts.is_empty() {
            return Ok(result_sv);
        }
        let result_js = self.residualize(&result_sv, span)?;
        stmts.push(JsStmt::Return(Some(result_js)));
        self.bump_residual(span)?;
        Ok(SValue::later(
            Origin::Residual(JsExpr::Iife(stmts)),
            result_sv.ty(),
        ))
    }

    /// Check a staged value against an annotation expression (evaluated
    /// to a type-value in the comptime base).
    fn check_annotation(
        &mut self,
        sv: &SValue,
        ty_expr: &Expr,
        env: &SEnv,
        span: Span,
    ) -> EvalResult<()> {
        let value_env = self.materialize(ty_expr, env)?;
        let ty_tv = self.eval.evaluate(ty_expr, &value_env)?;
        let Some(annotated) = ty_tv.value.as_type() else {
            return Err(EvalError::new(
                EvalErrorKind::TypeMismatch {
                    expected: "type".to_string(),
                    found: ty_tv.value.kind_name().to_string(),
                },
                ty_expr.span,
            ));
        };
        let actual = sv.ty();
        // Unknown staged types pass; the check is best-effort for Later.
        if !matches!(actual.unwrap_metadata(), Type::Primitive(Prim::Unknown))
            && !is_subtype(&actual, annotated)
        {
            return Err(EvalError::new(
                EvalErrorKind::TypeMismatch {
                    expected: annotated.to_string(),
                    found: actual.to_string(),
                },
                span,
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn stage_call(
        &mut self,
        callee: &Expr,
        args: &[Arg],
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        // Staging intrinsics come before ordinary resolution.
        if let ExprKind::Ident(name) = &callee.kind {
            if name == "comptime" {
                return self.stage_comptime_intrinsic(args, env, span);
            }
            if name == "runtime" {
                return self.stage_runtime_intrinsic(args, env, span);
            }
        }

        let callee_sv = self.stage(callee, env)?;
        let mut staged_args: Vec<(SValue, Span)> = Vec::new();
        for arg in args {
            let sv = self.stage(&arg.expr, env)?;
            if arg.spread {
                match sv {
                    SValue::Now(tv) => {
                        let Value::Array(values) = &tv.value else {
                            return Err(EvalError::new(EvalErrorKind::BadSpread, arg.expr.span));
                        };
                        let elem_ty = interp::element_type(&tv.ty);
                        for value in values {
                            let ty = elem_ty
                                .clone()
                                .unwrap_or_else(|| dtz_eval::value::type_of_value(value));
                            staged_args.push((
                                SValue::Now(TypedValue::new(value.clone(), ty)),
                                arg.expr.span,
                            ));
                        }
                    }
                    SValue::LaterArray(entries) => {
                        for entry in entries {
                            staged_args.push((entry, arg.expr.span));
                        }
                    }
                    _ => {
                        return Err(EvalError::new(EvalErrorKind::BadSpread, arg.expr.span));
                    }
                }
            } else {
                staged_args.push((sv, arg.expr.span));
            }
        }

        match callee_sv {
            SValue::Now(callee_tv) => match &callee_tv.value {
                Value::Closure(closure) => {
                    if staged_args.iter().all(|(sv, _)| sv.is_now()) {
                        let args = staged_args
                            .into_iter()
                            .map(|(sv, sp)| match sv {
                                SValue::Now(tv) => (tv, sp),
                                _ => unreachable!(),
                            })
                            .collect();
                        let tv = self.eval.apply_closure(&closure.clone(), args, span)?;
                        Ok(SValue::Now(tv))
                    } else {
                        // Specialize against the closure's own captured
                        // scope; the call site's staged bindings are not
                        // visible inside the body.
                        self.stage_closure_body(
                            &closure.params.clone(),
                            &closure.body.clone(),
                            closure.return_type.clone(),
                            SEnv::root(closure.env.clone()),
                            staged_args,
                            span,
                        )
                    }
                }
                Value::Builtin(BuiltinFn::Global(builtin))
                    if staged_args.iter().any(|(sv, _)| !sv.is_now()) =>
                {
                    self.stage_builtin_call(*builtin, staged_args, span)
                }
                _ => {
                    // Builtins, methods, and the Type constructor need
                    // fully-Now arguments; delegate to the evaluator.
                    let mut now_args = Vec::with_capacity(staged_args.len());
                    for (sv, sp) in staged_args {
                        match sv {
                            SValue::Now(tv) => now_args.push((tv, sp)),
                            _ => {
                                return Err(EvalError::new(
                                    EvalErrorKind::StagingError(
                                        "argument is not computable at compile time"
                                            .to_string(),
                                    ),
                                    sp,
                                ));
                            }
                        }
                    }
                    Ok(SValue::Now(self.eval.call_value(&callee_tv, now_args, span)?))
                }
            },
            SValue::StagedClosure(sc) => {
                let lambda = sc.lambda.clone();
                let params: Vec<dtz_eval::ClosureParam> = lambda
                    .params
                    .iter()
                    .map(dtz_eval::ClosureParam::from_ast)
                    .collect();
                // Re-stage the body with these arguments.
                let return_type = None;
                self.stage_closure_body(
                    &params,
                    &lambda.body,
                    return_type,
                    sc.env.child(),
                    staged_args,
                    span,
                )
            }
            SValue::Later { origin, ty, .. } => {
                let mut js_args = Vec::with_capacity(staged_args.len());
                for (sv, sp) in &staged_args {
                    js_args.push(self.residualize(sv, *sp)?);
                }
                self.bump_residual(span)?;
                let result_ty = match ty.unwrap_metadata() {
                    Type::Function { return_type, .. } => (**return_type).clone(),
                    _ => Type::UNKNOWN,
                };
                Ok(SValue::later(
                    Origin::Residual(JsExpr::Call {
                        callee: Box::new(origin.to_js()),
                        args: js_args,
                    }),
                    result_ty,
                ))
            }
            SValue::LaterArray(_) => Err(EvalError::new(
                EvalErrorKind::TypeMismatch {
                    expected: "function".to_string(),
                    found: "array".to_string(),
                },
                span,
            )),
        }
    }

    /// Specialize a closure body against a mix of Now and Later
    /// arguments. This is the point "macro-like" behavior relies on.
    fn stage_closure_body(
        &mut self,
        params: &[dtz_eval::ClosureParam],
        body: &Expr,
        return_type: Option<Type>,
        call_env: SEnv,
        staged_args: Vec<(SValue, Span)>,
        call_span: Span,
    ) -> EvalResult<SValue> {
        trace!(params = params.len(), args = staged_args.len(), "specializing closure");
        let mut args = staged_args.into_iter();
        for param in params {
            let (arg, arg_span) = match args.next() {
                Some((sv, sp)) => (sv, sp),
                None => match &param.default {
                    Some(default) => {
                        let sv = self.stage(default, &call_env)?;
                        (sv, default.span)
                    }
                    None => {
                        return Err(EvalError::new(
                            EvalErrorKind::MissingArg(param.name.clone()),
                            call_span,
                        ));
                    }
                },
            };

            // Resolve the annotation where possible; dependent annotations
            // over Later parameters stay unchecked (best-effort).
            let annotation = match (&param.ty, &param.ty_expr) {
                (Some(ty), _) => Some(ty.clone()),
                (None, Some(ty_expr)) => {
                    if self.all_free_now(ty_expr, &call_env) {
                        let value_env = self.materialize(ty_expr, &call_env)?;
                        let tv = self.eval.evaluate(ty_expr, &value_env)?;
                        tv.value.as_type().cloned()
                    } else {
                        None
                    }
                }
                (None, None) => None,
            };

            if let Some(annotation) = &annotation {
                match annotation {
                    Type::Bounded(bound) => match &arg {
                        SValue::Now(tv) => match tv.value.as_type() {
                            Some(arg_type) => {
                                if !is_subtype(arg_type, bound) {
                                    return Err(EvalError::new(
                                        EvalErrorKind::ConstraintViolation {
                                            arg: arg_type.to_string(),
                                            bound: bound.to_string(),
                                        },
                                        arg_span,
                                    ));
                                }
                            }
                            None => {
                                return Err(EvalError::new(
                                    EvalErrorKind::TypeMismatch {
                                        expected: "type".to_string(),
                                        found: tv.value.kind_name().to_string(),
                                    },
                                    arg_span,
                                ));
                            }
                        },
                        _ => {
                            return Err(EvalError::new(
                                EvalErrorKind::StagingError(
                                    "type argument must be computable at compile time"
                                        .to_string(),
                                ),
                                arg_span,
                            ));
                        }
                    },
                    annotation => {
                        let actual = arg.ty();
                        if !matches!(
                            actual.unwrap_metadata(),
                            Type::Primitive(Prim::Unknown)
                        ) && !is_subtype(&actual, annotation)
                        {
                            return Err(EvalError::new(
                                EvalErrorKind::TypeMismatch {
                                    expected: annotation.to_string(),
                                    found: actual.to_string(),
                                },
                                arg_span,
                            ));
                        }
                    }
                }
            }
            call_env.define(&param.name, arg);
        }

        let result = self.stage(body, &call_env)?;
        if let Some(return_type) = &return_type
            && let SValue::Now(tv) = &result
            && !is_subtype(&tv.ty, return_type)
        {
            return Err(EvalError::new(
                EvalErrorKind::TypeMismatch {
                    expected: return_type.to_string(),
                    found: tv.ty.to_string(),
                },
                body.span,
            ));
        }
        Ok(result)
    }

    /// `comptime(e)` forces Now.
    fn stage_comptime_intrinsic(
        &mut self,
        args: &[Arg],
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        let [arg] = args else {
            return Err(EvalError::new(
                EvalErrorKind::MissingArg("expr".to_string()),
                span,
            ));
        };
        match self.stage(&arg.expr, env)? {
            SValue::Now(tv) => Ok(SValue::Now(tv)),
            _ => Err(EvalError::new(
                EvalErrorKind::StagingError("not computable at compile time".to_string()),
                span,
            )),
        }
    }

    /// `runtime(e[, name])` forces Later: the residual binds a fresh
    /// variable whose type is the statically known constraint of `e`.
    fn stage_runtime_intrinsic(
        &mut self,
        args: &[Arg],
        env: &SEnv,
        span: Span,
    ) -> EvalResult<SValue> {
        let Some(first) = args.first() else {
            return Err(EvalError::new(
                EvalErrorKind::MissingArg("expr".to_string()),
                span,
            ));
        };
        let name = match args.get(1).map(|a| &a.expr.kind) {
            Some(ExprKind::Literal(dtz_ast::Lit::Str(s))) => s.clone(),
            _ => format!("_rt{}", self.eval.fresh_var()),
        };
        let sv = self.stage(&first.expr, env)?;
        let (ty, constraint) = match &sv {
            SValue::Now(tv) => (tv.ty.clone(), dtz_eval::constraint_of(&tv.value)),
            SValue::Later {
                ty, constraint, ..
            } => (ty.clone(), constraint.clone()),
            other => (other.ty(), Constraint::Any),
        };
        let js = self.residualize(&sv, first.expr.span)?;
        self.stmts.push(JsStmt::Const {
            name: name.clone(),
            init: js,
        });
        self.bump_residual(span)?;
        Ok(SValue::Later {
            origin: Origin::RuntimeInput { name: name.clone() },
            ty,
            constraint,
        })
    }

    /// Classification guards survive into residual code as `typeof`
    /// checks.
    fn stage_builtin_call(
        &mut self,
        builtin: Builtin,
        staged_args: Vec<(SValue, Span)>,
        span: Span,
    ) -> EvalResult<SValue> {
        let Some((arg, arg_span)) = staged_args.into_iter().next() else {
            return Err(EvalError::new(
                EvalErrorKind::MissingArg("value".to_string()),
                span,
            ));
        };
        let js = self.residualize(&arg, arg_span)?;
        let test = match builtin {
            Builtin::IsNumber => typeof_check(js, "number"),
            Builtin::IsString => typeof_check(js, "string"),
            Builtin::IsBool => typeof_check(js, "boolean"),
            Builtin::IsFunction => typeof_check(js, "function"),
            Builtin::IsNull => JsExpr::Binop {
                op: "===".to_string(),
                left: Box::new(js),
                right: Box::new(JsExpr::Lit(JsLit::Null)),
            },
            Builtin::IsArray => JsExpr::Call {
                callee: Box::new(JsExpr::Member {
                    object: Box::new(JsExpr::Var("Array".to_string())),
                    name: "isArray".to_string(),
                }),
                args: vec![js],
            },
            Builtin::IsObject => {
                let not_null = JsExpr::Binop {
                    op: "!==".to_string(),
                    left: Box::new(js.clone()),
                    right: Box::new(JsExpr::Lit(JsLit::Null)),
                };
                let not_array = JsExpr::Unary {
                    op: "!".to_string(),
                    operand: Box::new(JsExpr::Call {
                        callee: Box::new(JsExpr::Member {
                            object: Box::new(JsExpr::Var("Array".to_string())),
                            name: "isArray".to_string(),
                        }),
                        args: vec![js.clone()],
                    }),
                };
                JsExpr::Binop {
                    op: "&&".to_string(),
                    left: Box::new(JsExpr::Binop {
                        op: "&&".to_string(),
                        left: Box::new(typeof_check(js, "object")),
                        right: Box::new(not_null),
                    }),
                    right: Box::new(not_array),
                }
            }
            _ => {
                return Err(EvalError::new(
                    EvalErrorKind::StagingError(format!(
                        "`{}` needs compile-time arguments",
                        builtin.name()
                    )),
                    span,
                ));
            }
        };
        self.bump_residual(span)?;
        Ok(SValue::later(Origin::Residual(test), Type::BOOLEAN))
    }

    // =========================================================================
    // Residualization
    // =========================================================================

    /// Turn a staged value into residual JS. `Now` values become
    /// literals (closures become arrows); comptime-only values (types,
    /// builtins) cannot cross into runtime.
    pub fn residualize(&mut self, sv: &SValue, span: Span) -> EvalResult<JsExpr> {
        match sv {
            SValue::Now(tv) => self.value_to_js(&tv.value, span),
            SValue::Later { origin, .. } => Ok(origin.to_js()),
            SValue::LaterArray(entries) => {
                let mut items = Vec::with_capacity(entries.len());
                for entry in entries {
                    items.push(self.residualize(entry, span)?);
                }
                Ok(JsExpr::Array(items))
            }
            SValue::StagedClosure(sc) => self.residualize_staged_closure(sc, span),
        }
    }

    fn value_to_js(&mut self, value: &Value, span: Span) -> EvalResult<JsExpr> {
        match value {
            Value::Int(n) => Ok(JsExpr::Lit(JsLit::Int(*n))),
            Value::Float(n) => Ok(JsExpr::Lit(JsLit::Float(*n))),
            Value::Str(s) => Ok(JsExpr::Lit(JsLit::Str(s.clone()))),
            Value::Bool(b) => Ok(JsExpr::Lit(JsLit::Bool(*b))),
            Value::Null => Ok(JsExpr::Lit(JsLit::Null)),
            Value::Undefined => Ok(JsExpr::Lit(JsLit::Undefined)),
            Value::Record(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    out.push((name.clone(), self.value_to_js(value, span)?));
                }
                Ok(JsExpr::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.value_to_js(item, span)?);
                }
                Ok(JsExpr::Array(out))
            }
            Value::Closure(closure) => self.residualize_closure(closure, span),
            Value::Type(_) | Value::Builtin(_) => Err(EvalError::new(
                EvalErrorKind::StagingError(
                    "compile-time-only value cannot appear in residual code".to_string(),
                ),
                span,
            )),
        }
    }

    /// Residualize the value of a named declaration. The name itself is
    /// visible inside function bodies as a `Later` reference, so
    /// recursive functions emit recursive calls instead of unfolding.
    pub fn residualize_decl(
        &mut self,
        sv: &SValue,
        name: &str,
        span: Span,
    ) -> EvalResult<JsExpr> {
        match sv {
            SValue::Now(tv) => match &tv.value {
                Value::Closure(closure) => {
                    self.residualize_closure_named(closure, Some(name), span)
                }
                _ => self.residualize(sv, span),
            },
            SValue::StagedClosure(sc) => self.residualize_staged_closure_named(sc, Some(name), span),
            _ => self.residualize(sv, span),
        }
    }

    fn self_reference(ty: Type, name: &str) -> SValue {
        SValue::later(Origin::Residual(JsExpr::Var(name.to_string())), ty)
    }

    /// Residualize a `Now` closure: parameters become runtime inputs and
    /// the body is staged against them.
    pub fn residualize_closure(
        &mut self,
        closure: &Rc<Closure>,
        span: Span,
    ) -> EvalResult<JsExpr> {
        self.residualize_closure_named(closure, None, span)
    }

    fn residualize_closure_named(
        &mut self,
        closure: &Rc<Closure>,
        self_name: Option<&str>,
        span: Span,
    ) -> EvalResult<JsExpr> {
        let body_env = SEnv::root(closure.env.clone());
        if let Some(name) = self_name {
            body_env.define(
                name,
                Self::self_reference(dtz_eval::value::closure_type(closure), name),
            );
        }
        let mut param_names = Vec::with_capacity(closure.params.len());
        for param in &closure.params {
            let ty = param.ty.clone().unwrap_or(Type::UNKNOWN);
            body_env.define(
                &param.name,
                SValue::Later {
                    origin: Origin::RuntimeInput {
                        name: param.name.clone(),
                    },
                    constraint: type_to_constraint(&ty),
                    ty,
                },
            );
            param_names.push(param.name.clone());
        }
        let body_sv = self.stage(&closure.body, &body_env)?;
        let body_js = self.residualize(&body_sv, span)?;
        self.bump_residual(span)?;
        Ok(JsExpr::Arrow {
            params: param_names,
            body: JsBody::Expr(Box::new(body_js)),
            is_async: closure.is_async,
        })
    }

    fn residualize_staged_closure(
        &mut self,
        sc: &Rc<StagedClosure>,
        span: Span,
    ) -> EvalResult<JsExpr> {
        self.residualize_staged_closure_named(sc, None, span)
    }

    fn residualize_staged_closure_named(
        &mut self,
        sc: &Rc<StagedClosure>,
        self_name: Option<&str>,
        span: Span,
    ) -> EvalResult<JsExpr> {
        let body_env = sc.env.child();
        if let Some(name) = self_name {
            body_env.define(
                name,
                Self::self_reference(
                    Type::Function {
                        params: vec![],
                        return_type: Box::new(Type::UNKNOWN),
                        is_async: false,
                    },
                    name,
                ),
            );
        }
        let mut param_names = Vec::with_capacity(sc.lambda.params.len());
        for param in &sc.lambda.params {
            let ty = match &param.ty {
                Some(ty_expr) if self.all_free_now(ty_expr, &body_env) => {
                    let value_env = self.materialize(ty_expr, &body_env)?;
                    let tv = self.eval.evaluate(ty_expr, &value_env)?;
                    tv.value.as_type().cloned().unwrap_or(Type::UNKNOWN)
                }
                _ => Type::UNKNOWN,
            };
            body_env.define(
                &param.name,
                SValue::Later {
                    origin: Origin::RuntimeInput {
                        name: param.name.clone(),
                    },
                    constraint: type_to_constraint(&ty),
                    ty,
                },
            );
            param_names.push(param.name.clone());
        }
        let body_sv = self.stage(&sc.lambda.body, &body_env)?;
        let body_js = self.residualize(&body_sv, span)?;
        self.bump_residual(span)?;
        Ok(JsExpr::Arrow {
            params: param_names,
            body: JsBody::Expr(Box::new(body_js)),
            is_async: sc.lambda.is_async,
        })
    }
}

/// A `Later` field fact extracted from a refined constraint.
fn field_fact(constraint: &Constraint, name: &str) -> Option<Constraint> {
    match constraint {
        Constraint::HasField(field, inner) if field == name => Some((**inner).clone()),
        Constraint::And(members) => members.iter().find_map(|m| field_fact(m, name)),
        _ => None,
    }
}

fn typeof_check(operand: JsExpr, kind: &str) -> JsExpr {
    JsExpr::Binop {
        op: "===".to_string(),
        left: Box::new(JsExpr::Unary {
            op: "typeof ".to_string(),
            operand: Box::new(operand),
        }),
        right: Box::new(JsExpr::Lit(JsLit::Str(kind.to_string()))),
    }
}
