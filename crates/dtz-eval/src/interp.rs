//! The fuel-bounded compile-time interpreter.
//!
//! `evaluate` decrements one unit of fuel per entry and fails with
//! `FuelExhausted` when the budget runs out, so self-referential comptime
//! code terminates instead of hanging. Every id counter (residual
//! variables, inference variables, cluster ids) is owned by the
//! `Evaluator` instance.

use crate::builtins;
use crate::env::{Binding, Env};
use crate::error::{EvalError, EvalErrorKind, EvalResult};
use crate::methods;
use crate::type_props;
use crate::value::{
    BuiltinFn, Closure, ClosureParam, TypedValue, Value, closure_type, literal_type, raw_eq,
    type_of_value,
};
use dtz_ast::{
    Arg, ArrayItem, BinaryOp, Decl, DeclKind, Expr, ExprKind, Lit, MatchCase, Pattern,
    PatternKind, RecordItem, TemplatePart, UnaryOp,
};
use dtz_common::limits::DEFAULT_FUEL;
use dtz_common::span::Span;
use dtz_solver::{Field, Prim, Type, is_subtype};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::trace;

/// Evaluator configuration.
#[derive(Debug, Clone, Copy)]
pub struct EvalOptions {
    pub fuel: u64,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self { fuel: DEFAULT_FUEL }
    }
}

/// A compile-time evaluator instance. Create one per compilation.
#[derive(Debug)]
pub struct Evaluator {
    fuel: u64,
    initial_fuel: u64,
    next_var: u32,
    next_cvar: u32,
    next_cluster: u32,
}

impl Evaluator {
    pub fn new(options: EvalOptions) -> Self {
        Self {
            fuel: options.fuel,
            initial_fuel: options.fuel,
            next_var: 0,
            next_cvar: 0,
            next_cluster: 0,
        }
    }

    /// Restore the full fuel budget (diagnostic/testing hook).
    pub fn reset(&mut self) {
        self.fuel = self.initial_fuel;
    }

    pub fn remaining_fuel(&self) -> u64 {
        self.fuel
    }

    /// Fresh residual-variable id.
    pub fn fresh_var(&mut self) -> u32 {
        let id = self.next_var;
        self.next_var += 1;
        id
    }

    /// Fresh constraint inference variable id.
    pub fn fresh_cvar(&mut self) -> u32 {
        let id = self.next_cvar;
        self.next_cvar += 1;
        id
    }

    /// Fresh cluster id.
    pub fn fresh_cluster_id(&mut self) -> u32 {
        let id = self.next_cluster;
        self.next_cluster += 1;
        id
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    pub fn evaluate(&mut self, expr: &Expr, env: &Env) -> EvalResult<TypedValue> {
        if self.fuel == 0 {
            return Err(EvalError::new(EvalErrorKind::FuelExhausted, expr.span));
        }
        self.fuel -= 1;

        // Deep recursion (self-referential comptime code burning fuel)
        // must exhaust fuel, not the stack.
        stacker::maybe_grow(64 * 1024, 1024 * 1024, || self.evaluate_inner(expr, env))
    }

    fn evaluate_inner(&mut self, expr: &Expr, env: &Env) -> EvalResult<TypedValue> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(self.eval_literal(lit)),
            ExprKind::Ident(name) => self.get_value(name, env, expr.span),
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, env),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, env),
            ExprKind::Call { callee, args } => self.eval_call(callee, args, env, expr.span),
            ExprKind::Property {
                object,
                name,
                name_span,
            } => self.eval_property(object, name, *name_span, env),
            ExprKind::Index { object, index } => self.eval_index(object, index, env, expr.span),
            ExprKind::Lambda(lambda) => self.eval_lambda(lambda, env),
            ExprKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => {
                // Exactly one branch is ever evaluated.
                let cond = self.evaluate(cond, env)?;
                if cond.value.is_truthy() {
                    self.evaluate(then_branch, env)
                } else {
                    self.evaluate(else_branch, env)
                }
            }
            ExprKind::Record(items) => self.eval_record(items, env),
            ExprKind::Array(items) => self.eval_array(items, env),
            ExprKind::Match { scrutinee, cases } => {
                self.eval_match(scrutinee, cases, env, expr.span)
            }
            ExprKind::Throw(inner) => {
                let value = self.evaluate(inner, env)?;
                Err(EvalError::new(
                    EvalErrorKind::UserThrow(value.value.to_display_string()),
                    expr.span,
                ))
            }
            ExprKind::Await(_) => Err(EvalError::new(
                EvalErrorKind::StagingError(
                    "`await` is not available at compile time".to_string(),
                ),
                expr.span,
            )),
            ExprKind::Template(parts) => self.eval_template(parts, env),
            ExprKind::Block { decls, result } => self.eval_block(decls, result.as_deref(), env),
        }
    }

    fn eval_literal(&self, lit: &Lit) -> TypedValue {
        let value = match lit {
            Lit::Int(n) => Value::Int(*n),
            Lit::Float(n) => Value::Float(*n),
            Lit::Str(s) => Value::Str(s.clone()),
            Lit::Bool(b) => Value::Bool(*b),
            Lit::Null => Value::Null,
            Lit::Undefined => Value::Undefined,
        };
        let ty = literal_type(&value);
        TypedValue::new(value, ty)
    }

    /// Identifier lookup with lazy force-on-read and memoization.
    pub fn get_value(&mut self, name: &str, env: &Env, span: Span) -> EvalResult<TypedValue> {
        let Some((binding, owner)) = env.lookup(name) else {
            return Err(EvalError::new(
                EvalErrorKind::UndefinedIdentifier(name.to_string()),
                span,
            ));
        };
        match binding {
            Binding::Evaluated(tv) => Ok(tv),
            Binding::Forcing => Err(EvalError::new(
                EvalErrorKind::CyclicBinding(name.to_string()),
                span,
            )),
            Binding::Unevaluated {
                expr,
                env: defining_env,
                ty,
            } => {
                owner.replace(name, Binding::Forcing);
                let result = self.evaluate(&expr, &defining_env);
                match result {
                    Ok(tv) => {
                        if let Some(annotated) = &ty
                            && !is_subtype(&tv.ty, annotated)
                        {
                            // Leave the binding poisoned; the error is fatal
                            // for this declaration anyway.
                            return Err(EvalError::new(
                                EvalErrorKind::TypeMismatch {
                                    expected: annotated.to_string(),
                                    found: tv.ty.to_string(),
                                },
                                expr.span,
                            ));
                        }
                        owner.replace(name, Binding::Evaluated(tv.clone()));
                        Ok(tv)
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        env: &Env,
    ) -> EvalResult<TypedValue> {
        // Short-circuit: return whichever operand decides the result,
        // preserving its type.
        if op == BinaryOp::And {
            let l = self.evaluate(left, env)?;
            return if l.value.is_truthy() {
                self.evaluate(right, env)
            } else {
                Ok(l)
            };
        }
        if op == BinaryOp::Or {
            let l = self.evaluate(left, env)?;
            return if l.value.is_truthy() {
                Ok(l)
            } else {
                self.evaluate(right, env)
            };
        }

        let l = self.evaluate(left, env)?;
        let r = self.evaluate(right, env)?;
        let span = left.span.merge(right.span);
        self.binary_op(op, &l, &r, span)
    }

    /// Apply a non-short-circuit binary operator to evaluated operands.
    /// Also the staged evaluator's entry point for `Now op Now`.
    pub fn binary_op(
        &self,
        op: BinaryOp,
        l: &TypedValue,
        r: &TypedValue,
        span: Span,
    ) -> EvalResult<TypedValue> {
        let value = match op {
            BinaryOp::Eq => Value::Bool(raw_eq(&l.value, &r.value)),
            BinaryOp::Ne => Value::Bool(!raw_eq(&l.value, &r.value)),
            BinaryOp::Add => match (&l.value, &r.value) {
                (Value::Str(a), b) => Value::Str(format!("{a}{}", b.to_display_string())),
                (a, Value::Str(b)) => Value::Str(format!("{}{b}", a.to_display_string())),
                _ => self.arith(op, l, r, span)?,
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                self.arith(op, l, r, span)?
            }
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                self.compare(op, l, r, span)?
            }
            BinaryOp::And | BinaryOp::Or => {
                return Err(EvalError::new(
                    EvalErrorKind::TypeMismatch {
                        expected: "non-short-circuit operator".to_string(),
                        found: op.as_str().to_string(),
                    },
                    span,
                ));
            }
        };
        let ty = literal_type(&value);
        Ok(TypedValue::new(value, ty))
    }

    /// Arithmetic: `Int op Int` stays `Int`, anything mixed widens, and
    /// `/` always produces a float.
    fn arith(&self, op: BinaryOp, l: &TypedValue, r: &TypedValue, span: Span) -> EvalResult<Value> {
        if let (Value::Int(a), Value::Int(b)) = (&l.value, &r.value)
            && op != BinaryOp::Div
        {
            let v = match op {
                BinaryOp::Add => a.wrapping_add(*b),
                BinaryOp::Sub => a.wrapping_sub(*b),
                BinaryOp::Mul => a.wrapping_mul(*b),
                BinaryOp::Rem => {
                    if *b == 0 {
                        return Err(EvalError::new(
                            EvalErrorKind::TypeMismatch {
                                expected: "non-zero divisor".to_string(),
                                found: "0".to_string(),
                            },
                            span,
                        ));
                    }
                    a.wrapping_rem(*b)
                }
                _ => unreachable!(),
            };
            return Ok(Value::Int(v));
        }
        let (Some(a), Some(b)) = (l.value.as_number(), r.value.as_number()) else {
            return Err(EvalError::new(
                EvalErrorKind::TypeMismatch {
                    expected: "number".to_string(),
                    found: if l.value.as_number().is_none() {
                        l.value.kind_name().to_string()
                    } else {
                        r.value.kind_name().to_string()
                    },
                },
                span,
            ));
        };
        let v = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            _ => unreachable!(),
        };
        Ok(Value::Float(v))
    }

    fn compare(
        &self,
        op: BinaryOp,
        l: &TypedValue,
        r: &TypedValue,
        span: Span,
    ) -> EvalResult<Value> {
        let ordering = match (&l.value, &r.value) {
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            _ => match (l.value.as_number(), r.value.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => {
                    return Err(EvalError::new(
                        EvalErrorKind::TypeMismatch {
                            expected: "two numbers or two strings".to_string(),
                            found: format!("{} and {}", l.value.kind_name(), r.value.kind_name()),
                        },
                        span,
                    ));
                }
            },
        };
        let Some(ordering) = ordering else {
            return Ok(Value::Bool(false));
        };
        let result = match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::Lte => ordering.is_le(),
            BinaryOp::Gt => ordering.is_gt(),
            BinaryOp::Gte => ordering.is_ge(),
            _ => unreachable!(),
        };
        Ok(Value::Bool(result))
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, env: &Env) -> EvalResult<TypedValue> {
        let operand_tv = self.evaluate(operand, env)?;
        self.unary_op(op, &operand_tv, operand.span)
    }

    /// Apply a unary operator to an evaluated operand.
    pub fn unary_op(&self, op: UnaryOp, operand: &TypedValue, span: Span) -> EvalResult<TypedValue> {
        let value = match op {
            UnaryOp::Not => Value::Bool(!operand.value.is_truthy()),
            UnaryOp::Neg => match &operand.value {
                Value::Int(n) => Value::Int(n.wrapping_neg()),
                Value::Float(n) => Value::Float(-n),
                other => {
                    return Err(EvalError::new(
                        EvalErrorKind::TypeMismatch {
                            expected: "number".to_string(),
                            found: other.kind_name().to_string(),
                        },
                        span,
                    ));
                }
            },
        };
        let ty = literal_type(&value);
        Ok(TypedValue::new(value, ty))
    }

    // =========================================================================
    // Records, arrays, templates
    // =========================================================================

    fn eval_record(&mut self, items: &[RecordItem], env: &Env) -> EvalResult<TypedValue> {
        let mut values: IndexMap<String, Value> = IndexMap::new();
        let mut types: IndexMap<String, Field> = IndexMap::new();
        for item in items {
            match item {
                RecordItem::Field { name, value, .. } => {
                    let tv = self.evaluate(value, env)?;
                    values.insert(name.clone(), tv.value);
                    types.insert(name.clone(), Field::required(tv.ty));
                }
                RecordItem::Spread(source) => {
                    let tv = self.evaluate(source, env)?;
                    let Value::Record(fields) = tv.value else {
                        return Err(EvalError::new(EvalErrorKind::SpreadNonRecord, source.span));
                    };
                    let source_fields = match tv.ty.unwrap_metadata() {
                        Type::Record { fields, .. } => Some(fields.clone()),
                        _ => None,
                    };
                    for (name, value) in fields {
                        let field_ty = source_fields
                            .as_ref()
                            .and_then(|f| f.get(&name).map(|f| f.ty.clone()))
                            .unwrap_or_else(|| type_of_value(&value));
                        values.insert(name.clone(), value);
                        types.insert(name, Field::required(field_ty));
                    }
                }
            }
        }
        Ok(TypedValue::new(
            Value::Record(values),
            Type::Record {
                fields: types,
                index_type: None,
                closed: false,
            },
        ))
    }

    fn eval_array(&mut self, items: &[ArrayItem], env: &Env) -> EvalResult<TypedValue> {
        let mut values: Vec<Value> = Vec::new();
        let mut types: Vec<Type> = Vec::new();
        let mut saw_spread = false;
        for item in items {
            match item {
                ArrayItem::Element(e) => {
                    let tv = self.evaluate(e, env)?;
                    values.push(tv.value);
                    types.push(tv.ty);
                }
                ArrayItem::Spread(source) => {
                    saw_spread = true;
                    let tv = self.evaluate(source, env)?;
                    let Value::Array(items) = tv.value else {
                        return Err(EvalError::new(EvalErrorKind::BadSpread, source.span));
                    };
                    let elem_ty = element_type(&tv.ty);
                    for value in items {
                        let ty = elem_ty
                            .clone()
                            .unwrap_or_else(|| type_of_value(&value));
                        values.push(value);
                        types.push(ty);
                    }
                }
            }
        }
        let ty = if saw_spread {
            Type::Array {
                elements: vec![Type::union(types)],
                variadic: true,
            }
        } else {
            Type::Array {
                elements: types,
                variadic: false,
            }
        };
        Ok(TypedValue::new(Value::Array(values), ty))
    }

    fn eval_template(&mut self, parts: &[TemplatePart], env: &Env) -> EvalResult<TypedValue> {
        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => out.push_str(text),
                TemplatePart::Interp(e) => {
                    let tv = self.evaluate(e, env)?;
                    out.push_str(&tv.value.to_display_string());
                }
            }
        }
        let value = Value::Str(out);
        let ty = literal_type(&value);
        Ok(TypedValue::new(value, ty))
    }

    // =========================================================================
    // Property and index access
    // =========================================================================

    fn eval_property(
        &mut self,
        object: &Expr,
        name: &str,
        name_span: Span,
        env: &Env,
    ) -> EvalResult<TypedValue> {
        let obj = self.evaluate(object, env)?;
        self.property_of(&obj, name, name_span, object.span)
    }

    /// Property access on an evaluated receiver.
    pub fn property_of(
        &mut self,
        obj: &TypedValue,
        name: &str,
        name_span: Span,
        object_span: Span,
    ) -> EvalResult<TypedValue> {
        match &obj.value {
            Value::Type(t) => type_props::get_type_property(t, name, name_span),
            Value::Array(items) => match name {
                "length" => {
                    let value = Value::Int(items.len() as i64);
                    let ty = literal_type(&value);
                    Ok(TypedValue::new(value, ty))
                }
                _ if methods::is_array_method(name) => Ok(method_value(obj.clone(), name)),
                _ => Err(EvalError::new(
                    EvalErrorKind::NoSuchField(name.to_string()),
                    name_span,
                )),
            },
            Value::Str(s) => match name {
                "length" => {
                    let value = Value::Int(s.chars().count() as i64);
                    let ty = literal_type(&value);
                    Ok(TypedValue::new(value, ty))
                }
                _ if methods::is_string_method(name) => Ok(method_value(obj.clone(), name)),
                _ => Err(EvalError::new(
                    EvalErrorKind::NoSuchField(name.to_string()),
                    name_span,
                )),
            },
            Value::Record(fields) => match fields.get(name) {
                Some(value) => {
                    let declared = match obj.ty.unwrap_metadata() {
                        Type::Record { fields, .. } => {
                            fields.get(name).map(|f| f.ty.clone())
                        }
                        _ => None,
                    };
                    let ty = declared.unwrap_or_else(|| type_of_value(value));
                    Ok(TypedValue::new(value.clone(), ty))
                }
                None => Err(EvalError::new(
                    EvalErrorKind::NoSuchField(name.to_string()),
                    name_span,
                )),
            },
            other => Err(EvalError::new(
                EvalErrorKind::TypeMismatch {
                    expected: "record, array, string, or type".to_string(),
                    found: other.kind_name().to_string(),
                },
                object_span,
            )),
        }
    }

    fn eval_index(
        &mut self,
        object: &Expr,
        index: &Expr,
        env: &Env,
        span: Span,
    ) -> EvalResult<TypedValue> {
        let obj = self.evaluate(object, env)?;
        let idx = self.evaluate(index, env)?;
        self.index_of(&obj, &idx, span)
    }

    /// Index access on evaluated operands.
    pub fn index_of(
        &self,
        obj: &TypedValue,
        idx: &TypedValue,
        span: Span,
    ) -> EvalResult<TypedValue> {
        match (&obj.value, &idx.value) {
            (Value::Array(items), Value::Int(i)) => {
                let i = usize::try_from(*i).map_err(|_| {
                    EvalError::new(
                        EvalErrorKind::BadIndex(format!("negative index {i}")),
                        span,
                    )
                })?;
                let Some(value) = items.get(i) else {
                    return Err(EvalError::new(
                        EvalErrorKind::BadIndex(format!(
                            "index {i} out of bounds for array of length {}",
                            items.len()
                        )),
                        span,
                    ));
                };
                let ty = match obj.ty.unwrap_metadata() {
                    Type::Array {
                        elements,
                        variadic: false,
                    } => elements.get(i).cloned(),
                    Type::Array {
                        elements,
                        variadic: true,
                    } => elements.first().cloned(),
                    _ => None,
                };
                Ok(TypedValue::new(
                    value.clone(),
                    ty.unwrap_or_else(|| type_of_value(value)),
                ))
            }
            (Value::Str(s), Value::Int(i)) => {
                let i = usize::try_from(*i).map_err(|_| {
                    EvalError::new(
                        EvalErrorKind::BadIndex(format!("negative index {i}")),
                        span,
                    )
                })?;
                let Some(ch) = s.chars().nth(i) else {
                    return Err(EvalError::new(
                        EvalErrorKind::BadIndex(format!(
                            "index {i} out of bounds for string of length {}",
                            s.chars().count()
                        )),
                        span,
                    ));
                };
                let value = Value::Str(ch.to_string());
                let ty = literal_type(&value);
                Ok(TypedValue::new(value, ty))
            }
            (Value::Record(fields), Value::Str(key)) => match fields.get(key) {
                Some(value) => Ok(TypedValue::new(value.clone(), type_of_value(value))),
                None => Err(EvalError::new(
                    EvalErrorKind::NoSuchField(key.clone()),
                    span,
                )),
            },
            (obj_v, idx_v) => Err(EvalError::new(
                EvalErrorKind::BadIndex(format!(
                    "cannot index {} with {}",
                    obj_v.kind_name(),
                    idx_v.kind_name()
                )),
                span,
            )),
        }
    }

    // =========================================================================
    // Lambdas and calls
    // =========================================================================

    fn eval_lambda(&mut self, lambda: &dtz_ast::Lambda, env: &Env) -> EvalResult<TypedValue> {
        let mut params: Vec<ClosureParam> = Vec::with_capacity(lambda.params.len());
        let mut earlier: Vec<&str> = Vec::with_capacity(lambda.params.len());
        for param in &lambda.params {
            let mut cp = ClosureParam::from_ast(param);
            if let Some(ty_expr) = &param.ty {
                // Pre-evaluate the annotation unless it depends on an
                // earlier parameter (dependent signature).
                match self.evaluate(ty_expr, env) {
                    Ok(tv) => match tv.value.as_type() {
                        Some(t) => cp.ty = Some(t.clone()),
                        None => {
                            return Err(EvalError::new(
                                EvalErrorKind::TypeMismatch {
                                    expected: "type".to_string(),
                                    found: tv.value.kind_name().to_string(),
                                },
                                ty_expr.span,
                            ));
                        }
                    },
                    Err(err) => match &err.kind {
                        EvalErrorKind::UndefinedIdentifier(missing)
                            if earlier.contains(&missing.as_str()) => {}
                        _ => return Err(err),
                    },
                }
            }
            earlier.push(&param.name);
            params.push(cp);
        }
        let return_type = match &lambda.return_type {
            Some(rt_expr) => match self.evaluate(rt_expr, env) {
                Ok(tv) => match tv.value.as_type() {
                    Some(t) => Some(t.clone()),
                    None => {
                        return Err(EvalError::new(
                            EvalErrorKind::TypeMismatch {
                                expected: "type".to_string(),
                                found: tv.value.kind_name().to_string(),
                            },
                            rt_expr.span,
                        ));
                    }
                },
                Err(err) => match &err.kind {
                    EvalErrorKind::UndefinedIdentifier(missing)
                        if earlier.contains(&missing.as_str()) =>
                    {
                        None
                    }
                    _ => return Err(err),
                },
            },
            None => None,
        };
        let closure = Rc::new(Closure {
            params,
            body: lambda.body.clone(),
            env: env.clone(),
            return_type,
            is_async: lambda.is_async,
        });
        let ty = closure_type(&closure);
        Ok(TypedValue::new(Value::Closure(closure), ty))
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Arg],
        env: &Env,
        span: Span,
    ) -> EvalResult<TypedValue> {
        let callee_tv = self.evaluate(callee, env)?;
        let mut evaluated: Vec<(TypedValue, Span)> = Vec::with_capacity(args.len());
        for arg in args {
            let tv = self.evaluate(&arg.expr, env)?;
            if arg.spread {
                let Value::Array(items) = tv.value else {
                    return Err(EvalError::new(EvalErrorKind::BadSpread, arg.expr.span));
                };
                let elem_ty = element_type(&tv.ty);
                for value in items {
                    let ty = elem_ty.clone().unwrap_or_else(|| type_of_value(&value));
                    evaluated.push((TypedValue::new(value, ty), arg.expr.span));
                }
            } else {
                evaluated.push((tv, arg.expr.span));
            }
        }
        self.call_value(&callee_tv, evaluated, span)
    }

    /// Call dispatch on closures, builtins, and the `Type` constructor.
    pub fn call_value(
        &mut self,
        callee: &TypedValue,
        args: Vec<(TypedValue, Span)>,
        span: Span,
    ) -> EvalResult<TypedValue> {
        match &callee.value {
            Value::Closure(closure) => self.apply_closure(&closure.clone(), args, span),
            Value::Builtin(BuiltinFn::Global(builtin)) => {
                builtins::call_builtin(self, *builtin, args, span)
            }
            Value::Builtin(BuiltinFn::Method { recv, name }) => {
                methods::call_method(self, &recv.clone(), &name.clone(), args, span)
            }
            // `Type(bound)` builds a bounded type-of-types.
            Value::Type(Type::Primitive(Prim::Type)) => {
                let [(arg, arg_span)] = args.as_slice() else {
                    return Err(EvalError::new(
                        EvalErrorKind::MissingArg("bound".to_string()),
                        span,
                    ));
                };
                let Some(bound) = arg.value.as_type() else {
                    return Err(EvalError::new(
                        EvalErrorKind::TypeMismatch {
                            expected: "type".to_string(),
                            found: arg.value.kind_name().to_string(),
                        },
                        *arg_span,
                    ));
                };
                Ok(TypedValue::of_type(Type::Bounded(Box::new(bound.clone()))))
            }
            other => Err(EvalError::new(
                EvalErrorKind::TypeMismatch {
                    expected: "function".to_string(),
                    found: other.kind_name().to_string(),
                },
                span,
            )),
        }
    }

    /// Apply a closure to already-evaluated arguments.
    pub fn apply_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<(TypedValue, Span)>,
        call_span: Span,
    ) -> EvalResult<TypedValue> {
        trace!(params = closure.params.len(), args = args.len(), "apply closure");
        let call_env = closure.env.child();
        let mut args = args.into_iter();
        for param in &closure.params {
            let (arg, arg_span) = match args.next() {
                Some((tv, span)) => (tv, span),
                None => match &param.default {
                    // Defaults evaluate lazily in the lambda's own scope,
                    // with earlier parameters already bound.
                    Some(default) => (self.evaluate(default, &call_env)?, default.span),
                    None => {
                        return Err(EvalError::new(
                            EvalErrorKind::MissingArg(param.name.clone()),
                            call_span,
                        ));
                    }
                },
            };

            // Resolve the annotation: pre-evaluated, or dependent on
            // earlier parameters and resolved now.
            let annotation = match (&param.ty, &param.ty_expr) {
                (Some(ty), _) => Some(ty.clone()),
                (None, Some(ty_expr)) => {
                    let tv = self.evaluate(ty_expr, &call_env)?;
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
                (None, None) => None,
            };

            if let Some(annotation) = annotation {
                match &annotation {
                    // A bounded parameter takes a type-value and enforces
                    // the bound.
                    Type::Bounded(bound) => match arg.value.as_type() {
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
                                    found: arg.value.kind_name().to_string(),
                                },
                                arg_span,
                            ));
                        }
                    },
                    annotation => {
                        if !is_subtype(&arg.ty, annotation) {
                            return Err(EvalError::new(
                                EvalErrorKind::TypeMismatch {
                                    expected: annotation.to_string(),
                                    found: arg.ty.to_string(),
                                },
                                arg_span,
                            ));
                        }
                    }
                }
            }
            call_env.define_value(&param.name, arg);
        }

        let result = self.evaluate(&closure.body, &call_env)?;
        if let Some(return_type) = &closure.return_type
            && !is_subtype(&result.ty, return_type)
        {
            return Err(EvalError::new(
                EvalErrorKind::TypeMismatch {
                    expected: return_type.to_string(),
                    found: result.ty.to_string(),
                },
                closure.body.span,
            ));
        }
        Ok(result)
    }

    /// Callback entry point for builtins: apply with plain values.
    pub fn apply_closure_with_values(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<TypedValue>,
    ) -> EvalResult<TypedValue> {
        let args = args.into_iter().map(|tv| (tv, Span::dummy())).collect();
        self.apply_closure(closure, args, Span::dummy())
    }

    // =========================================================================
    // Match
    // =========================================================================

    fn eval_match(
        &mut self,
        scrutinee: &Expr,
        cases: &[MatchCase],
        env: &Env,
        span: Span,
    ) -> EvalResult<TypedValue> {
        let scrutinee_tv = self.evaluate(scrutinee, env)?;
        for case in cases {
            let Some(bindings) = bind_pattern(&case.pattern, &scrutinee_tv) else {
                continue;
            };
            let case_env = env.child();
            for (name, tv) in bindings {
                case_env.define_value(name, tv);
            }
            if let Some(guard) = &case.guard {
                let guard_tv = self.evaluate(guard, &case_env)?;
                if !guard_tv.value.is_truthy() {
                    continue;
                }
            }
            return self.evaluate(&case.body, &case_env);
        }
        Err(EvalError::new(EvalErrorKind::NoMatch, span))
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    fn eval_block(
        &mut self,
        decls: &[Decl],
        result: Option<&Expr>,
        env: &Env,
    ) -> EvalResult<TypedValue> {
        let block_env = env.child();
        for decl in decls {
            match &decl.kind {
                DeclKind::Const {
                    name, ty, init, ..
                } => {
                    let annotated = match ty {
                        Some(ty_expr) => {
                            let tv = self.evaluate(ty_expr, &block_env)?;
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
                    block_env.define(
                        name,
                        Binding::Unevaluated {
                            expr: Rc::new(init.clone()),
                            env: block_env.clone(),
                            ty: annotated,
                        },
                    );
                }
                DeclKind::Expr(e) => {
                    self.evaluate(e, &block_env)?;
                }
                DeclKind::Import { .. } => {
                    // Imports are top-level only; the parser rejects them here.
                }
            }
        }
        match result {
            Some(e) => self.evaluate(e, &block_env),
            None => Ok(TypedValue::undefined()),
        }
    }
}

/// Bind a pattern against a scrutinee. `None` means "does not match";
/// matching never errors.
pub fn bind_pattern(pattern: &Pattern, scrutinee: &TypedValue) -> Option<Vec<(String, TypedValue)>> {
    match &pattern.kind {
        PatternKind::Wildcard => Some(vec![]),
        PatternKind::Literal(lit) => {
            let lit_value = match lit {
                Lit::Int(n) => Value::Int(*n),
                Lit::Float(n) => Value::Float(*n),
                Lit::Str(s) => Value::Str(s.clone()),
                Lit::Bool(b) => Value::Bool(*b),
                Lit::Null => Value::Null,
                Lit::Undefined => Value::Undefined,
            };
            raw_eq(&scrutinee.value, &lit_value).then(Vec::new)
        }
        PatternKind::Binding { name, inner } => {
            let mut bindings = match inner {
                Some(inner) => bind_pattern(inner, scrutinee)?,
                None => vec![],
            };
            bindings.push((name.clone(), scrutinee.clone()));
            Some(bindings)
        }
        PatternKind::Destructure(field_patterns) => {
            let Value::Record(fields) = &scrutinee.value else {
                return None;
            };
            let field_types = match scrutinee.ty.unwrap_metadata() {
                Type::Record { fields, .. } => Some(fields),
                _ => None,
            };
            let mut bindings = vec![];
            for fp in field_patterns {
                let value = fields.get(&fp.name)?;
                let ty = field_types
                    .and_then(|f| f.get(&fp.name).map(|f| f.ty.clone()))
                    .unwrap_or_else(|| type_of_value(value));
                let field_tv = TypedValue::new(value.clone(), ty);
                match &fp.pattern {
                    Some(nested) => bindings.extend(bind_pattern(nested, &field_tv)?),
                    None => bindings.push((fp.name.clone(), field_tv)),
                }
            }
            Some(bindings)
        }
    }
}

/// Wrap a receiver and method name into a bound-method value.
fn method_value(recv: TypedValue, name: &str) -> TypedValue {
    TypedValue::new(
        Value::Builtin(BuiltinFn::Method {
            recv: Rc::new(recv),
            name: name.to_string(),
        }),
        Type::Function {
            params: vec![],
            return_type: Box::new(Type::UNKNOWN),
            is_async: false,
        },
    )
}

/// The element type of an array type, when statically known.
pub fn element_type(ty: &Type) -> Option<Type> {
    match ty.unwrap_metadata() {
        Type::Array {
            elements,
            variadic: true,
        } => elements.first().cloned(),
        Type::Array {
            elements,
            variadic: false,
        } => Some(Type::union(elements.clone())),
        _ => None,
    }
}
