//! The builtin surface exposed to user code.
//!
//! All builtins are pure and share the evaluator's error taxonomy. Type
//! constructors (`Union`, `RecordType`, ...) take and return type-values;
//! the classification guards (`isNumber`, ...) return booleans and double
//! as refinement sources for the staged evaluator.

use crate::env::Env;
use crate::error::{EvalError, EvalErrorKind, EvalResult};
use crate::interp::Evaluator;
use crate::value::{Builtin, BuiltinFn, TypedValue, Value};
use dtz_common::span::Span;
use dtz_solver::{Field, FnParam, LitValue, Prim, Type};
use indexmap::IndexMap;

/// The root environment: builtin functions plus the primitive type
/// constants.
pub fn global_env() -> Env {
    let env = Env::new();
    for builtin in [
        Builtin::Assert,
        Builtin::Comptime,
        Builtin::Runtime,
        Builtin::Union,
        Builtin::Intersection,
        Builtin::RecordType,
        Builtin::ArrayType,
        Builtin::FunctionType,
        Builtin::Branded,
        Builtin::WithMetadata,
        Builtin::LiteralType,
        Builtin::IsNumber,
        Builtin::IsString,
        Builtin::IsBool,
        Builtin::IsNull,
        Builtin::IsObject,
        Builtin::IsArray,
        Builtin::IsFunction,
    ] {
        env.define_value(
            builtin.name(),
            TypedValue::new(
                Value::Builtin(BuiltinFn::Global(builtin)),
                Type::Function {
                    params: vec![],
                    return_type: Box::new(Type::UNKNOWN),
                    is_async: false,
                },
            ),
        );
    }
    for prim in [
        Prim::Int,
        Prim::Float,
        Prim::Number,
        Prim::String,
        Prim::Boolean,
        Prim::Null,
        Prim::Undefined,
        Prim::Never,
        Prim::Unknown,
        Prim::Any,
        Prim::Type,
    ] {
        env.define_value(prim.name(), TypedValue::of_type(Type::Primitive(prim)));
    }
    env
}

pub fn call_builtin(
    _eval: &mut Evaluator,
    builtin: Builtin,
    args: Vec<(TypedValue, Span)>,
    span: Span,
) -> EvalResult<TypedValue> {
    match builtin {
        Builtin::Assert => {
            let (cond, _) = arg_at(&args, 0, "cond", span)?;
            if cond.value.is_truthy() {
                Ok(TypedValue::undefined())
            } else {
                let message = args.get(1).map(|(tv, _)| tv.value.to_display_string());
                Err(EvalError::new(EvalErrorKind::AssertionFailed(message), span))
            }
        }
        Builtin::Comptime => {
            let (arg, _) = arg_at(&args, 0, "expr", span)?;
            Ok(arg.clone())
        }
        Builtin::Runtime => Err(EvalError::new(
            EvalErrorKind::StagingError(
                "`runtime(...)` is only meaningful in staged code".to_string(),
            ),
            span,
        )),
        Builtin::Union => {
            let members = type_args(&args)?;
            Ok(TypedValue::of_type(Type::union(members)))
        }
        Builtin::Intersection => {
            let members = type_args(&args)?;
            Ok(TypedValue::of_type(Type::intersection(members)))
        }
        Builtin::RecordType => {
            let (fields_arg, fields_span) = arg_at(&args, 0, "fields", span)?;
            let Value::Record(field_values) = &fields_arg.value else {
                return Err(type_error("record of types", &fields_arg.value, *fields_span));
            };
            let mut fields: IndexMap<String, Field> = IndexMap::new();
            for (name, value) in field_values {
                let Some(ty) = value.as_type() else {
                    return Err(type_error("type", value, *fields_span));
                };
                fields.insert(name.clone(), Field::required(ty.clone()));
            }
            let index_type = match args.get(1) {
                Some((tv, tv_span)) => match tv.value.as_type() {
                    Some(t) => Some(t.clone()),
                    None => return Err(type_error("type", &tv.value, *tv_span)),
                },
                None => None,
            };
            // A `Never` index type closes the record.
            let closed = index_type
                .as_ref()
                .is_some_and(|t| *t == Type::NEVER);
            Ok(TypedValue::of_type(Type::Record {
                fields,
                index_type: index_type.map(Box::new),
                closed,
            }))
        }
        Builtin::ArrayType => {
            let elements = type_args(&args)?;
            if elements.is_empty() {
                return Err(EvalError::new(
                    EvalErrorKind::MissingArg("element type".to_string()),
                    span,
                ));
            }
            // One argument is `T[]`; several make a tuple.
            let variadic = elements.len() == 1;
            Ok(TypedValue::of_type(Type::Array { elements, variadic }))
        }
        Builtin::FunctionType => {
            let (params_arg, params_span) = arg_at(&args, 0, "params", span)?;
            let Value::Array(param_values) = &params_arg.value else {
                return Err(type_error("array of types", &params_arg.value, *params_span));
            };
            let mut params: Vec<FnParam> = Vec::with_capacity(param_values.len());
            for (i, value) in param_values.iter().enumerate() {
                let Some(ty) = value.as_type() else {
                    return Err(type_error("type", value, *params_span));
                };
                params.push(FnParam {
                    name: format!("p{i}"),
                    ty: ty.clone(),
                    optional: false,
                });
            }
            let (ret_arg, ret_span) = arg_at(&args, 1, "returnType", span)?;
            let Some(return_type) = ret_arg.value.as_type() else {
                return Err(type_error("type", &ret_arg.value, *ret_span));
            };
            Ok(TypedValue::of_type(Type::Function {
                params,
                return_type: Box::new(return_type.clone()),
                is_async: false,
            }))
        }
        Builtin::Branded => {
            let (base_arg, base_span) = arg_at(&args, 0, "base", span)?;
            let Some(base) = base_arg.value.as_type() else {
                return Err(type_error("type", &base_arg.value, *base_span));
            };
            let (name_arg, name_span) = arg_at(&args, 1, "name", span)?;
            let Value::Str(brand) = &name_arg.value else {
                return Err(type_error("string", &name_arg.value, *name_span));
            };
            Ok(TypedValue::of_type(Type::Branded {
                base: Box::new(base.clone()),
                brand: brand.clone(),
            }))
        }
        Builtin::WithMetadata => {
            let (base_arg, base_span) = arg_at(&args, 0, "base", span)?;
            let Some(inner) = base_arg.value.as_type() else {
                return Err(type_error("type", &base_arg.value, *base_span));
            };
            let (meta_arg, meta_span) = arg_at(&args, 1, "metadata", span)?;
            let Value::Record(meta) = &meta_arg.value else {
                return Err(type_error("record", &meta_arg.value, *meta_span));
            };
            let name = match meta.get("name") {
                Some(Value::Str(s)) => Some(s.clone()),
                Some(other) => return Err(type_error("string", other, *meta_span)),
                None => None,
            };
            let type_args = match meta.get("typeArgs") {
                Some(Value::Array(items)) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        let Some(t) = item.as_type() else {
                            return Err(type_error("type", item, *meta_span));
                        };
                        out.push(t.clone());
                    }
                    out
                }
                Some(other) => return Err(type_error("array of types", other, *meta_span)),
                None => vec![],
            };
            let annotations = match meta.get("annotations") {
                Some(Value::Array(items)) => {
                    let mut out: Vec<LitValue> = Vec::with_capacity(items.len());
                    for item in items {
                        let Some(lit) = item.as_lit() else {
                            return Err(type_error("primitive value", item, *meta_span));
                        };
                        out.push(lit);
                    }
                    out
                }
                Some(other) => return Err(type_error("array", other, *meta_span)),
                None => vec![],
            };
            Ok(TypedValue::of_type(Type::WithMetadata {
                inner: Box::new(inner.clone()),
                name,
                type_args,
                annotations,
            }))
        }
        Builtin::LiteralType => {
            let (value_arg, value_span) = arg_at(&args, 0, "value", span)?;
            let Some(lit) = value_arg.value.as_lit() else {
                return Err(type_error("primitive value", &value_arg.value, *value_span));
            };
            let base = lit.base();
            Ok(TypedValue::of_type(Type::Literal(lit, base)))
        }
        Builtin::IsNumber
        | Builtin::IsString
        | Builtin::IsBool
        | Builtin::IsNull
        | Builtin::IsObject
        | Builtin::IsArray
        | Builtin::IsFunction => {
            let (arg, _) = arg_at(&args, 0, "value", span)?;
            let holds = classify(builtin, &arg.value);
            let value = Value::Bool(holds);
            let ty = crate::value::literal_type(&value);
            Ok(TypedValue::new(value, ty))
        }
    }
}

fn classify(builtin: Builtin, value: &Value) -> bool {
    match builtin {
        Builtin::IsNumber => matches!(value, Value::Int(_) | Value::Float(_)),
        Builtin::IsString => matches!(value, Value::Str(_)),
        Builtin::IsBool => matches!(value, Value::Bool(_)),
        Builtin::IsNull => matches!(value, Value::Null),
        Builtin::IsObject => matches!(value, Value::Record(_)),
        Builtin::IsArray => matches!(value, Value::Array(_)),
        Builtin::IsFunction => matches!(value, Value::Closure(_) | Value::Builtin(_)),
        _ => false,
    }
}

fn arg_at<'a>(
    args: &'a [(TypedValue, Span)],
    index: usize,
    name: &str,
    span: Span,
) -> EvalResult<&'a (TypedValue, Span)> {
    args.get(index)
        .ok_or_else(|| EvalError::new(EvalErrorKind::MissingArg(name.to_string()), span))
}

fn type_args(args: &[(TypedValue, Span)]) -> EvalResult<Vec<Type>> {
    let mut out = Vec::with_capacity(args.len());
    for (tv, span) in args {
        let Some(t) = tv.value.as_type() else {
            return Err(type_error("type", &tv.value, *span));
        };
        out.push(t.clone());
    }
    Ok(out)
}

fn type_error(expected: &str, found: &Value, span: Span) -> EvalError {
    EvalError::new(
        EvalErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: found.kind_name().to_string(),
        },
        span,
    )
}
