//! Properties of type-values.
//!
//! Types are first-class, so user code can introspect them:
//! `T.fields`, `T.keysType`, `T.variants`, `T.extends(U)`, and the
//! metadata accessors. Structural queries delegate to the solver; the
//! results come back wrapped as values.

use crate::error::{EvalError, EvalErrorKind, EvalResult};
use crate::value::{BuiltinFn, TypedValue, Value, literal_type};
use dtz_common::span::Span;
use dtz_solver::{LitValue, Type};
use indexmap::IndexMap;
use std::rc::Rc;

pub fn get_type_property(t: &Type, name: &str, span: Span) -> EvalResult<TypedValue> {
    // Metadata accessors work on every type, with defaults.
    match name {
        "name" => return Ok(str_value(t.display_name())),
        "baseName" => {
            let base = match t {
                Type::WithMetadata { inner, .. } => inner.display_name(),
                other => other.display_name(),
            };
            return Ok(str_value(base));
        }
        "typeArgs" => {
            let args = match t {
                Type::WithMetadata { type_args, .. } => type_args.clone(),
                _ => vec![],
            };
            return Ok(type_array(args));
        }
        "annotations" => {
            let annotations = match t {
                Type::WithMetadata { annotations, .. } => annotations.clone(),
                _ => vec![],
            };
            let values: Vec<Value> = annotations.iter().map(lit_to_value).collect();
            let types = values.iter().map(literal_type).collect();
            return Ok(TypedValue::new(
                Value::Array(values),
                Type::Array {
                    elements: types,
                    variadic: false,
                },
            ));
        }
        // `.extends(other)` is `is_subtype` exposed as a method.
        "extends" => {
            return Ok(TypedValue::new(
                Value::Builtin(BuiltinFn::Method {
                    recv: Rc::new(TypedValue::of_type(t.clone())),
                    name: "extends".to_string(),
                }),
                Type::Function {
                    params: vec![],
                    return_type: Box::new(Type::BOOLEAN),
                    is_async: false,
                },
            ));
        }
        _ => {}
    }

    match t.unwrap_metadata() {
        Type::Record {
            fields, index_type, ..
        } => match name {
            "fields" => {
                let mut values: IndexMap<String, Value> = IndexMap::new();
                for (field_name, field) in fields {
                    values.insert(field_name.clone(), Value::Type(field.ty.clone()));
                }
                Ok(TypedValue::new(
                    Value::Record(values),
                    Type::Record {
                        fields: IndexMap::new(),
                        index_type: None,
                        closed: false,
                    },
                ))
            }
            "fieldNames" => {
                let values: Vec<Value> =
                    fields.keys().map(|k| Value::Str(k.clone())).collect();
                let types = values.iter().map(literal_type).collect();
                Ok(TypedValue::new(
                    Value::Array(values),
                    Type::Array {
                        elements: types,
                        variadic: false,
                    },
                ))
            }
            "indexType" => match index_type {
                Some(index) => Ok(TypedValue::of_type((**index).clone())),
                None => Ok(TypedValue::undefined()),
            },
            "keysType" => {
                let keys = t
                    .keys_type()
                    .unwrap_or(Type::NEVER);
                Ok(TypedValue::of_type(keys))
            }
            _ => no_such(name, span),
        },
        Type::Union(members) => match name {
            "variants" => Ok(type_array(members.clone())),
            _ => no_such(name, span),
        },
        Type::Intersection(members) => match name {
            "signatures" => {
                let signatures: Vec<Type> = members
                    .iter()
                    .filter(|m| matches!(m.unwrap_metadata(), Type::Function { .. }))
                    .cloned()
                    .collect();
                Ok(type_array(signatures))
            }
            "returnType" | "parameterTypes" => Err(EvalError::new(
                EvalErrorKind::AmbiguousSignature(name.to_string()),
                span,
            )),
            _ => no_such(name, span),
        },
        Type::Function {
            params,
            return_type,
            ..
        } => match name {
            "returnType" => Ok(TypedValue::of_type((**return_type).clone())),
            "parameterTypes" => {
                Ok(type_array(params.iter().map(|p| p.ty.clone()).collect()))
            }
            _ => no_such(name, span),
        },
        Type::Branded { base, brand } => match name {
            "baseType" => Ok(TypedValue::of_type((**base).clone())),
            "brand" => Ok(str_value(brand.clone())),
            _ => no_such(name, span),
        },
        _ => no_such(name, span),
    }
}

fn no_such(name: &str, span: Span) -> EvalResult<TypedValue> {
    Err(EvalError::new(
        EvalErrorKind::NoSuchField(name.to_string()),
        span,
    ))
}

fn str_value(s: String) -> TypedValue {
    let value = Value::Str(s);
    let ty = literal_type(&value);
    TypedValue::new(value, ty)
}

fn type_array(types: Vec<Type>) -> TypedValue {
    let element_types: Vec<Type> = types
        .iter()
        .map(|t| Type::Bounded(Box::new(t.clone())))
        .collect();
    let values: Vec<Value> = types.into_iter().map(Value::Type).collect();
    TypedValue::new(
        Value::Array(values),
        Type::Array {
            elements: element_types,
            variadic: false,
        },
    )
}

fn lit_to_value(lit: &LitValue) -> Value {
    match lit {
        LitValue::Int(n) => Value::Int(*n),
        LitValue::Float(n) => Value::Float(*n),
        LitValue::Str(s) => Value::Str(s.clone()),
        LitValue::Bool(b) => Value::Bool(*b),
        LitValue::Null => Value::Null,
        LitValue::Undefined => Value::Undefined,
    }
}
