//! Array and string methods.
//!
//! Methods are bound at property-access time and dispatched here by name.
//! Array methods that take callbacks pass `(element, index, array)` as
//! typed values through `apply_closure_with_values`; extra callback
//! parameters the user did not declare are simply not bound.

use crate::error::{EvalError, EvalErrorKind, EvalResult};
use crate::interp::{Evaluator, element_type};
use crate::value::{TypedValue, Value, literal_type, raw_eq, type_of_value};
use dtz_common::span::Span;
use dtz_solver::Type;
use std::rc::Rc;

const ARRAY_METHODS: &[&str] = &[
    "map", "filter", "find", "findIndex", "some", "every", "reduce", "concat", "slice",
    "indexOf", "includes", "join", "flat", "flatMap",
];

const STRING_METHODS: &[&str] = &[
    "charAt",
    "charCodeAt",
    "substring",
    "slice",
    "indexOf",
    "lastIndexOf",
    "includes",
    "startsWith",
    "endsWith",
    "split",
    "trim",
    "trimStart",
    "trimEnd",
    "toUpperCase",
    "toLowerCase",
    "replace",
    "replaceAll",
    "padStart",
    "padEnd",
    "repeat",
    "concat",
];

pub fn is_array_method(name: &str) -> bool {
    ARRAY_METHODS.contains(&name)
}

pub fn is_string_method(name: &str) -> bool {
    STRING_METHODS.contains(&name)
}

pub fn call_method(
    eval: &mut Evaluator,
    recv: &Rc<TypedValue>,
    name: &str,
    args: Vec<(TypedValue, Span)>,
    span: Span,
) -> EvalResult<TypedValue> {
    match &recv.value {
        Value::Array(items) => call_array_method(eval, recv, items, name, args, span),
        Value::Str(s) => call_string_method(s, name, args, span),
        Value::Type(t) => match name {
            "extends" => {
                let (arg, arg_span) = first(&args, "other", span)?;
                let Some(other) = arg.value.as_type() else {
                    return Err(mismatch("type", &arg.value, *arg_span));
                };
                Ok(bool_value(dtz_solver::is_subtype(t, other)))
            }
            _ => Err(EvalError::new(
                EvalErrorKind::NoSuchField(name.to_string()),
                span,
            )),
        },
        other => Err(mismatch("array, string, or type", other, span)),
    }
}

// =============================================================================
// Arrays
// =============================================================================

fn call_array_method(
    eval: &mut Evaluator,
    recv: &Rc<TypedValue>,
    items: &[Value],
    name: &str,
    args: Vec<(TypedValue, Span)>,
    span: Span,
) -> EvalResult<TypedValue> {
    let elem_ty = element_type(&recv.ty);
    let elem_tv = |i: usize, v: &Value| {
        let ty = match &recv.ty {
            Type::Array {
                elements,
                variadic: false,
            } => elements.get(i).cloned(),
            _ => elem_ty.clone(),
        };
        TypedValue::new(v.clone(), ty.unwrap_or_else(|| type_of_value(v)))
    };

    match name {
        "map" => {
            let callback = callback_arg(&args, span)?;
            let mut values = Vec::with_capacity(items.len());
            let mut types = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let result = eval.apply_closure_with_values(
                    &callback,
                    callback_args(elem_tv(i, item), i, recv),
                )?;
                values.push(result.value);
                types.push(result.ty);
            }
            Ok(array_value(values, types))
        }
        "filter" => {
            let callback = callback_arg(&args, span)?;
            let mut values = Vec::new();
            let mut types = Vec::new();
            for (i, item) in items.iter().enumerate() {
                let keep = eval.apply_closure_with_values(
                    &callback,
                    callback_args(elem_tv(i, item), i, recv),
                )?;
                if keep.value.is_truthy() {
                    let tv = elem_tv(i, item);
                    values.push(tv.value);
                    types.push(tv.ty);
                }
            }
            Ok(array_value(values, types))
        }
        "find" => {
            let callback = callback_arg(&args, span)?;
            for (i, item) in items.iter().enumerate() {
                let hit = eval.apply_closure_with_values(
                    &callback,
                    callback_args(elem_tv(i, item), i, recv),
                )?;
                if hit.value.is_truthy() {
                    return Ok(elem_tv(i, item));
                }
            }
            Ok(TypedValue::undefined())
        }
        "findIndex" => {
            let callback = callback_arg(&args, span)?;
            for (i, item) in items.iter().enumerate() {
                let hit = eval.apply_closure_with_values(
                    &callback,
                    callback_args(elem_tv(i, item), i, recv),
                )?;
                if hit.value.is_truthy() {
                    return Ok(int_value(i as i64));
                }
            }
            Ok(int_value(-1))
        }
        "some" => {
            let callback = callback_arg(&args, span)?;
            for (i, item) in items.iter().enumerate() {
                let hit = eval.apply_closure_with_values(
                    &callback,
                    callback_args(elem_tv(i, item), i, recv),
                )?;
                if hit.value.is_truthy() {
                    return Ok(bool_value(true));
                }
            }
            Ok(bool_value(false))
        }
        "every" => {
            let callback = callback_arg(&args, span)?;
            for (i, item) in items.iter().enumerate() {
                let hit = eval.apply_closure_with_values(
                    &callback,
                    callback_args(elem_tv(i, item), i, recv),
                )?;
                if !hit.value.is_truthy() {
                    return Ok(bool_value(false));
                }
            }
            Ok(bool_value(true))
        }
        "reduce" => {
            let callback = callback_arg(&args, span)?;
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some((initial, _)) => initial.clone(),
                None => match iter.next() {
                    Some((i, first_item)) => elem_tv(i, first_item),
                    None => {
                        return Err(EvalError::new(
                            EvalErrorKind::TypeMismatch {
                                expected: "non-empty array or initial value".to_string(),
                                found: "empty array".to_string(),
                            },
                            span,
                        ));
                    }
                },
            };
            for (i, item) in iter {
                acc = eval.apply_closure_with_values(
                    &callback,
                    vec![
                        acc,
                        elem_tv(i, item),
                        int_value(i as i64),
                        (**recv).clone(),
                    ],
                )?;
            }
            Ok(acc)
        }
        "concat" => {
            let mut values: Vec<Value> = items.to_vec();
            let mut types: Vec<Type> =
                (0..items.len()).map(|i| elem_tv(i, &items[i]).ty).collect();
            for (arg, _) in &args {
                match &arg.value {
                    Value::Array(other) => {
                        let other_elem = element_type(&arg.ty);
                        for v in other {
                            types.push(
                                other_elem.clone().unwrap_or_else(|| type_of_value(v)),
                            );
                            values.push(v.clone());
                        }
                    }
                    scalar => {
                        values.push(scalar.clone());
                        types.push(arg.ty.clone());
                    }
                }
            }
            Ok(array_value(values, types))
        }
        "slice" => {
            let (start, end) = slice_bounds(&args, items.len(), span)?;
            let slice = &items[start..end];
            let types = (start..end).map(|i| elem_tv(i, &items[i]).ty).collect();
            Ok(array_value(slice.to_vec(), types))
        }
        "indexOf" => {
            let (needle, _) = first(&args, "value", span)?;
            let index = items
                .iter()
                .position(|v| raw_eq(v, &needle.value))
                .map_or(-1, |i| i as i64);
            Ok(int_value(index))
        }
        "includes" => {
            let (needle, _) = first(&args, "value", span)?;
            Ok(bool_value(items.iter().any(|v| raw_eq(v, &needle.value))))
        }
        "join" => {
            let separator = match args.first() {
                Some((tv, tv_span)) => match &tv.value {
                    Value::Str(s) => s.clone(),
                    other => return Err(mismatch("string", other, *tv_span)),
                },
                None => ",".to_string(),
            };
            let joined: Vec<String> = items.iter().map(|v| v.to_display_string()).collect();
            Ok(str_value(joined.join(&separator)))
        }
        "flat" => {
            let depth = match args.first() {
                Some((tv, tv_span)) => match &tv.value {
                    Value::Int(n) if *n >= 0 => *n as usize,
                    other => return Err(mismatch("non-negative int", other, *tv_span)),
                },
                None => 1,
            };
            let mut values = Vec::new();
            flatten_into(items, depth, &mut values);
            let types = values.iter().map(type_of_value).collect();
            Ok(array_value(values, types))
        }
        "flatMap" => {
            let callback = callback_arg(&args, span)?;
            let mut values = Vec::new();
            for (i, item) in items.iter().enumerate() {
                let result = eval.apply_closure_with_values(
                    &callback,
                    callback_args(elem_tv(i, item), i, recv),
                )?;
                match result.value {
                    Value::Array(inner) => values.extend(inner),
                    other => values.push(other),
                }
            }
            let types = values.iter().map(type_of_value).collect();
            Ok(array_value(values, types))
        }
        _ => Err(EvalError::new(
            EvalErrorKind::NoSuchField(name.to_string()),
            span,
        )),
    }
}

fn flatten_into(items: &[Value], depth: usize, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => flatten_into(inner, depth - 1, out),
            other => out.push(other.clone()),
        }
    }
}

/// `(element, index, array)` for the callback protocol.
fn callback_args(element: TypedValue, index: usize, recv: &Rc<TypedValue>) -> Vec<TypedValue> {
    vec![element, int_value(index as i64), (**recv).clone()]
}

// =============================================================================
// Strings
// =============================================================================

fn call_string_method(
    s: &str,
    name: &str,
    args: Vec<(TypedValue, Span)>,
    span: Span,
) -> EvalResult<TypedValue> {
    let chars: Vec<char> = s.chars().collect();
    match name {
        "charAt" => {
            let i = int_arg(&args, 0, span)?;
            let ch = usize::try_from(i)
                .ok()
                .and_then(|i| chars.get(i))
                .map(|c| c.to_string())
                .unwrap_or_default();
            Ok(str_value(ch))
        }
        "charCodeAt" => {
            let i = int_arg(&args, 0, span)?;
            match usize::try_from(i).ok().and_then(|i| chars.get(i)) {
                Some(c) => Ok(int_value(*c as i64)),
                None => Ok(TypedValue::new(Value::Float(f64::NAN), Type::FLOAT)),
            }
        }
        "substring" => {
            let len = chars.len() as i64;
            let a = int_arg(&args, 0, span)?.clamp(0, len);
            let b = match args.get(1) {
                Some(_) => int_arg(&args, 1, span)?.clamp(0, len),
                None => len,
            };
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            Ok(str_value(
                chars[lo as usize..hi as usize].iter().collect::<String>(),
            ))
        }
        "slice" => {
            let len = chars.len() as i64;
            let a = match args.first() {
                Some(_) => resolve_index(int_arg(&args, 0, span)?, len),
                None => 0,
            };
            let b = match args.get(1) {
                Some(_) => resolve_index(int_arg(&args, 1, span)?, len),
                None => len,
            };
            if a >= b {
                return Ok(str_value(String::new()));
            }
            Ok(str_value(
                chars[a as usize..b as usize].iter().collect::<String>(),
            ))
        }
        "indexOf" => {
            let needle = str_arg(&args, 0, span)?;
            Ok(int_value(char_index_of(s, &needle).map_or(-1, |i| i as i64)))
        }
        "lastIndexOf" => {
            let needle = str_arg(&args, 0, span)?;
            let index = s
                .rfind(&needle)
                .map_or(-1, |byte| s[..byte].chars().count() as i64);
            Ok(int_value(index))
        }
        "includes" => {
            let needle = str_arg(&args, 0, span)?;
            Ok(bool_value(s.contains(&needle)))
        }
        "startsWith" => {
            let needle = str_arg(&args, 0, span)?;
            Ok(bool_value(s.starts_with(&needle)))
        }
        "endsWith" => {
            let needle = str_arg(&args, 0, span)?;
            Ok(bool_value(s.ends_with(&needle)))
        }
        "split" => {
            let separator = str_arg(&args, 0, span)?;
            let parts: Vec<Value> = if separator.is_empty() {
                chars.iter().map(|c| Value::Str(c.to_string())).collect()
            } else {
                s.split(&separator)
                    .map(|part| Value::Str(part.to_string()))
                    .collect()
            };
            let types = parts.iter().map(type_of_value).collect();
            Ok(array_value(parts, types))
        }
        "trim" => Ok(str_value(s.trim().to_string())),
        "trimStart" => Ok(str_value(s.trim_start().to_string())),
        "trimEnd" => Ok(str_value(s.trim_end().to_string())),
        "toUpperCase" => Ok(str_value(s.to_uppercase())),
        "toLowerCase" => Ok(str_value(s.to_lowercase())),
        "replace" => {
            let pattern = str_arg(&args, 0, span)?;
            let replacement = str_arg(&args, 1, span)?;
            Ok(str_value(s.replacen(&pattern, &replacement, 1)))
        }
        "replaceAll" => {
            let pattern = str_arg(&args, 0, span)?;
            let replacement = str_arg(&args, 1, span)?;
            Ok(str_value(s.replace(&pattern, &replacement)))
        }
        "padStart" => {
            let target = int_arg(&args, 0, span)?.max(0) as usize;
            let pad = pad_arg(&args, span)?;
            Ok(str_value(pad_string(s, target, &pad, true)))
        }
        "padEnd" => {
            let target = int_arg(&args, 0, span)?.max(0) as usize;
            let pad = pad_arg(&args, span)?;
            Ok(str_value(pad_string(s, target, &pad, false)))
        }
        "repeat" => {
            let n = int_arg(&args, 0, span)?;
            if n < 0 {
                return Err(EvalError::new(
                    EvalErrorKind::BadIndex(format!("negative repeat count {n}")),
                    span,
                ));
            }
            Ok(str_value(s.repeat(n as usize)))
        }
        "concat" => {
            let mut out = s.to_string();
            for (arg, _) in &args {
                out.push_str(&arg.value.to_display_string());
            }
            Ok(str_value(out))
        }
        _ => Err(EvalError::new(
            EvalErrorKind::NoSuchField(name.to_string()),
            span,
        )),
    }
}

fn char_index_of(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .find(needle)
        .map(|byte| haystack[..byte].chars().count())
}

fn resolve_index(i: i64, len: i64) -> i64 {
    if i < 0 { (len + i).max(0) } else { i.min(len) }
}

fn pad_string(s: &str, target: usize, pad: &str, at_start: bool) -> String {
    let current = s.chars().count();
    if current >= target || pad.is_empty() {
        return s.to_string();
    }
    let needed = target - current;
    let padding: String = pad.chars().cycle().take(needed).collect();
    if at_start {
        format!("{padding}{s}")
    } else {
        format!("{s}{padding}")
    }
}

// =============================================================================
// Argument helpers
// =============================================================================

fn first<'a>(
    args: &'a [(TypedValue, Span)],
    name: &str,
    span: Span,
) -> EvalResult<&'a (TypedValue, Span)> {
    args.first()
        .ok_or_else(|| EvalError::new(EvalErrorKind::MissingArg(name.to_string()), span))
}

fn callback_arg(
    args: &[(TypedValue, Span)],
    span: Span,
) -> EvalResult<Rc<crate::value::Closure>> {
    let (tv, tv_span) = first(args, "callback", span)?;
    match &tv.value {
        Value::Closure(c) => Ok(c.clone()),
        other => Err(mismatch("function", other, *tv_span)),
    }
}

fn int_arg(args: &[(TypedValue, Span)], index: usize, span: Span) -> EvalResult<i64> {
    match args.get(index) {
        Some((tv, tv_span)) => match &tv.value {
            Value::Int(n) => Ok(*n),
            other => Err(mismatch("int", other, *tv_span)),
        },
        None => Err(EvalError::new(
            EvalErrorKind::MissingArg(format!("argument {index}")),
            span,
        )),
    }
}

fn str_arg(args: &[(TypedValue, Span)], index: usize, span: Span) -> EvalResult<String> {
    match args.get(index) {
        Some((tv, tv_span)) => match &tv.value {
            Value::Str(s) => Ok(s.clone()),
            other => Err(mismatch("string", other, *tv_span)),
        },
        None => Err(EvalError::new(
            EvalErrorKind::MissingArg(format!("argument {index}")),
            span,
        )),
    }
}

fn pad_arg(args: &[(TypedValue, Span)], span: Span) -> EvalResult<String> {
    match args.get(1) {
        Some(_) => str_arg(args, 1, span),
        None => Ok(" ".to_string()),
    }
}

fn slice_bounds(
    args: &[(TypedValue, Span)],
    len: usize,
    span: Span,
) -> EvalResult<(usize, usize)> {
    let len = len as i64;
    let start = match args.first() {
        Some(_) => resolve_index(int_arg(args, 0, span)?, len),
        None => 0,
    };
    let end = match args.get(1) {
        Some(_) => resolve_index(int_arg(args, 1, span)?, len),
        None => len,
    };
    let start = start as usize;
    let end = (end as usize).max(start);
    Ok((start, end))
}

fn mismatch(expected: &str, found: &Value, span: Span) -> EvalError {
    EvalError::new(
        EvalErrorKind::TypeMismatch {
            expected: expected.to_string(),
            found: found.kind_name().to_string(),
        },
        span,
    )
}

fn int_value(n: i64) -> TypedValue {
    let value = Value::Int(n);
    let ty = literal_type(&value);
    TypedValue::new(value, ty)
}

fn bool_value(b: bool) -> TypedValue {
    let value = Value::Bool(b);
    let ty = literal_type(&value);
    TypedValue::new(value, ty)
}

fn str_value(s: String) -> TypedValue {
    let value = Value::Str(s);
    let ty = literal_type(&value);
    TypedValue::new(value, ty)
}

fn array_value(values: Vec<Value>, types: Vec<Type>) -> TypedValue {
    TypedValue::new(
        Value::Array(values),
        Type::Array {
            elements: types,
            variadic: false,
        },
    )
}
