//! Runtime values of the compile-time evaluator.
//!
//! `Value` is the raw computed value; the evaluator always carries it
//! paired with its refined type as a [`TypedValue`], so `type_of` is a
//! projection rather than a re-analysis. Types themselves are values
//! (`Value::Type`), which is what makes the language's types-as-values
//! model work.

use crate::env::Env;
use dtz_ast::{Expr, Param};
use dtz_solver::{Constraint, LitValue, Type, is_subtype};
use indexmap::IndexMap;
use std::rc::Rc;

/// A raw compile-time value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Record(IndexMap<String, Value>),
    Array(Vec<Value>),
    Closure(Rc<Closure>),
    /// A first-class type.
    Type(Type),
    Builtin(BuiltinFn),
}

/// A value paired with its refined type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    pub value: Value,
    pub ty: Type,
}

impl TypedValue {
    pub fn new(value: Value, ty: Type) -> Self {
        Self { value, ty }
    }

    /// A type-value: the value is the type, its own type is the bound.
    pub fn of_type(ty: Type) -> Self {
        let own = Type::Bounded(Box::new(ty.clone()));
        Self {
            value: Value::Type(ty),
            ty: own,
        }
    }

    pub fn undefined() -> Self {
        Self::new(Value::Undefined, Type::UNDEFINED)
    }
}

/// A user lambda closed over its defining environment.
#[derive(Debug)]
pub struct Closure {
    pub params: Vec<ClosureParam>,
    pub body: Expr,
    pub env: Env,
    pub return_type: Option<Type>,
    pub is_async: bool,
}

/// One closure parameter. The annotation is kept as an expression because
/// dependent signatures (`(T: Type(Number), x: T) => ...`) can only be
/// evaluated once earlier parameters are bound; non-dependent annotations
/// are pre-evaluated at closure construction.
#[derive(Debug, Clone)]
pub struct ClosureParam {
    pub name: String,
    pub ty_expr: Option<Expr>,
    /// Pre-evaluated annotation, when it does not depend on earlier params.
    pub ty: Option<Type>,
    pub default: Option<Expr>,
}

impl ClosureParam {
    pub fn from_ast(param: &Param) -> Self {
        Self {
            name: param.name.clone(),
            ty_expr: param.ty.clone(),
            ty: None,
            default: param.default.clone(),
        }
    }
}

/// A builtin callable: a global, or a method bound to its receiver.
#[derive(Debug, Clone)]
pub enum BuiltinFn {
    Global(Builtin),
    Method {
        recv: Rc<TypedValue>,
        name: String,
    },
}

/// The global builtins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Assert,
    /// Identity under full evaluation; a staging marker otherwise.
    Comptime,
    /// Only meaningful under staging; an error under full evaluation.
    Runtime,
    Union,
    Intersection,
    RecordType,
    ArrayType,
    FunctionType,
    Branded,
    WithMetadata,
    LiteralType,
    IsNumber,
    IsString,
    IsBool,
    IsNull,
    IsObject,
    IsArray,
    IsFunction,
}

impl Builtin {
    pub const fn name(self) -> &'static str {
        match self {
            Builtin::Assert => "assert",
            Builtin::Comptime => "comptime",
            Builtin::Runtime => "runtime",
            Builtin::Union => "Union",
            Builtin::Intersection => "Intersection",
            Builtin::RecordType => "RecordType",
            Builtin::ArrayType => "Array",
            Builtin::FunctionType => "FunctionType",
            Builtin::Branded => "Branded",
            Builtin::WithMetadata => "WithMetadata",
            Builtin::LiteralType => "LiteralType",
            Builtin::IsNumber => "isNumber",
            Builtin::IsString => "isString",
            Builtin::IsBool => "isBool",
            Builtin::IsNull => "isNull",
            Builtin::IsObject => "isObject",
            Builtin::IsArray => "isArray",
            Builtin::IsFunction => "isFunction",
        }
    }
}

impl Value {
    /// JS-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Null | Value::Undefined => false,
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }

    /// The primitive literal view, for primitive values.
    pub fn as_lit(&self) -> Option<LitValue> {
        match self {
            Value::Int(n) => Some(LitValue::Int(*n)),
            Value::Float(n) => Some(LitValue::Float(*n)),
            Value::Str(s) => Some(LitValue::Str(s.clone())),
            Value::Bool(b) => Some(LitValue::Bool(*b)),
            Value::Null => Some(LitValue::Null),
            Value::Undefined => Some(LitValue::Undefined),
            _ => None,
        }
    }

    /// A short name for the value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Record(_) => "record",
            Value::Array(_) => "array",
            Value::Closure(_) => "function",
            Value::Type(_) => "type",
            Value::Builtin(_) => "builtin",
        }
    }

    /// String coercion for template interpolation and `UserThrow` display.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Null => "null".to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::Record(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.to_display_string()))
                    .collect();
                format!("{{ {} }}", inner.join(", "))
            }
            Value::Array(items) => {
                let inner: Vec<String> =
                    items.iter().map(|v| v.to_display_string()).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Closure(_) => "<function>".to_string(),
            Value::Type(t) => t.to_string(),
            Value::Builtin(BuiltinFn::Global(b)) => format!("<builtin {}>", b.name()),
            Value::Builtin(BuiltinFn::Method { name, .. }) => format!("<method {name}>"),
        }
    }
}

/// Structural raw-value equality: primitives by value (numbers compare
/// numerically across Int/Float), arrays componentwise, records by key
/// set and recursive equality, type-values by canonical form, closures
/// by identity.
pub fn raw_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Undefined, Value::Undefined) => true,
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| raw_eq(x, y))
        }
        (Value::Record(xs), Value::Record(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| raw_eq(x, y)))
        }
        (Value::Type(x), Value::Type(y)) => is_subtype(x, y) && is_subtype(y, x),
        (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(BuiltinFn::Global(x)), Value::Builtin(BuiltinFn::Global(y))) => x == y,
        _ => false,
    }
}

/// The refined constraint a value satisfies. Total, and never `never`.
pub fn constraint_of(v: &Value) -> Constraint {
    match v {
        Value::Int(n) => Constraint::Equals(LitValue::Int(*n)),
        Value::Float(n) => Constraint::Equals(LitValue::Float(*n)),
        Value::Str(s) => Constraint::Equals(LitValue::Str(s.clone())),
        Value::Bool(b) => Constraint::Equals(LitValue::Bool(*b)),
        Value::Null => Constraint::Equals(LitValue::Null),
        Value::Undefined => Constraint::Equals(LitValue::Undefined),
        Value::Record(fields) => Constraint::and(
            std::iter::once(Constraint::IsObject)
                .chain(fields.iter().map(|(name, value)| {
                    Constraint::HasField(name.clone(), Box::new(constraint_of(value)))
                }))
                .collect(),
        ),
        Value::Array(items) => Constraint::and(
            std::iter::once(Constraint::IsArray)
                .chain(std::iter::once(Constraint::Length(Box::new(
                    Constraint::Equals(LitValue::Int(items.len() as i64)),
                ))))
                .chain(
                    items.iter().enumerate().map(|(i, item)| {
                        Constraint::ElementAt(i, Box::new(constraint_of(item)))
                    }),
                )
                .collect(),
        ),
        Value::Closure(_) | Value::Builtin(_) => Constraint::IsFunction,
        // Type-values are erased before runtime; no runtime predicate.
        Value::Type(_) => Constraint::Any,
    }
}

/// The literal type of a freshly evaluated literal.
pub fn literal_type(v: &Value) -> Type {
    match v.as_lit() {
        Some(lit) => {
            let base = lit.base();
            Type::Literal(lit, base)
        }
        None => match v {
            Value::Closure(c) => closure_type(c),
            Value::Type(t) => Type::Bounded(Box::new(t.clone())),
            _ => Type::UNKNOWN,
        },
    }
}

/// The function type of a closure, as far as it is statically known.
/// Dependent parameters surface as `Unknown`.
pub fn closure_type(c: &Closure) -> Type {
    Type::Function {
        params: c
            .params
            .iter()
            .map(|p| dtz_solver::FnParam {
                name: p.name.clone(),
                ty: p.ty.clone().unwrap_or(Type::UNKNOWN),
                optional: p.default.is_some(),
            })
            .collect(),
        return_type: Box::new(c.return_type.clone().unwrap_or(Type::UNKNOWN)),
        is_async: c.is_async,
    }
}

/// The type of an arbitrary value, for contexts that lack a better one.
pub fn type_of_value(v: &Value) -> Type {
    match v {
        Value::Record(fields) => Type::Record {
            fields: fields
                .iter()
                .map(|(name, value)| {
                    (
                        name.clone(),
                        dtz_solver::Field::required(type_of_value(value)),
                    )
                })
                .collect(),
            index_type: None,
            closed: false,
        },
        Value::Array(items) => Type::Array {
            elements: items.iter().map(type_of_value).collect(),
            variadic: false,
        },
        Value::Builtin(_) => Type::Function {
            params: vec![],
            return_type: Box::new(Type::UNKNOWN),
            is_async: false,
        },
        other => literal_type(other),
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

#[cfg(test)]
mod value_sanity {
    use super::*;
    use dtz_solver::Prim;

    #[test]
    fn bounded_type_of_type_value() {
        let tv = TypedValue::of_type(Type::INT);
        assert!(matches!(tv.value, Value::Type(Type::Primitive(Prim::Int))));
        assert!(is_subtype(
            &tv.ty,
            &Type::Bounded(Box::new(Type::Primitive(Prim::Number)))
        ));
    }
}
