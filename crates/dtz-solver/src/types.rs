//! The structural type model.
//!
//! `Type` is what annotations and type expressions evaluate to; the
//! compile-time evaluator wraps it in a type-value. Structural routines
//! (`is_subtype`, property queries) operate on this tree, while boolean
//! reasoning happens on the `Constraint` view.

use indexmap::IndexMap;

/// Primitive types, plus the limit types and the type of types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    Int,
    Float,
    Number,
    String,
    Boolean,
    Null,
    Undefined,
    Never,
    Unknown,
    Any,
    /// The type of type-values; `Type(bound)` refines it to `Bounded`.
    Type,
}

impl Prim {
    pub const fn name(self) -> &'static str {
        match self {
            Prim::Int => "Int",
            Prim::Float => "Float",
            Prim::Number => "Number",
            Prim::String => "String",
            Prim::Boolean => "Boolean",
            Prim::Null => "Null",
            Prim::Undefined => "Undefined",
            Prim::Never => "Never",
            Prim::Unknown => "Unknown",
            Prim::Any => "Any",
            Prim::Type => "Type",
        }
    }
}

impl std::fmt::Display for Prim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A primitive compile-time literal value.
///
/// This is the value payload of literal types and of `equals` constraints.
/// Aggregates (records, arrays) never appear here: refinements and the
/// Type/Constraint bridge only ever produce primitive equalities.
#[derive(Debug, Clone, PartialEq)]
pub enum LitValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
}

impl LitValue {
    /// The primitive base type of this literal.
    pub fn base(&self) -> Prim {
        match self {
            LitValue::Int(_) => Prim::Int,
            LitValue::Float(_) => Prim::Float,
            LitValue::Str(_) => Prim::String,
            LitValue::Bool(_) => Prim::Boolean,
            LitValue::Null => Prim::Null,
            LitValue::Undefined => Prim::Undefined,
        }
    }

    /// Numeric view, if this literal is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LitValue::Int(n) => Some(*n as f64),
            LitValue::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for LitValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LitValue::Int(n) => write!(f, "{n}"),
            LitValue::Float(n) => write!(f, "{n}"),
            LitValue::Str(s) => write!(f, "{s:?}"),
            LitValue::Bool(b) => write!(f, "{b}"),
            LitValue::Null => f.write_str("null"),
            LitValue::Undefined => f.write_str("undefined"),
        }
    }
}

/// A record field: its type and whether it may be omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub ty: Type,
    pub optional: bool,
}

impl Field {
    pub fn required(ty: Type) -> Self {
        Self {
            ty,
            optional: false,
        }
    }
}

/// A function parameter as seen by the type system.
#[derive(Debug, Clone, PartialEq)]
pub struct FnParam {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
}

/// A structural type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Primitive(Prim),
    /// A literal type: the value plus its primitive base.
    Literal(LitValue, Prim),
    Record {
        fields: IndexMap<String, Field>,
        /// Type of fields beyond the named ones. `Some(Never)` means the
        /// record is closed; callers use `closed` instead of testing that.
        index_type: Option<Box<Type>>,
        closed: bool,
    },
    /// `variadic: true` is `T[]` with a single element type; `false` is a
    /// tuple with one type per position.
    Array {
        elements: Vec<Type>,
        variadic: bool,
    },
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    Function {
        params: Vec<FnParam>,
        return_type: Box<Type>,
        is_async: bool,
    },
    /// Nominal wrapper: opaque for subtyping, identified by brand name.
    Branded {
        base: Box<Type>,
        brand: String,
    },
    /// The type of type-values constrained to subtypes of `bound`.
    Bounded(Box<Type>),
    /// Metadata wrapper, transparent for subtyping.
    WithMetadata {
        inner: Box<Type>,
        name: Option<String>,
        type_args: Vec<Type>,
        annotations: Vec<LitValue>,
    },
}

impl Type {
    pub const NEVER: Type = Type::Primitive(Prim::Never);
    pub const ANY: Type = Type::Primitive(Prim::Any);
    pub const UNKNOWN: Type = Type::Primitive(Prim::Unknown);
    pub const NUMBER: Type = Type::Primitive(Prim::Number);
    pub const INT: Type = Type::Primitive(Prim::Int);
    pub const FLOAT: Type = Type::Primitive(Prim::Float);
    pub const STRING: Type = Type::Primitive(Prim::String);
    pub const BOOLEAN: Type = Type::Primitive(Prim::Boolean);
    pub const NULL: Type = Type::Primitive(Prim::Null);
    pub const UNDEFINED: Type = Type::Primitive(Prim::Undefined);

    /// Build a union, flattening nested unions, dropping `Never`, and
    /// deduplicating. An empty result is `Never`; a singleton unwraps.
    pub fn union(types: Vec<Type>) -> Type {
        let mut members: Vec<Type> = Vec::with_capacity(types.len());
        for t in types {
            match t {
                Type::Union(inner) => {
                    for t in inner {
                        if t != Type::NEVER && !members.contains(&t) {
                            members.push(t);
                        }
                    }
                }
                Type::Primitive(Prim::Never) => {}
                t => {
                    if !members.contains(&t) {
                        members.push(t);
                    }
                }
            }
        }
        match members.len() {
            0 => Type::NEVER,
            1 => members.pop().unwrap_or(Type::NEVER),
            _ => Type::Union(members),
        }
    }

    /// Build an intersection, flattening, dropping `Unknown`/`Any`, and
    /// deduplicating. Empty is `Unknown`; a singleton unwraps.
    pub fn intersection(types: Vec<Type>) -> Type {
        let mut members: Vec<Type> = Vec::with_capacity(types.len());
        for t in types {
            match t {
                Type::Intersection(inner) => {
                    for t in inner {
                        if !matches!(t, Type::Primitive(Prim::Unknown | Prim::Any))
                            && !members.contains(&t)
                        {
                            members.push(t);
                        }
                    }
                }
                Type::Primitive(Prim::Unknown | Prim::Any) => {}
                t => {
                    if !members.contains(&t) {
                        members.push(t);
                    }
                }
            }
        }
        match members.len() {
            0 => Type::UNKNOWN,
            1 => members.pop().unwrap_or(Type::UNKNOWN),
            _ => Type::Intersection(members),
        }
    }

    /// A variadic array type `T[]`.
    pub fn array_of(element: Type) -> Type {
        Type::Array {
            elements: vec![element],
            variadic: true,
        }
    }

    /// Unwrap `WithMetadata` layers.
    pub fn unwrap_metadata(&self) -> &Type {
        let mut t = self;
        while let Type::WithMetadata { inner, .. } = t {
            t = inner;
        }
        t
    }

    /// The display name of the type, honoring metadata names.
    pub fn display_name(&self) -> String {
        match self {
            Type::WithMetadata {
                name: Some(name), ..
            } => name.clone(),
            other => other.to_string(),
        }
    }

    /// The union of literal string types naming this record's fields.
    /// `Never` for an empty record; `None` when `self` is not a record.
    pub fn keys_type(&self) -> Option<Type> {
        match self.unwrap_metadata() {
            Type::Record { fields, .. } => Some(Type::union(
                fields
                    .keys()
                    .map(|k| Type::Literal(LitValue::Str(k.clone()), Prim::String))
                    .collect(),
            )),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{p}"),
            Type::Literal(v, _) => write!(f, "{v}"),
            Type::Record {
                fields,
                index_type,
                closed,
            } => {
                f.write_str("{ ")?;
                for (i, (name, field)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let opt = if field.optional { "?" } else { "" };
                    write!(f, "{name}{opt}: {}", field.ty)?;
                }
                if let Some(index) = index_type
                    && !closed
                {
                    if !fields.is_empty() {
                        f.write_str(", ")?;
                    }
                    write!(f, "[_]: {index}")?;
                }
                f.write_str(" }")
            }
            Type::Array { elements, variadic } => {
                if *variadic {
                    match elements.first() {
                        Some(e) => write!(f, "{e}[]"),
                        None => f.write_str("[]"),
                    }
                } else {
                    f.write_str("[")?;
                    for (i, e) in elements.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{e}")?;
                    }
                    f.write_str("]")
                }
            }
            Type::Union(types) => {
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            Type::Intersection(types) => {
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
            Type::Function {
                params,
                return_type,
                is_async,
            } => {
                if *is_async {
                    f.write_str("async ")?;
                }
                f.write_str("(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let opt = if p.optional { "?" } else { "" };
                    write!(f, "{}{opt}: {}", p.name, p.ty)?;
                }
                write!(f, ") => {return_type}")
            }
            Type::Branded { base, brand } => write!(f, "Branded<{base}, {brand:?}>"),
            Type::Bounded(bound) => write!(f, "Type<{bound}>"),
            Type::WithMetadata {
                inner,
                name,
                type_args,
                ..
            } => match name {
                Some(name) if !type_args.is_empty() => {
                    write!(f, "{name}<")?;
                    for (i, t) in type_args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{t}")?;
                    }
                    f.write_str(">")
                }
                Some(name) => f.write_str(name),
                None => write!(f, "{inner}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_flattens_and_dedups() {
        let t = Type::union(vec![
            Type::INT,
            Type::union(vec![Type::STRING, Type::INT]),
            Type::NEVER,
        ]);
        assert_eq!(t, Type::Union(vec![Type::INT, Type::STRING]));
    }

    #[test]
    fn singleton_union_unwraps() {
        assert_eq!(Type::union(vec![Type::INT, Type::INT]), Type::INT);
        assert_eq!(Type::union(vec![]), Type::NEVER);
    }

    #[test]
    fn intersection_drops_top() {
        let t = Type::intersection(vec![Type::UNKNOWN, Type::INT]);
        assert_eq!(t, Type::INT);
    }

    #[test]
    fn keys_type_of_record() {
        let mut fields = IndexMap::new();
        fields.insert("kind".to_string(), Field::required(Type::STRING));
        fields.insert("r".to_string(), Field::required(Type::INT));
        let rec = Type::Record {
            fields,
            index_type: None,
            closed: false,
        };
        let keys = rec.keys_type().unwrap();
        assert_eq!(
            keys,
            Type::Union(vec![
                Type::Literal(LitValue::Str("kind".into()), Prim::String),
                Type::Literal(LitValue::Str("r".into()), Prim::String),
            ])
        );
    }
}
