//! Staged values and staged environments.

use dtz_ast::Lambda;
use dtz_emitter::JsExpr;
use dtz_eval::{Env, TypedValue};
use dtz_solver::{Constraint, Type};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Where a `Later` value comes from.
#[derive(Debug, Clone)]
pub enum Origin {
    /// An already-built residual expression.
    Residual(JsExpr),
    /// A runtime input: a function parameter or a `runtime(...)` binding.
    RuntimeInput { name: String },
    /// A binding imported from another module.
    ImportRef { name: String },
}

impl Origin {
    pub fn to_js(&self) -> JsExpr {
        match self {
            Origin::Residual(expr) => expr.clone(),
            Origin::RuntimeInput { name } | Origin::ImportRef { name } => {
                JsExpr::Var(name.clone())
            }
        }
    }
}

/// A staged value.
#[derive(Debug, Clone)]
pub enum SValue {
    /// Fully known at compile time.
    Now(TypedValue),
    /// Known only at runtime; the origin names the residual expression,
    /// the type and constraint are the statically known facts (narrowed
    /// along control flow).
    Later {
        origin: Origin,
        ty: Type,
        constraint: Constraint,
    },
    /// An array some of whose entries are `Later`. Length and per-index
    /// access stay compile-time decidable.
    LaterArray(Vec<SValue>),
    /// A closure that captured `Later` bindings (or staging-only forms);
    /// its body is re-staged at every compile-time call and residualized
    /// when the closure itself reaches residual code.
    StagedClosure(Rc<StagedClosure>),
}

impl SValue {
    pub fn later(origin: Origin, ty: Type) -> Self {
        let constraint = dtz_solver::type_to_constraint(&ty);
        SValue::Later {
            origin,
            ty,
            constraint,
        }
    }

    pub fn is_now(&self) -> bool {
        matches!(self, SValue::Now(_))
    }

    /// The statically known type of this staged value.
    pub fn ty(&self) -> Type {
        match self {
            SValue::Now(tv) => tv.ty.clone(),
            SValue::Later { ty, .. } => ty.clone(),
            SValue::LaterArray(entries) => Type::Array {
                elements: entries.iter().map(|e| e.ty()).collect(),
                variadic: false,
            },
            SValue::StagedClosure(_) => Type::Function {
                params: vec![],
                return_type: Box::new(Type::UNKNOWN),
                is_async: false,
            },
        }
    }
}

/// A staged closure: the lambda plus its staged environment.
#[derive(Debug)]
pub struct StagedClosure {
    pub lambda: Lambda,
    pub env: SEnv,
}

#[derive(Debug)]
struct SFrame {
    parent: Option<SEnv>,
    /// A plain value environment backing this frame; names not found in
    /// any staged frame resolve here as `Now` (with lazy forcing).
    base: Option<Env>,
    slots: RefCell<FxHashMap<String, SValue>>,
}

/// A staged environment: persistent linked frames over a comptime base.
#[derive(Debug, Clone)]
pub struct SEnv(Rc<SFrame>);

impl SEnv {
    /// A root staged environment over a comptime value environment.
    pub fn root(base: Env) -> Self {
        SEnv(Rc::new(SFrame {
            parent: None,
            base: Some(base),
            slots: RefCell::new(FxHashMap::default()),
        }))
    }

    /// A child scope.
    pub fn child(&self) -> Self {
        SEnv(Rc::new(SFrame {
            parent: Some(self.clone()),
            base: None,
            slots: RefCell::new(FxHashMap::default()),
        }))
    }

    pub fn define(&self, name: impl Into<String>, value: SValue) {
        self.0.slots.borrow_mut().insert(name.into(), value);
    }

    /// Look up a staged slot, without consulting the comptime bases.
    pub fn lookup_staged(&self, name: &str) -> Option<SValue> {
        let mut frame = self.clone();
        loop {
            if let Some(sv) = frame.0.slots.borrow().get(name) {
                return Some(sv.clone());
            }
            let parent = frame.0.parent.clone()?;
            frame = parent;
        }
    }

    /// The frames' comptime bases, innermost first.
    pub fn bases(&self) -> Vec<Env> {
        let mut out = Vec::new();
        let mut frame = Some(self.clone());
        while let Some(current) = frame {
            if let Some(base) = &current.0.base {
                out.push(base.clone());
            }
            frame = current.0.parent.clone();
        }
        out
    }

    /// Walk frames innermost-out, stopping at the first staged slot or
    /// base environment that knows `name`. A staged slot shadows outer
    /// bases and vice versa, so resolution respects lexical order.
    pub fn resolve(&self, name: &str) -> Option<Resolution> {
        let mut frame = Some(self.clone());
        while let Some(current) = frame {
            if let Some(sv) = current.0.slots.borrow().get(name) {
                return Some(Resolution::Staged(sv.clone()));
            }
            if let Some(base) = &current.0.base
                && base.contains(name)
            {
                return Some(Resolution::Base(base.clone()));
            }
            frame = current.0.parent.clone();
        }
        None
    }
}

/// The result of a staged-environment lookup.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Found in a staged frame.
    Staged(SValue),
    /// Found in a comptime base environment (force via the evaluator).
    Base(Env),
}
