//! Persistent environments.
//!
//! An environment is a linked chain of frames; extending a scope creates a
//! child frame and never mutates the parent. Bindings are either already
//! evaluated or lazy (`Unevaluated`), memoized on first force. Cycle
//! detection during a force is explicit: a binding observed mid-force
//! reports `CyclicBinding` instead of overflowing the stack.

use crate::value::TypedValue;
use dtz_ast::Expr;
use dtz_solver::Type;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A binding: evaluated, lazy, or currently being forced.
#[derive(Debug, Clone)]
pub enum Binding {
    Evaluated(TypedValue),
    Unevaluated {
        expr: Rc<Expr>,
        env: Env,
        ty: Option<Type>,
    },
    /// Placeholder installed while an `Unevaluated` binding is forced.
    Forcing,
}

#[derive(Debug)]
struct Frame {
    parent: Option<Env>,
    slots: RefCell<FxHashMap<String, Binding>>,
}

/// A persistent environment handle. Cloning is cheap (`Rc`).
#[derive(Debug, Clone)]
pub struct Env(Rc<Frame>);

impl Env {
    /// A fresh root environment.
    pub fn new() -> Self {
        Env(Rc::new(Frame {
            parent: None,
            slots: RefCell::new(FxHashMap::default()),
        }))
    }

    /// A child scope extending this one.
    pub fn child(&self) -> Self {
        Env(Rc::new(Frame {
            parent: Some(self.clone()),
            slots: RefCell::new(FxHashMap::default()),
        }))
    }

    /// Define (or shadow) a binding in this frame.
    pub fn define(&self, name: impl Into<String>, binding: Binding) {
        self.0.slots.borrow_mut().insert(name.into(), binding);
    }

    pub fn define_value(&self, name: impl Into<String>, value: TypedValue) {
        self.define(name, Binding::Evaluated(value));
    }

    /// Look up a binding, walking parent frames. Returns a clone of the
    /// binding and the environment that owns it (for memoization).
    pub fn lookup(&self, name: &str) -> Option<(Binding, Env)> {
        let mut frame = self.clone();
        loop {
            if let Some(binding) = frame.0.slots.borrow().get(name) {
                return Some((binding.clone(), frame.clone()));
            }
            let parent = frame.0.parent.clone()?;
            frame = parent;
        }
    }

    /// Whether the name is bound anywhere in scope.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Replace a binding in the frame that owns it (memoization and the
    /// forcing marker go through this).
    pub fn replace(&self, name: &str, binding: Binding) {
        self.0.slots.borrow_mut().insert(name.to_string(), binding);
    }

    /// Names defined directly in this frame.
    pub fn local_names(&self) -> Vec<String> {
        self.0.slots.borrow().keys().cloned().collect()
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{TypedValue, Value};
    use dtz_solver::Type;

    fn int(n: i64) -> TypedValue {
        TypedValue::new(Value::Int(n), Type::INT)
    }

    #[test]
    fn child_extension_does_not_mutate_parent() {
        let parent = Env::new();
        parent.define_value("x", int(1));
        let child = parent.child();
        child.define_value("x", int(2));

        let (Binding::Evaluated(in_child), _) = child.lookup("x").unwrap() else {
            panic!("expected evaluated binding");
        };
        let (Binding::Evaluated(in_parent), _) = parent.lookup("x").unwrap() else {
            panic!("expected evaluated binding");
        };
        assert!(matches!(in_child.value, Value::Int(2)));
        assert!(matches!(in_parent.value, Value::Int(1)));
    }

    #[test]
    fn lookup_walks_to_parent() {
        let parent = Env::new();
        parent.define_value("y", int(7));
        let child = parent.child();
        assert!(child.lookup("y").is_some());
        assert!(child.lookup("z").is_none());
    }
}
