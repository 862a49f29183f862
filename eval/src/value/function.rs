//! Runtime representation of callable values.
//!
//! Every dialect brings its own notion of a function, but values flow
//! freely between leaves of different dialects through tree views. The
//! [`Function`] trait is the common denominator: anything that can be
//! applied to a single argument.

use std::fmt::{Debug, Display};
use std::rc::Rc;

use crate::errors::EvalResult;

use super::Value;

pub trait Function: Debug {
    /// Apply the function to one argument. Functions of multiple
    /// arguments are curried.
    fn call(&self, arg: Value) -> EvalResult<Value>;

    /// Name under which the function is printed, if it has one.
    fn name(&self) -> Option<&str> {
        None
    }
}

pub type BuiltinFn = Rc<dyn Fn(Vec<Value>) -> EvalResult<Value>>;

/// Represents a single built-in function which directly executes Rust
/// code that operates on values.
///
/// Builtins have varying arities (for example, `hasAttr` has an arity
/// of 2, but `isAttrs` an arity of 1). To facilitate this generically,
/// builtins expect to be called with a vector of values corresponding
/// to their arguments in order.
///
/// Partially applied builtins act similar to closures in that they
/// "capture" the partially applied arguments.
#[derive(Clone)]
pub struct Builtin {
    name: &'static str,
    arity: usize,
    func: BuiltinFn,

    // Partially applied function arguments.
    partials: Vec<Value>,
}

impl Builtin {
    pub fn new<F>(name: &'static str, arity: usize, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> EvalResult<Value> + 'static,
    {
        Builtin {
            name,
            arity,
            func: Rc::new(func),
            partials: vec![],
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Apply an additional argument to the builtin, which will either
    /// lead to execution of the function or to returning a partial
    /// builtin.
    pub fn apply(&self, arg: Value) -> EvalResult<Value> {
        let mut partials = self.partials.clone();
        partials.push(arg);

        if partials.len() >= self.arity {
            return (self.func)(partials);
        }

        // Function is not yet ready to be called.
        Ok(Value::Function(Rc::new(Builtin {
            name: self.name,
            arity: self.arity,
            func: self.func.clone(),
            partials,
        })))
    }
}

impl Function for Builtin {
    fn call(&self, arg: Value) -> EvalResult<Value> {
        self.apply(arg)
    }

    fn name(&self) -> Option<&str> {
        Some(self.name)
    }
}

impl Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "builtin[{}]", self.name)
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.partials.is_empty() {
            f.write_str("<<primop-app>>")
        } else {
            f.write_str("<<primop>>")
        }
    }
}

impl From<Builtin> for Value {
    fn from(builtin: Builtin) -> Self {
        Value::Function(Rc::new(builtin))
    }
}
