//! Tree-walking interpreter for the nix dialect.
//!
//! Scopes are chains of [`Env`]s. Bindings of `let` expressions,
//! recursive sets and function arguments are [`Thunk`]s, which are
//! evaluated on first use and memoised afterwards. Everything that
//! leaves the interpreter (attribute sets, lists, function results) is
//! a fully evaluated [`Value`].

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use glagol_eval::{Attrs, ErrorKind, EvalResult, Function, Value};
use smol_str::SmolStr;

use super::ir::{AttrKey, BinaryOp, Bindings, Ir, Lambda, Param, StrPart, UnaryOp};
use super::NixError;

/// Maximum nesting of function calls and imports before evaluation is
/// aborted instead of overflowing the stack.
const MAX_CALL_DEPTH: usize = 500;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

pub(crate) struct DepthGuard;

impl DepthGuard {
    pub(crate) fn enter() -> EvalResult<DepthGuard> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= MAX_CALL_DEPTH {
                return Err(NixError::CallDepthExceeded(MAX_CALL_DEPTH).into());
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

enum ThunkRepr {
    /// Code that has not been evaluated yet.
    Suspended { ir: Rc<Ir>, env: Rc<Env> },

    /// The thunk is currently being evaluated; forcing it again means
    /// that it depends on itself.
    Blackhole,

    Evaluated(Value),
}

#[derive(Clone)]
pub(crate) struct Thunk(Rc<RefCell<ThunkRepr>>);

impl Thunk {
    pub(crate) fn suspended(ir: Rc<Ir>, env: Rc<Env>) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkRepr::Suspended { ir, env })))
    }

    pub(crate) fn evaluated(value: Value) -> Self {
        Thunk(Rc::new(RefCell::new(ThunkRepr::Evaluated(value))))
    }

    pub(crate) fn force(&self) -> EvalResult<Value> {
        if let ThunkRepr::Evaluated(value) = &*self.0.borrow() {
            return Ok(value.clone());
        }

        let repr = std::mem::replace(&mut *self.0.borrow_mut(), ThunkRepr::Blackhole);
        match repr {
            ThunkRepr::Evaluated(value) => {
                *self.0.borrow_mut() = ThunkRepr::Evaluated(value.clone());
                Ok(value)
            }

            ThunkRepr::Blackhole => Err(ErrorKind::InfiniteRecursion),

            ThunkRepr::Suspended { ir, env } => match eval(&ir, &env) {
                Ok(value) => {
                    *self.0.borrow_mut() = ThunkRepr::Evaluated(value.clone());
                    Ok(value)
                }

                // forcing a failed thunk again re-runs its code
                Err(err) => {
                    *self.0.borrow_mut() = ThunkRepr::Suspended { ir, env };
                    Err(err)
                }
            },
        }
    }
}

enum Scope {
    Vars(RefCell<HashMap<SmolStr, Thunk>>),

    /// Namespace of a `with` expression. It is only consulted for
    /// names that are not bound lexically.
    With(Thunk),
}

pub(crate) struct Env {
    parent: Option<Rc<Env>>,
    scope: Scope,
}

impl Env {
    /// Outermost scope, holding the bindings of a unit's context.
    pub(crate) fn globals<'a, I>(bindings: I) -> Rc<Env>
    where
        I: IntoIterator<Item = (&'a SmolStr, &'a Value)>,
    {
        let vars = bindings
            .into_iter()
            .map(|(name, value)| (name.clone(), Thunk::evaluated(value.clone())))
            .collect();

        Rc::new(Env {
            parent: None,
            scope: Scope::Vars(RefCell::new(vars)),
        })
    }

    fn vars(parent: &Rc<Env>) -> Rc<Env> {
        Rc::new(Env {
            parent: Some(parent.clone()),
            scope: Scope::Vars(RefCell::default()),
        })
    }

    fn with(parent: &Rc<Env>, namespace: Thunk) -> Rc<Env> {
        Rc::new(Env {
            parent: Some(parent.clone()),
            scope: Scope::With(namespace),
        })
    }

    fn define(&self, name: SmolStr, thunk: Thunk) {
        if let Scope::Vars(vars) = &self.scope {
            vars.borrow_mut().insert(name, thunk);
        }
    }

    fn lookup(self: &Rc<Self>, name: &str) -> EvalResult<Value> {
        let mut namespaces = vec![];
        let mut current = Some(self);

        while let Some(env) = current {
            match &env.scope {
                Scope::Vars(vars) => {
                    let found = vars.borrow().get(name).cloned();
                    if let Some(thunk) = found {
                        return thunk.force();
                    }
                }
                Scope::With(namespace) => namespaces.push(namespace),
            }
            current = env.parent.as_ref();
        }

        for namespace in namespaces {
            if let Some(value) = namespace.force()?.select(name)? {
                return Ok(value);
            }
        }

        Err(ErrorKind::UnknownVariable(name.into()))
    }
}

/// A lambda together with the scope it was created in.
pub(crate) struct Closure {
    lambda: Rc<Lambda>,
    env: Rc<Env>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<lambda>")
    }
}

impl Function for Closure {
    fn call(&self, arg: Value) -> EvalResult<Value> {
        let _guard = DepthGuard::enter()?;
        let scope = Env::vars(&self.env);

        match &self.lambda.param {
            Param::Ident(name) => scope.define(name.clone(), Thunk::evaluated(arg)),

            Param::Pattern {
                entries,
                ellipsis,
                bind,
            } => {
                if !arg.is_attrs() {
                    return Err(ErrorKind::TypeError {
                        expected: "set",
                        actual: arg.type_of(),
                    });
                }

                if !ellipsis {
                    for name in arg.attr_names()? {
                        if !entries.iter().any(|(entry, _)| *entry == name) {
                            return Err(NixError::UnexpectedArgument(name).into());
                        }
                    }
                }

                for (name, default) in entries {
                    let thunk = match (arg.select(name)?, default) {
                        (Some(value), _) => Thunk::evaluated(value),
                        (None, Some(default)) => Thunk::suspended(default.clone(), scope.clone()),
                        (None, None) => return Err(NixError::MissingArgument(name.clone()).into()),
                    };
                    scope.define(name.clone(), thunk);
                }

                if let Some(bind) = bind {
                    scope.define(bind.clone(), Thunk::evaluated(arg));
                }
            }
        }

        eval(&self.lambda.body, &scope)
    }
}

pub(crate) fn eval(ir: &Ir, env: &Rc<Env>) -> EvalResult<Value> {
    match ir {
        Ir::Literal(value) => Ok(value.clone()),

        Ir::Str(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    StrPart::Literal(lit) => out.push_str(lit),
                    StrPart::Interpolation(ir) => match eval(ir, env)? {
                        Value::String(s) => out.push_str(&s),
                        other => return Err(ErrorKind::NotCoercibleToString(other.type_of())),
                    },
                }
            }
            Ok(Value::from(out))
        }

        Ir::Ident(name) => env.lookup(name),

        Ir::List(items) => Ok(Value::list(
            items
                .iter()
                .map(|item| eval(item, env))
                .collect::<EvalResult<_>>()?,
        )),

        Ir::Attrs {
            recursive,
            bindings,
        } => eval_attrs(*recursive, bindings, env),

        Ir::Let { bindings, body } => {
            let scope = bind_recursive(bindings, env);
            eval(body, &scope)
        }

        Ir::With { namespace, body } => {
            let scope = Env::with(env, Thunk::suspended(namespace.clone(), env.clone()));
            eval(body, &scope)
        }

        Ir::If {
            condition,
            then,
            otherwise,
        } => {
            if eval(condition, env)?.as_bool()? {
                eval(then, env)
            } else {
                eval(otherwise, env)
            }
        }

        Ir::Assert { condition, body } => {
            if eval(condition, env)?.as_bool()? {
                eval(body, env)
            } else {
                Err(ErrorKind::AssertionFailed)
            }
        }

        Ir::Lambda(lambda) => Ok(Value::Function(Rc::new(Closure {
            lambda: lambda.clone(),
            env: env.clone(),
        }))),

        Ir::Apply { function, argument } => {
            let function = eval(function, env)?;
            let argument = eval(argument, env)?;
            function.call(argument)
        }

        Ir::Select {
            target,
            path,
            default,
        } => {
            let mut current = eval(target, env)?;
            for key in path {
                let name = attr_name(key, env)?;
                let next = match default {
                    Some(_) if !current.is_attrs() => None,
                    _ => current.select(&name)?,
                };

                current = match (next, default) {
                    (Some(value), _) => value,
                    (None, Some(default)) => return eval(default, env),
                    (None, None) => return Err(ErrorKind::AttributeNotFound { name }),
                };
            }
            Ok(current)
        }

        Ir::HasAttr { target, path } => {
            let mut current = eval(target, env)?;
            for key in path {
                if !current.is_attrs() {
                    return Ok(Value::Bool(false));
                }
                match current.select(&attr_name(key, env)?)? {
                    Some(value) => current = value,
                    None => return Ok(Value::Bool(false)),
                }
            }
            Ok(Value::Bool(true))
        }

        Ir::Unary { op, operand } => {
            let value = eval(operand, env)?;
            match (op, value) {
                (UnaryOp::Not, value) => Ok(Value::Bool(!value.as_bool()?)),
                (UnaryOp::Negate, Value::Integer(i)) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| NixError::Overflow.into()),
                (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
                (UnaryOp::Negate, other) => Err(ErrorKind::TypeError {
                    expected: "int",
                    actual: other.type_of(),
                }),
            }
        }

        Ir::Binary { op, lhs, rhs } => match op {
            BinaryOp::And => {
                if !eval(lhs, env)?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(eval(rhs, env)?.as_bool()?))
            }

            BinaryOp::Or => {
                if eval(lhs, env)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(eval(rhs, env)?.as_bool()?))
            }

            BinaryOp::Implication => {
                if !eval(lhs, env)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(eval(rhs, env)?.as_bool()?))
            }

            op => binary(*op, eval(lhs, env)?, eval(rhs, env)?),
        },
    }
}

fn attr_name(key: &AttrKey, env: &Rc<Env>) -> EvalResult<SmolStr> {
    match key {
        AttrKey::Static(name) => Ok(name.clone()),
        AttrKey::Dynamic(ir) => eval(ir, env)?.to_str(),
    }
}

/// Create the scope of a `let` expression or recursive set, in which
/// every binding can refer to every other.
fn bind_recursive(bindings: &Bindings, env: &Rc<Env>) -> Rc<Env> {
    let scope = Env::vars(env);
    for (name, binding) in &bindings.entries {
        let binding_env = if binding.outer { env } else { &scope };
        scope.define(
            name.clone(),
            Thunk::suspended(binding.value.clone(), binding_env.clone()),
        );
    }
    scope
}

fn eval_attrs(recursive: bool, bindings: &Bindings, env: &Rc<Env>) -> EvalResult<Value> {
    let scope = if recursive {
        bind_recursive(bindings, env)
    } else {
        env.clone()
    };

    let mut attrs = Attrs::new();
    for (name, binding) in &bindings.entries {
        let value = if recursive {
            scope.lookup(name)?
        } else {
            eval(&binding.value, env)?
        };
        attrs.insert(name.clone(), value);
    }

    for (key, value) in &bindings.dynamic {
        let key = eval(key, &scope)?;

        // a null name omits the attribute
        if key.is_null() {
            continue;
        }

        let name = key.to_str()?;
        if attrs.contains_key(&name) {
            return Err(NixError::DuplicateAttribute(name).into());
        }
        attrs.insert(name, eval(value, &scope)?);
    }

    Ok(Value::attrs(attrs))
}

/// Materialise an attribute-like value. Views are forced entirely.
pub(crate) fn attrs_of(value: &Value) -> EvalResult<Attrs> {
    match value {
        Value::Attrs(attrs) => Ok((**attrs).clone()),
        Value::View(view) => {
            let mut attrs = Attrs::new();
            for name in view.names() {
                let value = view.get(&name)?.unwrap_or(Value::Null);
                attrs.insert(name, value);
            }
            Ok(attrs)
        }
        other => Err(ErrorKind::TypeError {
            expected: "set",
            actual: other.type_of(),
        }),
    }
}

fn invalid(op: &'static str, lhs: &Value, rhs: &Value) -> ErrorKind {
    NixError::InvalidOperands {
        op,
        lhs: lhs.type_of(),
        rhs: rhs.type_of(),
    }
    .into()
}

fn arithmetic(
    op: &'static str,
    lhs: Value,
    rhs: Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    match (&lhs, &rhs) {
        (Value::Integer(a), Value::Integer(b)) => int(*a, *b)
            .map(Value::Integer)
            .ok_or_else(|| NixError::Overflow.into()),
        (a, b) if a.is_number() && b.is_number() => Ok(Value::Float(float(a.as_float()?, b.as_float()?))),
        _ => Err(invalid(op, &lhs, &rhs)),
    }
}

/// Order two values. Comparisons involving NaN have no ordering and
/// are false.
fn compare(lhs: &Value, rhs: &Value) -> EvalResult<Option<Ordering>> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Some(a.cmp(b))),
        (a, b) if a.is_number() && b.is_number() => Ok(a.as_float()?.partial_cmp(&b.as_float()?)),
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        _ => Err(invalid("<", lhs, rhs)),
    }
}

/// Apply a strict binary operator to two evaluated operands.
pub(crate) fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Add => match (&lhs, &rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::from(format!("{}{}", a, b))),
            _ => arithmetic("+", lhs, rhs, i64::checked_add, |a, b| a + b),
        },
        BinaryOp::Sub => arithmetic("-", lhs, rhs, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic("*", lhs, rhs, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => {
            if rhs.is_number() && rhs.as_float()? == 0.0 {
                return Err(ErrorKind::DivisionByZero);
            }
            arithmetic("/", lhs, rhs, i64::checked_div, |a, b| a / b)
        }

        BinaryOp::Equal => Ok(Value::Bool(lhs.equals(&rhs))),
        BinaryOp::NotEqual => Ok(Value::Bool(!lhs.equals(&rhs))),
        BinaryOp::Less => Ok(Value::Bool(matches!(
            compare(&lhs, &rhs)?,
            Some(Ordering::Less)
        ))),
        BinaryOp::LessOrEq => Ok(Value::Bool(matches!(
            compare(&lhs, &rhs)?,
            Some(Ordering::Less | Ordering::Equal)
        ))),
        BinaryOp::More => Ok(Value::Bool(matches!(
            compare(&lhs, &rhs)?,
            Some(Ordering::Greater)
        ))),
        BinaryOp::MoreOrEq => Ok(Value::Bool(matches!(
            compare(&lhs, &rhs)?,
            Some(Ordering::Greater | Ordering::Equal)
        ))),

        BinaryOp::And => Ok(Value::Bool(lhs.as_bool()? && rhs.as_bool()?)),
        BinaryOp::Or => Ok(Value::Bool(lhs.as_bool()? || rhs.as_bool()?)),
        BinaryOp::Implication => Ok(Value::Bool(!lhs.as_bool()? || rhs.as_bool()?)),

        BinaryOp::Concat => {
            let mut items = lhs.to_list()?.as_ref().clone();
            items.extend(rhs.to_list()?.iter().cloned());
            Ok(Value::list(items))
        }

        BinaryOp::Update => {
            let mut attrs = attrs_of(&lhs)?;
            attrs.extend(attrs_of(&rhs)?);
            Ok(Value::attrs(attrs))
        }
    }
}
