//! This module implements the runtime representation of values that
//! flow between units of the evaluation tree.
//!
//! All dialects share this representation, which is what allows a
//! unit written in one dialect to consume the value of a unit written
//! in another.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Write};
use std::rc::Rc;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::errors::{ErrorKind, EvalResult};
use crate::view::View;

mod function;
mod json;

pub use function::{Builtin, BuiltinFn, Function};

pub type Attrs = BTreeMap<SmolStr, Value>;

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(SmolStr),
    List(Rc<Vec<Value>>),
    Attrs(Rc<Attrs>),

    /// Live view of a directory of the evaluation tree.
    View(View),
    Function(Rc<dyn Function>),
}

macro_rules! gen_cast {
    ( $name:ident, $type:ty, $expected:expr, $variant:pat, $result:expr ) => {
        pub fn $name(&self) -> EvalResult<$type> {
            match self {
                $variant => Ok($result),
                other => Err(ErrorKind::TypeError {
                    expected: $expected,
                    actual: other.type_of(),
                }),
            }
        }
    };
}

macro_rules! gen_is {
    ( $name:ident, $variant:pat ) => {
        pub fn $name(&self) -> bool {
            matches!(self, $variant)
        }
    };
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }

    pub fn attrs(attrs: Attrs) -> Self {
        Value::Attrs(Rc::new(attrs))
    }

    pub fn attrs_from<K, I>(pairs: I) -> Self
    where
        K: Into<SmolStr>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::attrs(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Attrs(_) => "set",
            Value::View(_) => "view",
            Value::Function(_) => "lambda",
        }
    }

    gen_cast!(as_bool, bool, "bool", Value::Bool(b), *b);
    gen_cast!(as_int, i64, "int", Value::Integer(i), *i);
    gen_cast!(to_str, SmolStr, "string", Value::String(s), s.clone());
    gen_cast!(to_list, Rc<Vec<Value>>, "list", Value::List(l), l.clone());
    gen_cast!(to_attrs, Rc<Attrs>, "set", Value::Attrs(a), a.clone());
    gen_cast!(to_view, View, "view", Value::View(v), v.clone());

    /// Numeric value as a float; integers are widened.
    pub fn as_float(&self) -> EvalResult<f64> {
        match self {
            Value::Integer(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(ErrorKind::TypeError {
                expected: "float",
                actual: other.type_of(),
            }),
        }
    }

    gen_is!(is_null, Value::Null);
    gen_is!(is_number, Value::Integer(_) | Value::Float(_));
    gen_is!(is_function, Value::Function(_));

    /// Returns true if the value is attribute-like, i.e. can be
    /// selected from by name.
    pub fn is_attrs(&self) -> bool {
        matches!(self, Value::Attrs(_) | Value::View(_))
    }

    /// Select an attribute by name. Attribute sets and tree views can
    /// be selected from; a missing attribute is `None`.
    pub fn select(&self, name: &str) -> EvalResult<Option<Value>> {
        match self {
            Value::Attrs(attrs) => Ok(attrs.get(name).cloned()),
            Value::View(view) => view.get(name),
            other => Err(ErrorKind::TypeError {
                expected: "set",
                actual: other.type_of(),
            }),
        }
    }

    /// Like [`Value::select`], but a missing attribute is an error.
    pub fn select_required(&self, name: &str) -> EvalResult<Value> {
        self.select(name)?
            .ok_or_else(|| ErrorKind::AttributeNotFound { name: name.into() })
    }

    /// Names of all attributes of an attribute-like value, in order.
    pub fn attr_names(&self) -> EvalResult<Vec<SmolStr>> {
        match self {
            Value::Attrs(attrs) => Ok(attrs.keys().cloned().collect()),
            Value::View(view) => Ok(view.names()),
            other => Err(ErrorKind::TypeError {
                expected: "set",
                actual: other.type_of(),
            }),
        }
    }

    pub fn call(&self, arg: Value) -> EvalResult<Value> {
        match self {
            Value::Function(function) => function.call(arg),
            other => Err(ErrorKind::NotCallable(other.type_of())),
        }
    }

    /// Coerce a value to a string the way `toString` does it.
    pub fn coerce_to_string(&self) -> EvalResult<SmolStr> {
        match self {
            Value::String(s) => Ok(s.clone()),
            Value::Null => Ok(SmolStr::default()),
            Value::Bool(true) => Ok("1".into()),
            Value::Bool(false) => Ok(SmolStr::default()),
            Value::Integer(i) => Ok(i.to_string().into()),
            Value::Float(f) => Ok(format_float(*f).into()),
            Value::List(items) => {
                let parts = items
                    .iter()
                    .map(Value::coerce_to_string)
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(parts.iter().join(" ").into())
            }
            other => Err(ErrorKind::NotCoercibleToString(other.type_of())),
        }
    }

    /// Structural equality. Integers and floats compare numerically,
    /// views and functions compare by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y)))
            }
            (Value::Attrs(a), Value::Attrs(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter()
                            .zip(b.iter())
                            .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb)))
            }
            (Value::View(a), Value::View(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<SmolStr> for Value {
    fn from(s: SmolStr) -> Self {
        Value::String(s)
    }
}

impl From<View> for Value {
    fn from(view: View) -> Self {
        Value::View(view)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::list(items)
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{}", f)
    } else {
        format!("{:?}", f)
    }
}

fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '\''))
}

/// Write a string literal with the same escapes the nix dialect reads.
fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '$' if chars.peek() == Some(&'{') => f.write_str("\\$")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(true) => f.write_str("true"),
            Value::Bool(false) => f.write_str("false"),
            Value::Integer(num) => write!(f, "{}", num),
            Value::Float(num) => f.write_str(&format_float(*num)),
            Value::String(s) => write_escaped(f, s),

            Value::List(items) => {
                f.write_char('[')?;
                for item in items.iter() {
                    write!(f, " {}", item)?;
                }
                f.write_str(" ]")
            }

            Value::Attrs(attrs) => {
                f.write_char('{')?;
                for (name, value) in attrs.iter() {
                    f.write_char(' ')?;
                    if is_bare_identifier(name) {
                        f.write_str(name)?;
                    } else {
                        write_escaped(f, name)?;
                    }
                    write!(f, " = {};", value)?;
                }
                f.write_str(" }")
            }

            Value::View(view) => write!(f, "<view {}>", view.path().display()),

            Value::Function(function) => match function.name() {
                Some(name) => write!(f, "<<primop {}>>", name),
                None => f.write_str("<lambda>"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_is_nix_like() {
        let value = Value::attrs_from([
            ("a", Value::Integer(1)),
            ("b-c", Value::list(vec![Value::Bool(true), Value::Null])),
            ("with space", Value::from("x\"${y}\n")),
        ]);

        assert_eq!(
            value.to_string(),
            r#"{ a = 1; b-c = [ true null ]; "with space" = "x\"\${y}\n"; }"#
        );
    }

    #[test]
    fn floats_keep_their_kind_when_printed() {
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Float(2.0).to_string(), "2");
    }

    #[test]
    fn numbers_compare_across_kinds() {
        assert!(Value::Integer(2).equals(&Value::Float(2.0)));
        assert!(!Value::Integer(2).equals(&Value::from("2")));
    }

    #[test]
    fn select_on_non_attrs_is_a_type_error() {
        let err = Value::Integer(1).select("a").unwrap_err();
        assert!(matches!(
            err,
            ErrorKind::TypeError {
                expected: "set",
                actual: "int"
            }
        ));
    }

    #[test]
    fn coerce_to_string_joins_lists() {
        let value = Value::list(vec![Value::Integer(1), Value::from("a"), Value::Bool(true)]);
        assert_eq!(value.coerce_to_string().unwrap(), "1 a 1");
    }
}
