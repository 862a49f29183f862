//! Conversion of values from and to JSON.
//!
//! Serialising a tree view forces every unit below it, so converting
//! a directory view to JSON evaluates the whole subtree.

use serde_json::Value as Json; // name clash with *our* `Value`
use serde_json::{Map, Number};

use super::Value;
use crate::errors::{ErrorKind, EvalResult};

impl Value {
    pub fn to_json(&self) -> EvalResult<Json> {
        let value = match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Integer(i) => Json::Number(Number::from(*i)),
            // non-finite floats have no JSON representation and become null
            Value::Float(f) => Json::from(*f),
            Value::String(s) => Json::String(s.to_string()),

            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items.iter() {
                    out.push(item.to_json()?);
                }
                Json::Array(out)
            }

            Value::Attrs(attrs) => {
                let mut out = Map::with_capacity(attrs.len());
                for (name, value) in attrs.iter() {
                    out.insert(name.to_string(), value.to_json()?);
                }
                Json::Object(out)
            }

            Value::View(view) => {
                let mut out = Map::new();
                for name in view.names() {
                    let value = view.get(&name)?.unwrap_or(Value::Null);
                    out.insert(name.to_string(), value.to_json()?);
                }
                Json::Object(out)
            }

            Value::Function(_) => return Err(ErrorKind::NotSerialisable(self.type_of())),
        };

        Ok(value)
    }

    pub fn from_json(json: Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.into()),
            Json::Array(items) => Value::list(items.into_iter().map(Value::from_json).collect()),
            Json::Object(fields) => Value::attrs(
                fields
                    .into_iter()
                    .map(|(name, value)| (name.into(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Parse a JSON document into a value.
    pub fn parse_json(text: &str) -> EvalResult<Value> {
        serde_json::from_str::<Json>(text)
            .map(Value::from_json)
            .map_err(|err| ErrorKind::InvalidJson(err.to_string()))
    }
}
