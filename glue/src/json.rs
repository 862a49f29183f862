//! Backend for units containing plain JSON documents.

use glagol_eval::{Backend, CompileError, Compiled, Context, EvalResult, Value};

pub const DIALECT: &str = "json";

#[derive(Debug, Default)]
pub struct JsonBackend;

impl Backend for JsonBackend {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    /// Parsing happens at compile time, so that syntax errors are
    /// reported like those of any other dialect.
    fn compile(&self, source: &str, unit: &str) -> Result<Compiled, CompileError> {
        match serde_json::from_str::<serde_json::Value>(source) {
            Ok(json) => Ok(Compiled::new(DIALECT, Value::from_json(json))),
            Err(err) => Err(CompileError::new(DIALECT, unit, err.to_string())
                .with_location(err.line(), err.column())),
        }
    }

    fn execute(&self, compiled: &Compiled, _context: &mut Context) -> EvalResult<Value> {
        Ok(compiled.expect::<Value>(DIALECT)?.clone())
    }
}
