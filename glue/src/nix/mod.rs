//! The `nix` dialect: a pure subset of the Nix expression language.
//!
//! Units are parsed with rnix, lowered into an owned intermediate
//! representation when they are compiled, and executed by a
//! tree-walking interpreter. Relative path literals address the
//! evaluation tree, so `./a/b` reads the value of the unit `b` in the
//! subdirectory `a` next to the current unit.

use std::rc::Rc;

use glagol_eval::{Backend, CompileError, Compiled, Context, ErrorKind, EvalResult, Leaf, Value};
use smol_str::SmolStr;
use tracing::trace;

mod builtins;
mod interp;
mod ir;
mod lower;

use interp::Env;
use ir::Ir;

pub const DIALECT: &str = "nix";

/// Failures specific to the nix dialect. They reach callers wrapped in
/// [`ErrorKind::Native`].
#[derive(Debug, thiserror::Error)]
pub enum NixError {
    #[error("function called with unexpected argument '{0}'")]
    UnexpectedArgument(SmolStr),

    #[error("function called without required argument '{0}'")]
    MissingArgument(SmolStr),

    #[error("attribute '{0}' is already defined")]
    DuplicateAttribute(SmolStr),

    #[error("cannot apply '{op}' to a '{lhs}' and a '{rhs}'")]
    InvalidOperands {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("integer overflow")]
    Overflow,

    #[error("function calls nested deeper than {0} levels")]
    CallDepthExceeded(usize),
}

impl From<NixError> for ErrorKind {
    fn from(err: NixError) -> Self {
        ErrorKind::Native(Rc::new(err))
    }
}

#[derive(Debug, Default)]
pub struct NixBackend;

impl Backend for NixBackend {
    fn dialect(&self) -> &'static str {
        DIALECT
    }

    fn compile(&self, source: &str, unit: &str) -> Result<Compiled, CompileError> {
        let ir: Rc<Ir> = lower::compile(source, unit)?;
        Ok(Compiled::new(DIALECT, ir))
    }

    fn make_context(&self, leaf: &Leaf) -> Context {
        builtins::context_for(leaf)
    }

    /// Failures of the unit's code are reported through the context,
    /// like an exception caught around the whole unit.
    fn execute(&self, compiled: &Compiled, context: &mut Context) -> EvalResult<Value> {
        let ir = compiled.expect::<Rc<Ir>>(DIALECT)?;
        let env = Env::globals(context.bindings());

        match interp::eval(ir, &env) {
            Ok(value) => Ok(value),
            Err(err) => {
                trace!(error = %err, "nix evaluation failed");
                context.set_error(err);
                Ok(Value::Null)
            }
        }
    }
}
