//! Pluggable language backends.
//!
//! A backend turns the source text of a unit into an opaque compiled
//! form, and executes that compiled form inside of a [`Context`] that
//! carries the bindings visible to the unit. Leaves pick their backend
//! from the [`Backends`] registry by file extension.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::errors::{CompileError, ErrorKind, EvalResult};
use crate::leaf::Leaf;
use crate::value::Value;

/// Compiled form of a unit, as produced by [`Backend::compile`]. The
/// representation is private to the backend that produced it.
#[derive(Clone)]
pub struct Compiled {
    dialect: &'static str,
    code: Rc<dyn Any>,
}

impl Compiled {
    pub fn new<T: Any>(dialect: &'static str, code: T) -> Self {
        Compiled {
            dialect,
            code: Rc::new(code),
        }
    }

    /// Name of the dialect whose backend produced this.
    pub fn dialect(&self) -> &'static str {
        self.dialect
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.code.downcast_ref::<T>()
    }

    /// Access the compiled code as `T`, failing if it was produced by
    /// a backend other than `expected`.
    pub fn expect<T: Any>(&self, expected: &'static str) -> EvalResult<&T> {
        if self.dialect != expected {
            return Err(ErrorKind::ForeignCompiled {
                expected,
                actual: self.dialect,
            });
        }

        self.downcast_ref::<T>().ok_or(ErrorKind::ForeignCompiled {
            expected,
            actual: self.dialect,
        })
    }
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compiled[{}]", self.dialect)
    }
}

/// Execution environment of a single unit.
///
/// Besides the named bindings, a context carries an out-of-band error
/// slot: a backend may report a failure by storing it there instead of
/// (or in addition to) failing directly. Either way the leaf turns it
/// into a failed evaluation.
#[derive(Debug, Default)]
pub struct Context {
    bindings: BTreeMap<SmolStr, Value>,
    error: Option<ErrorKind>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind<N: Into<SmolStr>>(&mut self, name: N, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn bindings(&self) -> &BTreeMap<SmolStr, Value> {
        &self.bindings
    }

    pub fn set_error(&mut self, error: ErrorKind) {
        self.error = Some(error);
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn take_error(&mut self) -> Option<ErrorKind> {
        self.error.take()
    }
}

pub trait Backend {
    /// Short name of the language this backend implements.
    fn dialect(&self) -> &'static str;

    fn compile(&self, source: &str, unit: &str) -> Result<Compiled, CompileError>;

    /// Produce the execution context for a leaf. Bindings added here
    /// are visible to the unit; the tree bindings (`_`, `__` and
    /// `self`) are added by the leaf afterwards and take precedence.
    fn make_context(&self, _leaf: &Leaf) -> Context {
        Context::new()
    }

    fn execute(&self, compiled: &Compiled, context: &mut Context) -> EvalResult<Value>;
}

/// Backend that treats the source text of a unit as its value.
pub struct TextBackend;

impl Backend for TextBackend {
    fn dialect(&self) -> &'static str {
        "text"
    }

    fn compile(&self, source: &str, _unit: &str) -> Result<Compiled, CompileError> {
        Ok(Compiled::new(self.dialect(), SmolStr::from(source)))
    }

    fn execute(&self, compiled: &Compiled, _context: &mut Context) -> EvalResult<Value> {
        Ok(Value::String(compiled.expect::<SmolStr>(self.dialect())?.clone()))
    }
}

/// Registry mapping file extensions to backends, with a default for
/// everything else.
#[derive(Clone)]
pub struct Backends {
    by_extension: HashMap<SmolStr, Rc<dyn Backend>>,
    default: Rc<dyn Backend>,
}

impl Default for Backends {
    fn default() -> Self {
        Backends::new(Rc::new(TextBackend))
    }
}

impl Backends {
    pub fn new(default: Rc<dyn Backend>) -> Self {
        Backends {
            by_extension: HashMap::new(),
            default,
        }
    }

    /// Register a backend for files ending in `.extension`. The
    /// extension is given without the leading dot.
    pub fn insert<E: Into<SmolStr>>(&mut self, extension: E, backend: Rc<dyn Backend>) {
        self.by_extension.insert(extension.into(), backend);
    }

    pub fn set_default(&mut self, backend: Rc<dyn Backend>) {
        self.default = backend;
    }

    pub fn default_backend(&self) -> &Rc<dyn Backend> {
        &self.default
    }

    /// Pick the backend for a unit at `path`. Units without a path or
    /// without a registered extension use the default backend.
    pub fn select(&self, path: Option<&Path>) -> Rc<dyn Backend> {
        path.and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(ext))
            .unwrap_or(&self.default)
            .clone()
    }

    /// Find any registered backend by its dialect name.
    pub fn by_dialect(&self, dialect: &str) -> Option<Rc<dyn Backend>> {
        std::iter::once(&self.default)
            .chain(self.by_extension.values())
            .find(|backend| backend.dialect() == dialect)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl Backend for Named {
        fn dialect(&self) -> &'static str {
            self.0
        }

        fn compile(&self, _: &str, _: &str) -> Result<Compiled, CompileError> {
            Ok(Compiled::new(self.0, ()))
        }

        fn execute(&self, _: &Compiled, _: &mut Context) -> EvalResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn select_by_extension_with_default_fallback() {
        let mut backends = Backends::new(Rc::new(Named("fallback")));
        backends.insert("nix", Rc::new(Named("nix")));

        let select = |p: Option<&str>| backends.select(p.map(Path::new)).dialect();
        assert_eq!(select(Some("/a/b.nix")), "nix");
        assert_eq!(select(Some("/a/b.nix.bak")), "fallback");
        assert_eq!(select(Some("/a/b")), "fallback");
        assert_eq!(select(None), "fallback");

        assert!(backends.by_dialect("nix").is_some());
        assert!(backends.by_dialect("lua").is_none());
    }

    #[test]
    fn text_backend_rejects_foreign_code() {
        let compiled = Compiled::new("nix", 12_i64);
        let err = TextBackend
            .execute(&compiled, &mut Context::new())
            .unwrap_err();

        assert!(matches!(
            err,
            ErrorKind::ForeignCompiled {
                expected: "text",
                actual: "nix"
            }
        ));
    }
}
