//! Leaves are the units of code of the evaluation tree.
//!
//! A leaf lazily reads its source, compiles it with the backend chosen
//! for it and executes the result, memoising each step in its
//! [`CacheCell`]. The computed value is what other units see when they
//! look the leaf up through a tree view.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use smol_str::SmolStr;
use tracing::{debug, instrument, trace};

use crate::backend::{Backend, Compiled};
use crate::cache::{CacheCell, Slot, Stages};
use crate::directory::Directory;
use crate::errors::{ErrorKind, EvalResult};
use crate::host::Host;
use crate::io::TreeIO;
use crate::node::ParentLink;
use crate::value::Value;
use crate::view::{View, PARENT_KEY, SELF_KEY, UNIT_KEY};

pub struct Leaf {
    name: SmolStr,
    path: Option<PathBuf>,
    link: ParentLink,
    backend: Rc<dyn Backend>,
    io: Rc<dyn TreeIO>,
    cache: CacheCell,
}

impl Leaf {
    /// Create a leaf for the file at `path`, with the backend the host
    /// registered for its extension. If `source` is given it is used
    /// instead of reading the file.
    pub fn new(host: &Host, path: Option<PathBuf>, source: Option<String>) -> Rc<Leaf> {
        let path = path.filter(|p| !p.as_os_str().is_empty());
        let backend = host.backends().select(path.as_deref());
        Self::with_backend(host.io().clone(), backend, path, source)
    }

    pub fn with_backend(
        io: Rc<dyn TreeIO>,
        backend: Rc<dyn Backend>,
        path: Option<PathBuf>,
        source: Option<String>,
    ) -> Rc<Leaf> {
        let name = path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| SmolStr::new(name.to_string_lossy()))
            .unwrap_or_default();

        let cache = match source {
            Some(source) => CacheCell::with_source(Some(source.into())),
            None => CacheCell::new(),
        };

        Rc::new(Leaf {
            name,
            path,
            link: ParentLink::default(),
            backend,
            io,
            cache,
        })
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn dialect(&self) -> &'static str {
        self.backend.dialect()
    }

    pub fn io(&self) -> &Rc<dyn TreeIO> {
        &self.io
    }

    pub(crate) fn link(&self) -> &ParentLink {
        &self.link
    }

    /// Directory containing this leaf. Leaves that were created on
    /// their own have no parent.
    pub fn parent(&self) -> EvalResult<Option<Rc<Directory>>> {
        self.link.get(&self.name)
    }

    /// View of the directory containing this leaf, i.e. what the
    /// leaf's own code sees as `_`.
    pub fn view(&self) -> EvalResult<View> {
        match self.parent()? {
            Some(parent) => View::of_directory(&parent),
            None => Err(ErrorKind::Unconnected {
                name: self.name.clone(),
            }),
        }
    }

    pub fn source(&self) -> EvalResult<Option<Rc<str>>> {
        self.cache.source(self)
    }

    pub fn compiled(&self) -> EvalResult<Option<Compiled>> {
        self.cache.compiled(self)
    }

    /// Compute (or return the memoised) value of this leaf. A leaf
    /// without source has no value.
    #[instrument(level = "debug", skip_all, fields(unit = %self.name, dialect = self.dialect()))]
    pub fn value(&self) -> EvalResult<Option<Value>> {
        self.cache.value(self)
    }

    pub fn set_source<S: Into<Rc<str>>>(&self, source: Option<S>) {
        self.cache.set_source(source.map(Into::into));
    }

    pub fn set_compiled(&self, compiled: Option<Compiled>) {
        self.cache.set_compiled(compiled);
    }

    pub fn set_value(&self, value: Option<Value>) {
        self.cache.set_value(value);
    }

    pub fn is_cached(&self, slot: Slot) -> bool {
        self.cache.is_cached(slot)
    }

    /// Drop the memoised `slot` and everything derived from it.
    pub fn invalidate(&self, slot: Slot) {
        self.cache.invalidate(slot);
    }

    /// Drop everything memoised for this leaf, so that the next read
    /// starts from the file again.
    pub fn refresh(&self) {
        debug!(unit = %self.name, "refreshing leaf");
        self.cache.invalidate(Slot::Source);
    }

    fn identity(&self) -> Value {
        let path = match &self.path {
            Some(path) => Value::from(path.to_string_lossy().as_ref()),
            None => Value::Null,
        };

        Value::attrs_from([
            ("name", Value::String(self.name.clone())),
            ("path", path),
            ("dialect", Value::from(self.dialect())),
        ])
    }

    fn make_context(&self) -> EvalResult<crate::backend::Context> {
        let mut context = self.backend.make_context(self);
        context.bind(UNIT_KEY, self.identity());

        match self.view() {
            Ok(view) => {
                if let Some(parent) = view.parent() {
                    context.bind(PARENT_KEY, Value::View(parent.clone()));
                }
                context.bind(SELF_KEY, Value::View(view));
            }

            // detached leaves are evaluated without tree bindings
            Err(ErrorKind::Unconnected { .. }) => {
                trace!(unit = %self.name, "evaluating leaf outside of a tree");
            }

            Err(err) => return Err(err),
        }

        Ok(context)
    }
}

impl Stages for Leaf {
    fn unit(&self) -> &str {
        &self.name
    }

    fn load(&self) -> EvalResult<Option<Rc<str>>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        trace!(path = %path.display(), "loading source");
        self.io
            .read_to_string(path)
            .map(|source| Some(source.into()))
            .map_err(|err| ErrorKind::io(path, err))
    }

    fn compile(&self, source: &str) -> EvalResult<Compiled> {
        trace!(unit = %self.name, "compiling");
        Ok(self.backend.compile(source, &self.name)?)
    }

    fn execute(&self, compiled: &Compiled) -> EvalResult<Value> {
        let compute = |cause| ErrorKind::Compute {
            unit: self.name.clone(),
            cause: Box::new(cause),
        };

        let mut context = self.make_context().map_err(compute)?;
        let result = self.backend.execute(compiled, &mut context);

        match (result, context.take_error()) {
            (Err(err), _) | (Ok(_), Some(err)) => Err(compute(err)),
            (Ok(value), None) => Ok(value),
        }
    }
}

impl std::fmt::Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leaf")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("dialect", &self.dialect())
            .field("cache", &self.cache)
            .finish()
    }
}
