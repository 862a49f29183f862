//! Tests of the evaluation tree, using a small line-oriented mock
//! dialect and fixture directories on disk.

use std::cell::Cell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use tempfile::TempDir;

use crate::{
    Backend, CompileError, Compiled, Context, Directory, ErrorKind, EvalResult, Host,
    HostBuilder, Node, QueueWatchIO, StdIO, Value, SELF_KEY, UNIT_KEY,
};

mod views;
mod watching;

/// Code of the mock dialect. A unit consists of a single statement.
#[derive(Debug)]
enum Mock {
    /// `42`
    Literal(i64),
    /// `ref ../d1/n11` resolves a path through the tree view.
    Ref(String),
    /// `sum a b/c ...` adds up the values behind several paths.
    Sum(Vec<String>),
    /// `throw msg` fails directly.
    Throw(String),
    /// `report msg` fails through the context's error slot.
    Report(String),
    /// `scope` returns the view bound as `_`, or null.
    Scope,
    /// `unit` returns the unit's identity.
    Unit,
}

#[derive(Default)]
pub(crate) struct MockBackend {
    pub executions: Cell<usize>,
}

fn resolve(context: &Context, path: &str) -> EvalResult<Value> {
    let mut current = context
        .get(SELF_KEY)
        .cloned()
        .ok_or_else(|| ErrorKind::UnknownVariable(SELF_KEY.into()))?;

    for segment in path.split('/') {
        current = match segment {
            "" | "." => current,
            ".." => current.select_required("__")?,
            name => current.select_required(name)?,
        };
    }

    Ok(current)
}

impl Backend for MockBackend {
    fn dialect(&self) -> &'static str {
        "mock"
    }

    fn compile(&self, source: &str, unit: &str) -> Result<Compiled, CompileError> {
        let source = source.trim();
        let (head, rest) = source.split_once(' ').unwrap_or((source, ""));

        let code = match head {
            "ref" => Mock::Ref(rest.to_owned()),
            "sum" => Mock::Sum(rest.split_whitespace().map(str::to_owned).collect()),
            "throw" => Mock::Throw(rest.to_owned()),
            "report" => Mock::Report(rest.to_owned()),
            "scope" => Mock::Scope,
            "unit" => Mock::Unit,
            number => match number.parse() {
                Ok(number) => Mock::Literal(number),
                Err(_) => {
                    return Err(CompileError::new(self.dialect(), unit, "unexpected token")
                        .with_span(source, 0, number.len() as u32))
                }
            },
        };

        Ok(Compiled::new(self.dialect(), code))
    }

    fn execute(&self, compiled: &Compiled, context: &mut Context) -> EvalResult<Value> {
        self.executions.set(self.executions.get() + 1);

        match compiled.expect::<Mock>(self.dialect())? {
            Mock::Literal(number) => Ok(Value::Integer(*number)),
            Mock::Ref(path) => resolve(context, path),
            Mock::Sum(paths) => {
                let mut sum = 0;
                for path in paths {
                    sum += resolve(context, path)?.as_int()?;
                }
                Ok(Value::Integer(sum))
            }
            Mock::Throw(msg) => Err(ErrorKind::Throw(msg.clone())),
            Mock::Report(msg) => {
                context.set_error(ErrorKind::Throw(msg.clone()));
                Ok(Value::Null)
            }
            Mock::Scope => Ok(context.get(SELF_KEY).cloned().unwrap_or(Value::Null)),
            Mock::Unit => Ok(context.get(UNIT_KEY).cloned().unwrap_or(Value::Null)),
        }
    }
}

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub host: Rc<Host>,
    pub backend: Rc<MockBackend>,
    pub watch: Rc<QueueWatchIO>,
}

impl Fixture {
    /// Build the standard fixture tree:
    ///
    /// ```text
    /// d1/d11/n111
    /// d1/d12/n121
    /// d1/d12/n122
    /// d1/n11
    /// d2/n21
    /// d3/
    /// n1
    /// n2
    /// ```
    pub fn new() -> Self {
        let fixture = Self::empty();
        let files = [
            ("n1", "1"),
            ("n2", "sum n1 d1/n11"),
            ("d1/n11", "11"),
            ("d1/d11/n111", "ref ../../n1"),
            ("d1/d12/n121", "121"),
            ("d1/d12/n122", "sum n121 ../n11"),
            ("d2/n21", "ref ../d1/d12/n122"),
        ];

        for (path, contents) in files {
            fixture.write(path, contents);
        }
        fs::create_dir_all(fixture.path("d3")).unwrap();

        fixture
    }

    pub fn empty() -> Self {
        let backend = Rc::new(MockBackend::default());
        let watch = Rc::new(QueueWatchIO::new());
        let host = HostBuilder::new(Rc::new(StdIO))
            .default_backend(backend.clone())
            .watch_with(watch.clone())
            .build();

        Fixture {
            dir: tempfile::tempdir().unwrap(),
            host,
            backend,
            watch,
        }
    }

    pub fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    pub fn open(&self) -> Rc<Directory> {
        self.host.open(self.dir.path()).unwrap()
    }
}

/// Value of the leaf at `rel` below `root`.
pub(crate) fn value_at(root: &Rc<Directory>, rel: &str) -> EvalResult<Value> {
    let node = Node::Directory(root.clone()).descend(rel)?;
    Ok(node.value()?.unwrap_or(Value::Null))
}

pub(crate) fn int_at(root: &Rc<Directory>, rel: &str) -> i64 {
    value_at(root, rel).unwrap().as_int().unwrap()
}

/// Relative paths of all nodes below `dir`, directories with a
/// trailing slash.
pub(crate) fn shape(dir: &Directory, prefix: &Path) -> Vec<String> {
    let mut out = vec![];
    for node in dir.children() {
        let rel = prefix.join(node.name().as_str());
        match &node {
            Node::Leaf(_) => out.push(rel.display().to_string()),
            Node::Directory(sub) => {
                out.push(format!("{}/", rel.display()));
                out.extend(shape(sub, &rel));
            }
        }
    }
    out
}
