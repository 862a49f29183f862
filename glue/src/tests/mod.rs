//! Tests of the standard backends, evaluated inside of real trees.

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use glagol_eval::{Directory, EvalResult, Host, Node, QueueWatchIO, StdIO, Value};
use tempfile::TempDir;

use crate::standard_host;

mod watch;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub host: Rc<Host>,
    pub watch: Rc<QueueWatchIO>,
}

impl Fixture {
    /// The standard fixture tree, written in the nix dialect.
    pub fn new() -> Self {
        let fixture = Self::empty();
        let files = [
            ("n1", "1"),
            ("n2", "./n1 + ./d1/n11"),
            ("d1/n11", "11"),
            ("d1/d11/n111", "../../n1"),
            ("d1/d12/n121", "121"),
            ("d1/d12/n122", "./n121 + ../n11"),
            ("d2/n21", "../d1/d12/n122"),
        ];

        for (path, contents) in files {
            fixture.write(path, contents);
        }
        fs::create_dir_all(fixture.path("d3")).unwrap();

        fixture
    }

    pub fn empty() -> Self {
        let watch = Rc::new(QueueWatchIO::new());
        let host = standard_host(Rc::new(StdIO))
            .watch_with(watch.clone())
            .build();

        Fixture {
            dir: tempfile::tempdir().unwrap(),
            host,
            watch,
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
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

pub(crate) fn value_at(root: &Rc<Directory>, rel: &str) -> EvalResult<Value> {
    let node = Node::Directory(root.clone()).descend(rel)?;
    Ok(node.value()?.unwrap_or(Value::Null))
}

/// Evaluate a standalone nix unit.
pub(crate) fn eval(code: &str) -> EvalResult<Value> {
    let host = standard_host(Rc::new(StdIO)).build();
    let leaf = host.leaf(None, Some(code.to_owned()));
    Ok(leaf.value()?.unwrap_or(Value::Null))
}
