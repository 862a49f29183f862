//! Read-only views of directories, which is how units see the tree.
//!
//! Looking a name up in a view returns the value of the leaf of that
//! name, or a nested view for a subdirectory. Two keys are reserved:
//! `_` resolves to the view itself and `__` to the view of the parent
//! directory. A view is built together with its chain of parent views,
//! so walking up and down again yields the identical view objects.
//!
//! Views hold their directory weakly, since leaf values may contain
//! views of their own tree. Once the tree is dropped, lookups through
//! an old view fail with [`ErrorKind::UnsupportedNode`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use smol_str::SmolStr;

use crate::directory::Directory;
use crate::errors::{ErrorKind, EvalResult};
use crate::node::Node;
use crate::value::Value;

/// Key under which a view refers to itself.
pub const SELF_KEY: &str = "_";

/// Key under which a view refers to the view of its parent directory.
pub const PARENT_KEY: &str = "__";

/// Binding under which executing units find their own identity.
pub const UNIT_KEY: &str = "self";

struct ViewInner {
    dir: Weak<Directory>,
    name: SmolStr,
    path: PathBuf,
    parent: Option<View>,
}

#[derive(Clone)]
pub struct View(Rc<ViewInner>);

impl View {
    /// Build the view of `dir`, including the views of all of its
    /// ancestors.
    pub fn of_directory(dir: &Rc<Directory>) -> EvalResult<View> {
        let parent = match dir.parent()? {
            Some(parent) => Some(View::of_directory(&parent)?),
            None => None,
        };

        Ok(View::new(dir, parent))
    }

    fn new(dir: &Rc<Directory>, parent: Option<View>) -> View {
        View(Rc::new(ViewInner {
            dir: Rc::downgrade(dir),
            name: dir.name().clone(),
            path: dir.path().to_path_buf(),
            parent,
        }))
    }

    fn nested(&self, dir: &Rc<Directory>) -> View {
        View::new(dir, Some(self.clone()))
    }

    /// The directory shown by this view, as long as its tree is alive.
    pub fn directory(&self) -> EvalResult<Rc<Directory>> {
        self.0.dir.upgrade().ok_or_else(|| ErrorKind::UnsupportedNode {
            name: self.0.name.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.0.path
    }

    pub fn parent(&self) -> Option<&View> {
        self.0.parent.as_ref()
    }

    /// Names of the directory's current children. The reserved keys
    /// are not included, and a dropped tree has no names.
    pub fn names(&self) -> Vec<SmolStr> {
        self.0.dir.upgrade().map(|dir| dir.names()).unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        match key {
            SELF_KEY => true,
            PARENT_KEY => self.0.parent.is_some(),
            name => self
                .0
                .dir
                .upgrade()
                .map_or(false, |dir| dir.child(name).is_some()),
        }
    }

    /// Look up a key. Leaves evaluate to their value (`null` if they
    /// have none), subdirectories to nested views. Unknown names and
    /// `__` at the root of a tree are absent.
    pub fn get(&self, key: &str) -> EvalResult<Option<Value>> {
        match key {
            SELF_KEY => Ok(Some(Value::View(self.clone()))),
            PARENT_KEY => Ok(self.0.parent.clone().map(Value::View)),
            name => match self.directory()?.child(name) {
                None => Ok(None),
                Some(Node::Leaf(leaf)) => Ok(Some(leaf.value()?.unwrap_or(Value::Null))),
                Some(Node::Directory(dir)) => Ok(Some(Value::View(self.nested(&dir)))),
            },
        }
    }

    /// Views are read-only, every assignment is rejected.
    pub fn set(&self, key: &str, _value: Value) -> EvalResult<()> {
        Err(ErrorKind::Immutable { key: key.into() })
    }

    /// Whether both handles are the same view object.
    pub fn ptr_eq(&self, other: &View) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether both views show the same directory, regardless of how
    /// they were obtained.
    pub fn same_directory(&self, other: &View) -> bool {
        Weak::ptr_eq(&self.0.dir, &other.0.dir)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("View")
            .field(&self.0.path.display())
            .finish()
    }
}
