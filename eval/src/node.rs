//! Nodes of the evaluation tree and the links between them.

use std::cell::RefCell;
use std::path::{Component, Path};
use std::rc::{Rc, Weak};

use smol_str::SmolStr;

use crate::directory::Directory;
use crate::errors::{ErrorKind, EvalResult};
use crate::leaf::Leaf;
use crate::value::Value;
use crate::view::View;

/// Non-owning link from a node to the directory containing it.
///
/// A node that was never attached has no parent. A node that was
/// removed from its directory keeps a link that no longer resolves,
/// which tree walks report as [`ErrorKind::UnsupportedNode`].
#[derive(Debug, Default)]
pub(crate) struct ParentLink(RefCell<Option<Weak<Directory>>>);

impl ParentLink {
    pub(crate) fn attach(&self, parent: &Rc<Directory>) {
        *self.0.borrow_mut() = Some(Rc::downgrade(parent));
    }

    pub(crate) fn sever(&self) {
        *self.0.borrow_mut() = Some(Weak::new());
    }

    pub(crate) fn get(&self, name: &str) -> EvalResult<Option<Rc<Directory>>> {
        match &*self.0.borrow() {
            None => Ok(None),
            Some(weak) => weak
                .upgrade()
                .map(Some)
                .ok_or_else(|| ErrorKind::UnsupportedNode { name: name.into() }),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Node {
    Leaf(Rc<Leaf>),
    Directory(Rc<Directory>),
}

impl Node {
    pub fn name(&self) -> &SmolStr {
        match self {
            Node::Leaf(leaf) => leaf.name(),
            Node::Directory(dir) => dir.name(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Leaf(_) => "leaf",
            Node::Directory(_) => "directory",
        }
    }

    pub fn parent(&self) -> EvalResult<Option<Rc<Directory>>> {
        match self {
            Node::Leaf(leaf) => leaf.parent(),
            Node::Directory(dir) => dir.parent(),
        }
    }

    pub(crate) fn link(&self) -> &ParentLink {
        match self {
            Node::Leaf(leaf) => leaf.link(),
            Node::Directory(dir) => dir.link(),
        }
    }

    pub fn as_leaf(&self) -> Option<&Rc<Leaf>> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&Rc<Directory>> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::Leaf(_) => None,
        }
    }

    /// The view this node's code would see as `_`: the view of the
    /// directory itself, or of a leaf's containing directory.
    pub fn view(&self) -> EvalResult<View> {
        match self {
            Node::Leaf(leaf) => leaf.view(),
            Node::Directory(dir) => View::of_directory(dir),
        }
    }

    /// Value of the node: a leaf's computed value, or the view of a
    /// directory.
    pub fn value(&self) -> EvalResult<Option<Value>> {
        match self {
            Node::Leaf(leaf) => leaf.value(),
            Node::Directory(dir) => Ok(Some(Value::View(View::of_directory(dir)?))),
        }
    }

    /// Resolve a relative path, one segment at a time, starting at this
    /// node. `.` segments are skipped and `..` moves to the parent.
    ///
    /// Parents are linked weakly, so the returned node can only walk
    /// upwards (and build views) while the root of its tree is held.
    pub fn descend<P: AsRef<Path>>(&self, path: P) -> EvalResult<Node> {
        let mut current = self.clone();

        for component in path.as_ref().components() {
            current = match component {
                Component::CurDir => current,

                Component::ParentDir => match current.parent()? {
                    Some(parent) => Node::Directory(parent),
                    None => {
                        return Err(ErrorKind::Unconnected {
                            name: current.name().clone(),
                        })
                    }
                },

                Component::Normal(segment) => {
                    let segment = segment.to_string_lossy();
                    match &current {
                        Node::Directory(dir) => dir.descend(&segment)?,
                        Node::Leaf(leaf) => {
                            return Err(ErrorKind::NotFound {
                                name: SmolStr::new(&segment),
                                dir: leaf.path().map(Path::to_path_buf).unwrap_or_default(),
                            })
                        }
                    }
                }

                Component::RootDir | Component::Prefix(_) => {
                    return Err(ErrorKind::NotFound {
                        name: SmolStr::new(component.as_os_str().to_string_lossy()),
                        dir: path.as_ref().to_path_buf(),
                    })
                }
            };
        }

        Ok(current)
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Leaf(a), Node::Leaf(b)) => Rc::ptr_eq(a, b),
            (Node::Directory(a), Node::Directory(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Rc<Leaf>> for Node {
    fn from(leaf: Rc<Leaf>) -> Self {
        Node::Leaf(leaf)
    }
}

impl From<Rc<Directory>> for Node {
    fn from(dir: Rc<Directory>) -> Self {
        Node::Directory(dir)
    }
}
