//! Directories are the inner nodes of the evaluation tree.
//!
//! A directory scans its entries once when it is created, turning
//! subdirectories into directories and files into leaves, and from then
//! on keeps its children in sync with the filesystem through the
//! change events of its own non-recursive watch.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use path_clean::PathClean;
use smol_str::SmolStr;
use tracing::{debug, instrument, trace, warn};

use crate::cache::Slot;
use crate::errors::{ErrorKind, EvalResult};
use crate::host::Host;
use crate::io::FileType;
use crate::leaf::Leaf;
use crate::node::{Node, ParentLink};
use crate::view::View;
use crate::watch::{Watch, WatchEvent, WatchEventKind};

/// Inner node of the tree. Children are owned by their directory, the
/// root is owned by whoever opened it; dropping the root releases the
/// whole tree and its watches.
pub struct Directory {
    name: SmolStr,
    path: PathBuf,
    link: ParentLink,
    host: Rc<Host>,
    nodes: RefCell<BTreeMap<SmolStr, Node>>,
    watch: RefCell<Option<Box<dyn Watch>>>,
}

fn absolute(path: &Path) -> EvalResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf().clean());
    }

    let cwd = std::env::current_dir().map_err(|err| ErrorKind::io(path, err))?;
    Ok(cwd.join(path).clean())
}

impl Directory {
    /// Create the directory node for `path`, scanning its entries
    /// recursively and watching it if the host has a watch provider.
    /// A path that does not exist yields an empty, unwatched node.
    #[instrument(level = "debug", skip(host), fields(path = %path.display()))]
    pub fn new(host: &Rc<Host>, path: &Path) -> EvalResult<Rc<Directory>> {
        let path = absolute(path)?;
        let name = path
            .file_name()
            .map(|name| SmolStr::new(name.to_string_lossy()))
            .unwrap_or_default();

        let dir = Rc::new(Directory {
            name,
            path,
            link: ParentLink::default(),
            host: host.clone(),
            nodes: RefCell::new(BTreeMap::new()),
            watch: RefCell::new(None),
        });

        let exists = host
            .io()
            .path_exists(&dir.path)
            .map_err(|err| ErrorKind::io(&dir.path, err))?;

        if !exists {
            debug!("directory does not exist, leaving it empty");
            return Ok(dir);
        }

        dir.scan()?;
        dir.start_watch();
        Ok(dir)
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn host(&self) -> &Rc<Host> {
        &self.host
    }

    pub(crate) fn link(&self) -> &ParentLink {
        &self.link
    }

    pub fn parent(&self) -> EvalResult<Option<Rc<Directory>>> {
        self.link.get(&self.name)
    }

    /// Names of the current children, in order.
    pub fn names(&self) -> Vec<SmolStr> {
        self.nodes.borrow().keys().cloned().collect()
    }

    pub fn children(&self) -> Vec<Node> {
        self.nodes.borrow().values().cloned().collect()
    }

    pub fn child(&self, name: &str) -> Option<Node> {
        self.nodes.borrow().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Resolve a single name to a child node.
    pub fn descend(&self, name: &str) -> EvalResult<Node> {
        self.child(name).ok_or_else(|| ErrorKind::NotFound {
            name: name.into(),
            dir: self.path.clone(),
        })
    }

    /// The view of this directory, as seen by its leaves.
    pub fn view(self: &Rc<Self>) -> EvalResult<View> {
        View::of_directory(self)
    }

    pub fn is_watched(&self) -> bool {
        self.watch.borrow().is_some()
    }

    fn insert(self: &Rc<Self>, node: Node) {
        node.link().attach(self);
        let previous = self.nodes.borrow_mut().insert(node.name().clone(), node);
        if let Some(previous) = previous {
            previous.link().sever();
        }
    }

    fn create_child(&self, path: &Path, file_type: FileType) -> EvalResult<Option<Node>> {
        match file_type {
            FileType::Directory => Ok(Some(Node::Directory(Directory::new(&self.host, path)?))),
            FileType::Regular => Ok(Some(Node::Leaf(Leaf::new(
                &self.host,
                Some(path.to_path_buf()),
                None,
            )))),
            FileType::Symlink | FileType::Unknown => {
                trace!(path = %path.display(), %file_type, "skipping entry");
                Ok(None)
            }
        }
    }

    fn scan(self: &Rc<Self>) -> EvalResult<()> {
        let entries = self
            .host
            .io()
            .read_dir(&self.path)
            .map_err(|err| ErrorKind::io(&self.path, err))?;

        for (name, file_type) in entries {
            let name = name.to_string_lossy();
            if !self.host.filter().admits(&name) {
                trace!(%name, "ignoring entry");
                continue;
            }

            if let Some(node) = self.create_child(&self.path.join(&*name), file_type)? {
                self.insert(node);
            }
        }

        debug!(path = %self.path.display(), children = self.len(), "scanned directory");
        Ok(())
    }

    fn start_watch(&self) {
        let Some(watch_io) = self.host.watch_io() else {
            return;
        };

        match watch_io.watch(&self.path) {
            Ok(watch) => *self.watch.borrow_mut() = Some(watch),
            Err(err) => warn!(path = %self.path.display(), %err, "could not watch directory"),
        }
    }

    /// Topmost directory of the tree this directory belongs to.
    pub fn root(self: &Rc<Self>) -> Rc<Directory> {
        let mut current = self.clone();
        while let Ok(Some(parent)) = current.parent() {
            current = parent;
        }
        current
    }

    /// Apply all pending change events to this directory and, after
    /// that, to all of its subdirectories. Returns the number of
    /// events that changed the tree.
    ///
    /// Units may depend on any other unit of the tree, so after a
    /// change the memoised values of the whole tree are dropped. Source
    /// text and compiled code of unchanged units are kept.
    pub fn sync(self: &Rc<Self>) -> usize {
        let changed = self.sync_events();
        if changed > 0 {
            self.root().invalidate_values();
        }
        changed
    }

    fn invalidate_values(&self) {
        for node in self.children() {
            match node {
                Node::Leaf(leaf) => leaf.invalidate(Slot::Value),
                Node::Directory(dir) => dir.invalidate_values(),
            }
        }
    }

    fn sync_events(self: &Rc<Self>) -> usize {
        let events = match &*self.watch.borrow() {
            Some(watch) => watch.poll(),
            None => vec![],
        };

        let mut changed = events.iter().filter(|event| self.apply(event)).count();

        let subdirs: Vec<Rc<Directory>> = self
            .nodes
            .borrow()
            .values()
            .filter_map(Node::as_directory)
            .cloned()
            .collect();

        for subdir in subdirs {
            changed += subdir.sync_events();
        }

        changed
    }

    /// Apply a single change event for a direct entry of this
    /// directory. Returns whether the tree changed.
    #[instrument(level = "debug", skip(self), fields(dir = %self.path.display()))]
    pub fn apply(self: &Rc<Self>, event: &WatchEvent) -> bool {
        if event.path.parent() != Some(self.path.as_path()) {
            trace!("event is not about a direct entry, ignoring it");
            return false;
        }

        let Some(name) = event.path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };

        if !self.host.filter().admits(&name) {
            trace!(%name, "event for ignored entry");
            return false;
        }

        match event.kind {
            WatchEventKind::Change | WatchEventKind::Add => match self.child(&name) {
                Some(node) if self.kind_changed(&node, &event.path) => {
                    debug!(%name, kind = node.kind(), "entry changed its kind, replacing it");
                    let previous = self.nodes.borrow_mut().remove(&*name);
                    if let Some(previous) = previous {
                        previous.link().sever();
                    }
                    self.add(&event.path);
                    true
                }

                Some(Node::Leaf(leaf)) => {
                    leaf.refresh();
                    true
                }

                Some(Node::Directory(_)) => false,

                None if event.kind == WatchEventKind::Change => {
                    trace!(%name, "change for an untracked entry");
                    false
                }

                None => self.add(&event.path),
            },

            WatchEventKind::Remove => {
                let removed = self.nodes.borrow_mut().remove(&*name);
                match removed {
                    Some(node) => {
                        node.link().sever();
                        debug!(%name, kind = node.kind(), "removed node");
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Whether the entry at `path` is no longer of the kind `node` was
    /// created for, e.g. a file that was replaced by a directory.
    fn kind_changed(&self, node: &Node, path: &Path) -> bool {
        matches!(
            (node, self.host.io().file_type(path)),
            (Node::Leaf(_), Ok(FileType::Directory)) | (Node::Directory(_), Ok(FileType::Regular))
        )
    }

    fn add(self: &Rc<Self>, path: &Path) -> bool {
        let file_type = match self.host.io().file_type(path) {
            Ok(file_type) => file_type,
            Err(err) => {
                warn!(path = %path.display(), %err, "could not add entry");
                return false;
            }
        };

        match self.create_child(path, file_type) {
            Ok(Some(node)) => {
                debug!(name = %node.name(), kind = node.kind(), "added node");
                self.insert(node);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(path = %path.display(), %err, "could not add entry");
                false
            }
        }
    }
}

impl std::fmt::Debug for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directory")
            .field("path", &self.path)
            .field("children", &self.names())
            .field("watched", &self.is_watched())
            .finish()
    }
}
