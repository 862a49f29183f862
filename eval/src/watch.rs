//! Interface for filesystem change notifications.
//!
//! Every scanned directory asks the configured [`WatchIO`] for a
//! non-recursive [`Watch`] on its own path. Events are not delivered
//! by callback: the tree pulls them with [`Watch::poll`] whenever it is
//! synchronised, so all tree mutation happens on the evaluating
//! thread.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
    Remove,
}

/// A change to a direct entry of a watched directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn add<P: Into<PathBuf>>(path: P) -> Self {
        WatchEvent {
            kind: WatchEventKind::Add,
            path: path.into(),
        }
    }

    pub fn change<P: Into<PathBuf>>(path: P) -> Self {
        WatchEvent {
            kind: WatchEventKind::Change,
            path: path.into(),
        }
    }

    pub fn remove<P: Into<PathBuf>>(path: P) -> Self {
        WatchEvent {
            kind: WatchEventKind::Remove,
            path: path.into(),
        }
    }
}

/// Handle of a single watched directory. Dropping the handle stops
/// watching.
pub trait Watch {
    /// Drain all events received since the last call, oldest first.
    fn poll(&self) -> Vec<WatchEvent>;
}

pub trait WatchIO {
    /// Start watching the direct entries of `dir`.
    fn watch(&self, dir: &Path) -> io::Result<Box<dyn Watch>>;
}

type Queue = RefCell<VecDeque<WatchEvent>>;

/// In-process [`WatchIO`] whose events are produced by calling
/// [`QueueWatchIO::emit`]. Useful wherever events should be
/// deterministic, such as in tests.
#[derive(Default)]
pub struct QueueWatchIO {
    queues: RefCell<HashMap<PathBuf, Weak<Queue>>>,
}

impl QueueWatchIO {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the watch of the directory containing the
    /// event's path. Returns false if that directory is not watched.
    pub fn emit(&self, event: WatchEvent) -> bool {
        let Some(dir) = event.path.parent() else {
            return false;
        };

        match self.queues.borrow().get(dir).and_then(Weak::upgrade) {
            Some(queue) => {
                queue.borrow_mut().push_back(event);
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, dir: &Path) -> bool {
        self.queues
            .borrow()
            .get(dir)
            .map_or(false, |queue| queue.strong_count() > 0)
    }
}

struct QueueWatch(Rc<Queue>);

impl Watch for QueueWatch {
    fn poll(&self) -> Vec<WatchEvent> {
        self.0.borrow_mut().drain(..).collect()
    }
}

impl WatchIO for QueueWatchIO {
    fn watch(&self, dir: &Path) -> io::Result<Box<dyn Watch>> {
        let queue = Rc::new(Queue::default());
        self.queues
            .borrow_mut()
            .insert(dir.to_path_buf(), Rc::downgrade(&queue));
        Ok(Box::new(QueueWatch(queue)))
    }
}
