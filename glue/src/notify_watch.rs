//! [`WatchIO`] implementation backed by the `notify` crate.
//!
//! Every watched directory gets its own non-recursive watcher. The
//! watcher delivers raw events on a background thread into a channel,
//! which is only drained when the tree polls it; the tree itself is
//! never touched from another thread.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

use glagol_eval::{Watch, WatchEvent, WatchEventKind, WatchIO};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{trace, warn};

#[derive(Debug, Default)]
pub struct NotifyWatchIO;

impl NotifyWatchIO {
    pub fn new() -> Self {
        NotifyWatchIO
    }
}

fn to_io_error(err: notify::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

impl WatchIO for NotifyWatchIO {
    fn watch(&self, dir: &Path) -> io::Result<Box<dyn Watch>> {
        let (sender, receiver) = channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            // the receiving end is gone once the directory is dropped
            let _ = sender.send(event);
        })
        .map_err(to_io_error)?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(to_io_error)?;

        trace!(dir = %dir.display(), "started watching");
        Ok(Box::new(NotifyWatch {
            dir: dir.to_path_buf(),
            receiver,
            _watcher: watcher,
        }))
    }
}

struct NotifyWatch {
    dir: PathBuf,
    receiver: Receiver<notify::Result<Event>>,

    // stops watching when dropped
    _watcher: RecommendedWatcher,
}

impl Watch for NotifyWatch {
    fn poll(&self) -> Vec<WatchEvent> {
        let mut events = vec![];
        for result in self.receiver.try_iter() {
            match result {
                Ok(event) => events.extend(
                    translate(event)
                        .into_iter()
                        .filter(|event| event.path.parent() == Some(self.dir.as_path())),
                ),
                Err(err) => warn!(dir = %self.dir.display(), error = %err, "watch error"),
            }
        }
        events
    }
}

fn presence(path: PathBuf) -> WatchEvent {
    if path.exists() {
        WatchEvent::add(path)
    } else {
        WatchEvent::remove(path)
    }
}

/// Map a raw notify event to tree events. Renames become a removal of
/// the old name and an addition of the new one.
fn translate(event: Event) -> Vec<WatchEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => WatchEventKind::Add,
        EventKind::Remove(_) => WatchEventKind::Remove,

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => WatchEventKind::Remove,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => WatchEventKind::Add,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            return paths
                .next()
                .map(WatchEvent::remove)
                .into_iter()
                .chain(paths.next().map(WatchEvent::add))
                .collect();
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            return event.paths.into_iter().map(presence).collect();
        }

        EventKind::Modify(_) | EventKind::Any => WatchEventKind::Change,
        EventKind::Access(_) | EventKind::Other => return vec![],
    };

    event
        .paths
        .into_iter()
        .map(|path| WatchEvent { kind, path })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange};
    use pretty_assertions::assert_eq;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn raw_events_are_translated() {
        assert_eq!(
            translate(event(EventKind::Create(CreateKind::File), &["/d/a"])),
            vec![WatchEvent::add("/d/a")]
        );
        assert_eq!(
            translate(event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/d/a"]
            )),
            vec![WatchEvent::change("/d/a")]
        );
        assert_eq!(
            translate(event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/d/a", "/d/b"]
            )),
            vec![WatchEvent::remove("/d/a"), WatchEvent::add("/d/b")]
        );
        assert!(translate(event(EventKind::Access(notify::event::AccessKind::Any), &["/d/a"])).is_empty());
    }
}
