//! Delivery of real filesystem events through notify. Events arrive
//! asynchronously, so every check polls the tree for a bounded time.

use std::fs;
use std::rc::Rc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use glagol_eval::{Directory, StdIO};
use pretty_assertions::assert_eq;

use super::{value_at, Fixture};
use crate::{standard_host, NotifyWatchIO};

const TIMEOUT: Duration = Duration::from_secs(10);

fn open_watched(fixture: &Fixture) -> Rc<Directory> {
    let host = standard_host(Rc::new(StdIO))
        .watch_with(Rc::new(NotifyWatchIO::new()))
        .build();
    host.open(fixture.dir.path()).unwrap()
}

/// Sync `root` until `done` holds or the timeout expires.
fn sync_until<F: Fn(&Rc<Directory>) -> bool>(root: &Rc<Directory>, done: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < TIMEOUT {
        root.sync();
        if done(root) {
            return true;
        }
        sleep(Duration::from_millis(50));
    }
    false
}

fn int_value(root: &Rc<Directory>, rel: &str) -> Option<i64> {
    value_at(root, rel).ok().and_then(|value| value.as_int().ok())
}

#[test]
fn watched_trees_pick_up_new_files() {
    let fixture = Fixture::new();
    let root = open_watched(&fixture);
    assert!(root.is_watched());

    fixture.write("n3", "3");
    assert!(sync_until(&root, |root| int_value(root, "n3") == Some(3)));
}

#[test]
fn watched_trees_pick_up_changes() {
    let fixture = Fixture::new();
    let root = open_watched(&fixture);
    assert_eq!(int_value(&root, "n2"), Some(12));

    fixture.write("d1/n11", "20");
    assert!(sync_until(&root, |root| int_value(root, "n2") == Some(21)));
}

#[test]
fn watched_trees_drop_removed_files() {
    let fixture = Fixture::new();
    let root = open_watched(&fixture);

    fs::remove_file(fixture.path("d2/n21")).unwrap();
    assert!(sync_until(&root, |root| {
        root.child("d2")
            .and_then(|d2| d2.as_directory().map(|d2| d2.is_empty()))
            .unwrap_or(false)
    }));
}
