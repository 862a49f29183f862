use std::fs;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use super::{int_at, Fixture};
use crate::{HostBuilder, Node, StdIO, WatchEvent};

#[test]
fn every_directory_is_watched() {
    let fixture = Fixture::new();
    let root = fixture.open();

    for dir in ["", "d1", "d1/d11", "d1/d12", "d2", "d3"] {
        assert!(
            fixture.watch.is_watching(&fixture.path(dir)),
            "'{}' is not watched",
            dir
        );
    }
    assert!(root.is_watched());
}

#[test]
fn added_files_become_leaves() {
    let fixture = Fixture::new();
    let root = fixture.open();

    fixture.write("d3/n31", "31");
    assert!(fixture.watch.emit(WatchEvent::add(fixture.path("d3/n31"))));
    assert_eq!(root.sync(), 1);

    assert_eq!(int_at(&root, "d3/n31"), 31);
    let d3 = root.child("d3").unwrap();
    let n31 = d3.as_directory().unwrap().child("n31").unwrap();
    assert!(Rc::ptr_eq(
        &n31.parent().unwrap().unwrap(),
        d3.as_directory().unwrap()
    ));
}

#[test]
fn added_directories_become_directories() {
    let fixture = Fixture::new();
    let root = fixture.open();

    fixture.write("d4/n41", "41");
    fixture.watch.emit(WatchEvent::add(fixture.path("d4")));
    assert_eq!(root.sync(), 1);

    let d4 = root.child("d4").unwrap();
    assert!(d4.as_directory().unwrap().is_watched());
    assert_eq!(int_at(&root, "d4/n41"), 41);
}

#[test]
fn changed_files_are_reread() {
    let fixture = Fixture::new();
    let root = fixture.open();
    assert_eq!(int_at(&root, "n1"), 1);

    fixture.write("n1", "5");
    fixture.watch.emit(WatchEvent::change(fixture.path("n1")));
    assert_eq!(root.sync(), 1);

    assert_eq!(int_at(&root, "n1"), 5);
}

#[test]
fn dependents_see_changes() {
    let fixture = Fixture::new();
    let root = fixture.open();
    assert_eq!(int_at(&root, "n2"), 12);
    assert_eq!(int_at(&root, "d2/n21"), 132);

    fixture.write("d1/n11", "20");
    fixture.watch.emit(WatchEvent::change(fixture.path("d1/n11")));
    root.sync();

    assert_eq!(int_at(&root, "n2"), 21);
    assert_eq!(int_at(&root, "d2/n21"), 141);
}

#[test]
fn re_adding_an_existing_file_refreshes_it() {
    let fixture = Fixture::new();
    let root = fixture.open();
    let before = root.child("n1").unwrap();
    assert_eq!(int_at(&root, "n1"), 1);

    // editors often save by replacing the file
    fixture.write("n1", "7");
    fixture.watch.emit(WatchEvent::add(fixture.path("n1")));
    root.sync();

    assert!(root.child("n1").unwrap().ptr_eq(&before));
    assert_eq!(int_at(&root, "n1"), 7);
}

#[test]
fn removed_entries_leave_the_tree() {
    let fixture = Fixture::new();
    let root = fixture.open();

    fs::remove_file(fixture.path("n2")).unwrap();
    fs::remove_dir(fixture.path("d3")).unwrap();
    fixture.watch.emit(WatchEvent::remove(fixture.path("n2")));
    fixture.watch.emit(WatchEvent::remove(fixture.path("d3")));
    assert_eq!(root.sync(), 2);

    assert_eq!(root.names(), vec!["d1", "d2", "n1"]);
    assert!(!fixture.watch.is_watching(&fixture.path("d3")));
}

#[test]
fn events_in_subdirectories_are_applied() {
    let fixture = Fixture::new();
    let root = fixture.open();

    fixture.write("d1/d12/n123", "123");
    fixture.watch.emit(WatchEvent::add(fixture.path("d1/d12/n123")));
    fixture.watch.emit(WatchEvent::remove(fixture.path("d1/d12/n121")));
    assert_eq!(root.sync(), 2);

    let d12 = Node::Directory(root.clone()).descend("d1/d12").unwrap();
    assert_eq!(
        d12.as_directory().unwrap().names(),
        vec!["n122", "n123"]
    );
}

#[test]
fn irrelevant_events_are_ignored() {
    let fixture = Fixture::new();
    let root = fixture.open();

    fixture.write(".n1.swp", "x");
    fixture.watch.emit(WatchEvent::add(fixture.path(".n1.swp")));
    fixture.watch.emit(WatchEvent::change(fixture.path("untracked")));
    fixture.watch.emit(WatchEvent::remove(fixture.path("never-existed")));
    assert_eq!(root.sync(), 0);

    assert!(!root.apply(&WatchEvent::add("/somewhere/else")));
}

#[test]
fn vanished_additions_are_skipped() {
    let fixture = Fixture::new();
    let root = fixture.open();

    fixture.watch.emit(WatchEvent::add(fixture.path("gone")));
    assert_eq!(root.sync(), 0);
    assert!(root.child("gone").is_none());
}

#[test]
fn unwatched_trees_do_not_sync() {
    let fixture = Fixture::new();
    let host = HostBuilder::new(Rc::new(StdIO))
        .default_backend(fixture.backend.clone())
        .build();
    let root = host.open(fixture.dir.path()).unwrap();

    assert!(!root.is_watched());
    assert_eq!(root.sync(), 0);
}

#[test]
fn entries_changing_kind_are_replaced() {
    let fixture = Fixture::new();
    let root = fixture.open();
    assert_eq!(int_at(&root, "n1"), 1);

    fs::remove_file(fixture.path("n1")).unwrap();
    fixture.write("n1/n11", "5");
    fixture.watch.emit(WatchEvent::add(fixture.path("n1")));
    assert_eq!(root.sync(), 1);

    assert!(root.child("n1").unwrap().as_directory().unwrap().is_watched());
    assert_eq!(int_at(&root, "n1/n11"), 5);

    fs::remove_dir_all(fixture.path("n1")).unwrap();
    fixture.write("n1", "7");
    fixture.watch.emit(WatchEvent::change(fixture.path("n1")));
    assert_eq!(root.sync(), 1);

    assert!(root.child("n1").unwrap().as_leaf().is_some());
    assert_eq!(int_at(&root, "n1"), 7);
    assert!(!fixture.watch.is_watching(&fixture.path("n1")));
}
