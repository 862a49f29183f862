use pretty_assertions::assert_eq;

use super::{value_at, Fixture};
use crate::{ErrorKind, Node, Value, View, WatchEvent, PARENT_KEY, SELF_KEY};

#[test]
fn self_key_is_the_view_itself() {
    let fixture = Fixture::new();
    let view = fixture.open().view().unwrap();

    let this = view.get(SELF_KEY).unwrap().unwrap().to_view().unwrap();
    assert!(this.ptr_eq(&view));
}

#[test]
fn parent_chain_ends_at_the_root() {
    let fixture = Fixture::new();
    let root = fixture.open();
    let leaf = Node::Directory(root.clone()).descend("d1/d12/n121").unwrap();

    // n121 sees d12; walking up three times runs off the root
    let d12 = leaf.view().unwrap();
    let d1 = d12.parent().unwrap();
    let top = d1.parent().unwrap();
    assert!(top.parent().is_none());

    assert_eq!(d12.path(), fixture.path("d1/d12"));
    assert_eq!(d1.path(), fixture.path("d1"));
    assert!(top.same_directory(&View::of_directory(&root).unwrap()));
    assert!(top.get(PARENT_KEY).unwrap().is_none());
}

#[test]
fn walking_down_and_up_yields_the_same_view() {
    let fixture = Fixture::new();
    let view = fixture.open().view().unwrap();

    let d1 = view.get("d1").unwrap().unwrap();
    let d12 = d1.select_required("d12").unwrap();
    let back = d12
        .select_required(PARENT_KEY)
        .unwrap()
        .select_required(PARENT_KEY)
        .unwrap();

    assert!(back.to_view().unwrap().ptr_eq(&view));
}

#[test]
fn leaves_are_seen_as_their_values() {
    let fixture = Fixture::new();
    let view = fixture.open().view().unwrap();

    assert_eq!(view.get("n1").unwrap().unwrap().as_int().unwrap(), 1);
    assert!(view.get("nope").unwrap().is_none());
    assert!(view.contains("d3"));
    assert!(!view.contains(PARENT_KEY));
}

#[test]
fn names_exclude_reserved_keys() {
    let fixture = Fixture::new();
    let view = fixture.open().view().unwrap();

    assert_eq!(view.names(), vec!["d1", "d2", "d3", "n1", "n2"]);
}

#[test]
fn views_are_read_only() {
    let fixture = Fixture::new();
    let view = fixture.open().view().unwrap();

    assert!(matches!(
        view.set("n1", Value::Integer(3)),
        Err(ErrorKind::Immutable { key }) if key == "n1"
    ));
    assert_eq!(view.get("n1").unwrap().unwrap().as_int().unwrap(), 1);
}

#[test]
fn views_are_live() {
    let fixture = Fixture::new();
    let root = fixture.open();
    let view = root.view().unwrap();
    assert!(view.get("n3").unwrap().is_none());

    fixture.write("n3", "3");
    fixture.watch.emit(WatchEvent::add(fixture.path("n3")));
    root.sync();

    assert_eq!(view.get("n3").unwrap().unwrap().as_int().unwrap(), 3);
}

#[test]
fn removed_nodes_are_foreign_bodies() {
    let fixture = Fixture::new();
    let root = fixture.open();
    let d1 = root.child("d1").unwrap();

    fixture.watch.emit(WatchEvent::remove(fixture.path("d1")));
    root.sync();

    assert!(matches!(
        d1.view(),
        Err(ErrorKind::UnsupportedNode { name }) if name == "d1"
    ));
}

#[test]
fn subtrees_serialise_to_json() {
    let fixture = Fixture::new();
    let root = fixture.open();
    let d12 = Node::Directory(root.clone()).descend("d1/d12").unwrap();

    let json = d12.value().unwrap().unwrap().to_json().unwrap();
    assert_eq!(json, serde_json::json!({ "n121": 121, "n122": 132 }));
}

#[test]
fn detached_handles_cannot_walk_upwards() {
    let fixture = Fixture::new();
    let d12 = Node::Directory(fixture.open()).descend("d1/d12").unwrap();

    // the root was a temporary, so d12 is all that is left of the tree
    assert!(matches!(
        d12.view(),
        Err(ErrorKind::UnsupportedNode { name }) if name == "d12"
    ));
}

#[test]
fn cached_views_do_not_keep_the_tree_alive() {
    let fixture = Fixture::new();
    fixture.write("d3/scope", "scope");
    let root = fixture.open();

    let view = value_at(&root, "d3/scope").unwrap().to_view().unwrap();
    assert_eq!(view.get("scope").unwrap().unwrap().to_view().unwrap().path(), view.path());
    assert!(fixture.watch.is_watching(&fixture.path("d3")));

    drop(root);

    assert!(!fixture.watch.is_watching(&fixture.path("d3")));
    assert!(!fixture.watch.is_watching(fixture.dir.path()));
    assert!(view.names().is_empty());
    assert!(matches!(
        view.get("scope"),
        Err(ErrorKind::UnsupportedNode { name }) if name == "d3"
    ));
}
