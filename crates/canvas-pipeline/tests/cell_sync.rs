use canvas_pipeline::{names, select_all, InMemoryChannel, SyncValue, SyncedCell};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn local_writes_commit_once_and_host_writes_do_not_echo() {
    let channel = Rc::new(InMemoryChannel::new());
    let filter = SyncedCell::new(names::FILTER, String::new(), channel.clone());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let _sub = filter.subscribe(move |value: &String| sink.borrow_mut().push(value.clone()));

    filter.set("bad(".to_owned());
    assert_eq!(
        channel.commits_for(names::FILTER),
        vec![SyncValue::Json(json!("bad("))]
    );

    channel.push_external(names::FILTER, SyncValue::Json(json!("d.age > 10")));
    assert_eq!(filter.get(), "d.age > 10");
    assert_eq!(channel.commits_for(names::FILTER).len(), 1);

    assert_eq!(
        *seen.borrow(),
        vec![String::new(), "bad(".to_owned(), "d.age > 10".to_owned()]
    );
}

#[test]
fn null_from_host_resets_to_initial() {
    let channel = Rc::new(InMemoryChannel::new());
    let columns = SyncedCell::new(names::GROUP_COLUMNS, vec!["cat".to_owned()], channel.clone());

    channel.push_external(names::GROUP_COLUMNS, SyncValue::Json(json!(["a", "b"])));
    assert_eq!(columns.get(), vec!["a".to_owned(), "b".to_owned()]);

    channel.push_external(names::GROUP_COLUMNS, SyncValue::Json(json!(null)));
    assert_eq!(columns.get(), vec!["cat".to_owned()]);
}

#[test]
fn unlinked_cells_stay_local() {
    let channel = Rc::new(InMemoryChannel::new());
    let mut selected = SyncedCell::new(names::SELECTED, Vec::<String>::new(), channel.clone());
    selected.unlink();
    assert!(!selected.is_linked());

    select_all(&selected, &["x".to_owned()]);
    assert_eq!(selected.get(), vec!["x".to_owned()]);
    assert!(channel.commits().is_empty());

    channel.push_external(names::SELECTED, SyncValue::Json(json!(["y"])));
    assert_eq!(selected.get(), vec!["x".to_owned()]);
}

#[test]
fn table_buffers_sync_as_bytes() {
    let channel = Rc::new(InMemoryChannel::new());
    let table = SyncedCell::new(names::TABLE, bytes::Bytes::new(), channel.clone());

    channel.push_external(names::TABLE, SyncValue::Bytes(bytes::Bytes::from_static(b"abc")));
    assert_eq!(&table.get()[..], b"abc");

    // A JSON value where bytes are expected is ignored.
    channel.push_external(names::TABLE, SyncValue::Json(json!("abc")));
    assert_eq!(&table.get()[..], b"abc");
}
