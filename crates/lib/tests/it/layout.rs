//! Document layout tests
//!
//! Exercises the three-array layout under concurrent peers: duplicate titles
//! from concurrent creates, concurrent deletes, and resurrection races.

use recordsync::{
    BindingConfig, Record, RecordLayout,
    y_crdt::{Array, Doc, Transact},
};

use crate::helpers::*;

#[test]
fn test_layout_stays_index_aligned() {
    let peer = Peer::new(1);
    for (i, title) in ["a", "b", "c", "d"].iter().enumerate() {
        peer.save(&Record::new(*title).with_field("n", i.to_string()));
    }
    peer.delete("b");
    peer.save(&Record::new("e"));
    peer.delete("d");

    peer.binding.verify().unwrap();
    assert_eq!(
        peer.binding.titles().unwrap(),
        vec!["a".to_string(), "c".to_string(), "e".to_string()]
    );
}

#[test]
fn test_concurrent_create_yields_duplicate_titles() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    a.save(&Record::new("Same").with_field("from", "a"));
    b.save(&Record::new("Same").with_field("from", "b"));

    sync_both(&a.doc, &b.doc);

    assert_eq!(a.binding.titles().unwrap().len(), 2);
    let err = a.binding.verify().unwrap_err();
    assert!(err.is_invariant_violation());
    // Both replicas agree on which container loads first.
    assert_eq!(a.load("Same"), b.load("Same"));
}

#[test]
fn test_delete_removes_every_duplicate() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    a.save(&Record::new("Same").with_field("from", "a"));
    b.save(&Record::new("Same").with_field("from", "b"));
    sync_both(&a.doc, &b.doc);

    let outcome = a.binding.delete_record("Same").unwrap();

    assert_eq!(outcome.removed, 2);
    assert!(a.binding.titles().unwrap().is_empty());
    a.binding.verify().unwrap();

    sync(&a.doc, &b.doc);
    assert_eq!(b.load("Same"), None);
    b.binding.verify().unwrap();
}

#[test]
fn test_concurrent_deletes_collapse_in_tombstones() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    a.save(&Record::new("Twice").with_field("x", "1"));
    sync(&a.doc, &b.doc);

    a.delete("Twice");
    b.delete("Twice");
    sync_both(&a.doc, &b.doc);

    assert_eq!(a.binding.tombstones().unwrap(), vec!["Twice".to_string()]);
    let raw = RecordLayout::new(&a.doc, &BindingConfig::default());
    let txn = a.doc.transact();
    assert_eq!(raw.tombstones_array().len(&txn), 2);
    drop(txn);

    a.save(&Record::new("Twice").with_field("x", "back"));
    assert!(a.binding.tombstones().unwrap().is_empty());
    a.binding.verify().unwrap();
}

#[test]
fn test_load_hides_tombstoned_title_raced_by_create() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    a.save(&Record::new("Race").with_field("x", "1"));
    sync(&a.doc, &b.doc);

    // a deletes while b, unaware, deletes and immediately re-creates.
    a.delete("Race");
    b.delete("Race");
    b.save(&Record::new("Race").with_field("x", "2"));
    sync_both(&a.doc, &b.doc);

    // a's tombstone survives b's resurrection, so the new container is hidden.
    let layout = RecordLayout::new(&a.doc, &BindingConfig::default());
    let txn = a.doc.transact();
    assert!(layout.is_tombstoned(&txn, "Race"));
    assert_eq!(layout.titles(&txn), vec!["Race".to_string()]);
    assert!(layout.load(&txn, "Race").is_none());
    assert!(layout.all_records(&txn).is_empty());
    drop(txn);
    assert!(a.binding.verify().unwrap_err().is_invariant_violation());
}

#[test]
fn test_verify_detects_title_mismatch() {
    let doc = Doc::with_client_id(1);
    let peer = Peer::with_doc(doc.clone(), BindingConfig::default());
    peer.save(&Record::new("Right"));

    let titles = doc.get_or_insert_array("titles");
    {
        let mut txn = doc.transact_mut();
        titles.remove_range(&mut txn, 0, 1);
        titles.insert(&mut txn, 0, "Wrong");
    }

    let err = peer.binding.verify().unwrap_err();
    assert!(err.is_invariant_violation());
}

#[test]
fn test_verify_detects_missing_container() {
    let doc = Doc::with_client_id(1);
    let peer = Peer::with_doc(doc.clone(), BindingConfig::default());

    let titles = doc.get_or_insert_array("titles");
    {
        let mut txn = doc.transact_mut();
        titles.push_back(&mut txn, "Orphan");
    }

    assert!(peer.binding.verify().unwrap_err().is_invariant_violation());
}

#[test]
fn test_save_refuses_title_without_container() {
    let doc = Doc::with_client_id(1);
    let peer = Peer::with_doc(doc.clone(), BindingConfig::default());

    let records = doc.get_or_insert_array("records");
    let titles = doc.get_or_insert_array("titles");
    {
        let mut txn = doc.transact_mut();
        records.push_back(&mut txn, "not a map");
        titles.push_back(&mut txn, "Broken");
    }

    let err = peer
        .binding
        .save_record(&Record::new("Broken").with_field("x", "1"))
        .unwrap_err();

    assert!(err.is_invariant_violation());
    assert_eq!(peer.binding.titles().unwrap(), vec!["Broken".to_string()]);
    assert_eq!(records.len(&doc.transact()), 1);
}
