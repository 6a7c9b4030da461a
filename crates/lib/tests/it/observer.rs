//! Remote change delivery tests
//!
//! Peer transactions must reach the host store as full record snapshots and
//! deletions, exactly once per affected record, while the binding's own
//! transactions never echo back.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use recordsync::{
    BindingConfig, HostStore, Record, SyncBinding,
    y_crdt::{Array, Doc, Map, MapPrelim, Transact},
};

use crate::helpers::*;

#[test]
fn test_remote_create_delivers_snapshot() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    let record = Record::new("Shared").with_field("text", "hi").with_field("tag", "x");

    a.save(&record);
    sync(&a.doc, &b.doc);

    assert_eq!(b.host.updates(), vec![record.clone()]);
    assert_eq!(b.load("Shared"), Some(record));
    assert!(a.host.updates().is_empty());
}

#[test]
fn test_remote_field_edit_delivers_full_snapshot() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    a.save(&Record::new("Doc").with_field("one", "1").with_field("two", "2"));
    sync(&a.doc, &b.doc);
    b.host.clear();

    a.save(&Record::new("Doc").with_field("one", "1").with_field("two", "22"));
    sync(&a.doc, &b.doc);

    let updates = b.host.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].field("one"), Some("1"));
    assert_eq!(updates[0].field("two"), Some("22"));
}

#[test]
fn test_remote_rich_text_edit_delivers_snapshot() {
    let a = Peer::with_config(1, rich_text_config());
    let b = Peer::with_config(2, rich_text_config());
    a.save(&Record::new("Essay").with_field("text", "first draft"));
    sync(&a.doc, &b.doc);
    b.host.clear();

    a.save(&Record::new("Essay").with_field("text", "second draft"));
    sync(&a.doc, &b.doc);

    let last = b.host.last_update().unwrap();
    assert_eq!(last.title(), "Essay");
    assert_eq!(last.field("text"), Some("second draft"));
}

#[test]
fn test_remote_delete_reaches_host() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    a.save(&Record::new("Doomed").with_field("x", "1"));
    sync(&a.doc, &b.doc);

    a.delete("Doomed");
    sync(&a.doc, &b.doc);

    assert_eq!(b.host.deletes(), vec!["Doomed".to_string()]);
    assert_eq!(b.load("Doomed"), None);
    assert!(a.host.deletes().is_empty());
}

#[test]
fn test_concurrent_disjoint_edits_merge_into_one_snapshot() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    let c = Peer::new(3);
    let base = Record::new("Merged").with_field("left", "0").with_field("right", "0");
    a.save(&base);
    sync(&a.doc, &b.doc);
    sync(&a.doc, &c.doc);
    c.host.clear();

    a.save(&base.clone().with_field("left", "a"));
    b.save(&base.clone().with_field("right", "b"));
    let from_a = missing_update(&a.doc, &c.doc);
    let from_b = missing_update(&b.doc, &c.doc);
    apply_updates(&c.doc, &[from_a, from_b]);

    let updates = c.host.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].field("left"), Some("a"));
    assert_eq!(updates[0].field("right"), Some("b"));
}

#[test]
fn test_each_touched_record_delivered_once_per_batch() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    for title in ["x", "y", "z"] {
        a.save(&Record::new(title).with_field("v", "0"));
    }
    sync(&a.doc, &b.doc);
    assert_eq!(b.host.updates().len(), 3);
    b.host.clear();

    a.save(&Record::new("x").with_field("v", "1"));
    a.save(&Record::new("z").with_field("v", "1"));
    sync(&a.doc, &b.doc);

    let mut titles: Vec<String> = b
        .host
        .updates()
        .iter()
        .map(|record| record.title().to_string())
        .collect();
    titles.sort();
    assert_eq!(titles, vec!["x".to_string(), "z".to_string()]);
}

#[test]
fn test_untagged_local_transaction_is_treated_as_remote() {
    let peer = Peer::new(1);
    let records = peer.doc.get_or_insert_array("records");
    let titles = peer.doc.get_or_insert_array("titles");
    {
        let mut txn = peer.doc.transact_mut();
        let container = records.push_back(&mut txn, MapPrelim::default());
        container.insert(&mut txn, "title", "Injected");
        container.insert(&mut txn, "body", "from elsewhere");
        titles.push_back(&mut txn, "Injected");
    }

    let updates = peer.host.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].title(), "Injected");
    assert_eq!(updates[0].field("body"), Some("from elsewhere"));
}

#[test]
fn test_panicking_host_does_not_break_observer() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    b.host.set_panic_on_update(true);

    a.save(&Record::new("First").with_field("x", "1"));
    sync(&a.doc, &b.doc);
    assert!(b.host.updates().is_empty());

    b.host.set_panic_on_update(false);
    a.save(&Record::new("Second").with_field("x", "2"));
    sync(&a.doc, &b.doc);

    let updates = b.host.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].title(), "Second");
    // The document itself still holds both records.
    assert!(b.load("First").is_some());
}

#[test]
fn test_rich_and_plain_peers_exchange_flat_values() {
    let a = Peer::with_config(1, rich_text_config());
    let b = Peer::with_config(2, BindingConfig::default());
    a.save(&Record::new("Mixed").with_field("text", "rich").with_field("n", "1"));
    sync(&a.doc, &b.doc);

    let snapshot = b.host.last_update().unwrap();
    assert_eq!(snapshot.field("text"), Some("rich"));
    assert_eq!(snapshot.field("n"), Some("1"));

    let records = b.doc.get_or_insert_array("records");
    let txn = b.doc.transact();
    assert_eq!(records.len(&txn), 1);
}

/// Host that calls back into its own binding when a peer update arrives.
#[derive(Default)]
struct CallbackHost {
    binding: OnceLock<Weak<SyncBinding>>,
    loads: Mutex<Vec<Result<Option<Record>, String>>>,
    save_noops: Mutex<Vec<bool>>,
    transaction_errors: Mutex<Vec<bool>>,
}

impl HostStore for CallbackHost {
    fn enqueue_reload(&self, _title: &str) {}

    fn add_or_update_record(&self, record: Record) {
        let Some(binding) = self.binding.get().and_then(Weak::upgrade) else {
            return;
        };
        let loaded = binding.load_record(record.title());
        if let Err(e) = &loaded {
            self.transaction_errors.lock().unwrap().push(e.is_transaction_error());
        }
        self.loads
            .lock()
            .unwrap()
            .push(loaded.map_err(|e| e.to_string()));
        let saved = binding.save_record(&record.with_field("echo", "1"));
        self.save_noops
            .lock()
            .unwrap()
            .push(saved.map(|outcome| outcome.is_noop()).unwrap_or(false));
    }

    fn delete_record(&self, _title: &str) {}
}

#[test]
fn test_host_callbacks_cannot_reenter_binding() {
    let a = Peer::new(1);
    let host = Arc::new(CallbackHost::default());
    let doc = Doc::with_client_id(2);
    let binding = Arc::new(
        SyncBinding::builder()
            .document(doc.clone())
            .host(host.clone())
            .build()
            .unwrap(),
    );
    host.binding.set(Arc::downgrade(&binding)).unwrap();

    a.save(&Record::new("Remote").with_field("x", "1"));
    sync(&a.doc, &doc);

    // Reads fail while the remote transaction commits; writes are skipped.
    assert_eq!(host.loads.lock().unwrap().len(), 1);
    assert!(host.loads.lock().unwrap()[0].is_err());
    assert_eq!(*host.transaction_errors.lock().unwrap(), vec![true]);
    assert_eq!(*host.save_noops.lock().unwrap(), vec![true]);

    // Once the commit is over the record is readable and was not rewritten.
    let loaded = binding.load_record("Remote").unwrap().unwrap();
    assert_eq!(loaded.field("echo"), None);
    assert_eq!(loaded.field("x"), Some("1"));
}
