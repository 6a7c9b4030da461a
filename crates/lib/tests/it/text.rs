//! Rich-text reconciliation tests
//!
//! Applies edit scripts to real shared texts and checks that concurrent
//! edits to different regions of one field merge at character level.

use rand::{Rng, SeedableRng, rngs::StdRng};
use recordsync::{
    BindingConfig, FieldValue, Record, SyncBinding, TextError, TextOp, TextReconciler,
    y_crdt::{
        Any, Doc, GetString, OffsetKind, Options, Out, Text, TextRef, Transact,
        branch::{Branch, BranchID},
        types::{Attrs, text::YChange},
    },
};

use crate::helpers::*;

#[test]
fn test_reconcile_applies_minimal_edit() {
    let doc = Doc::new();
    let text = doc.get_or_insert_text("body");
    let reconciler = TextReconciler::default();
    let mut txn = doc.transact_mut();
    text.insert(&mut txn, 0, "hello");

    let ops = reconciler.reconcile(&mut txn, &text, "hello world").unwrap();

    assert_eq!(ops, vec![TextOp::Retain(5), TextOp::Insert(" world".into())]);
    assert_eq!(text.get_string(&txn), "hello world");
}

/// Shared text stored under `field` of record `title`, with its branch id.
fn stored_text(binding: &SyncBinding, title: &str, field: &str) -> (TextRef, BranchID) {
    let layout = binding.layout();
    let txn = binding.document().transact();
    let index = layout.index_of(&txn, title).unwrap();
    let container = layout.container(&txn, index).unwrap();
    match layout.field_value(&txn, &container, field) {
        Some(FieldValue::RichText(text)) => {
            let id = AsRef::<Branch>::as_ref(&text).id();
            (text, id)
        }
        _ => panic!("{field} of {title} is not stored as rich text"),
    }
}

#[test]
fn test_save_edits_rich_field_in_place() {
    let peer = Peer::with_config(1, rich_text_config());
    peer.save(&Record::new("Greeting").with_field("text", "hello"));
    let (_, before) = stored_text(&peer.binding, "Greeting", "text");

    let outcome = peer
        .binding
        .save_record(&Record::new("Greeting").with_field("text", "hello world"))
        .unwrap();

    assert_eq!(outcome.rich_fields_edited, 1);
    assert_eq!(outcome.plain_fields_written, 0);
    assert!(!outcome.created);
    let (text, after) = stored_text(&peer.binding, "Greeting", "text");
    assert!(before == after, "rich field was replaced instead of edited");
    assert_eq!(text.get_string(&peer.doc.transact()), "hello world");
}

#[test]
fn test_save_edits_rich_field_with_utf16_offsets() {
    let options = Options {
        offset_kind: OffsetKind::Utf16,
        ..Options::default()
    };
    let peer = Peer::with_doc(Doc::with_options(options), rich_text_config());
    peer.save(&Record::new("Emoji").with_field("text", "a😀b😀c"));

    peer.save(&Record::new("Emoji").with_field("text", "a😀B😀c!"));

    assert_eq!(peer.load("Emoji").unwrap().field("text"), Some("a😀B😀c!"));
}

#[test]
fn test_reconcile_unchanged_is_empty() {
    let doc = Doc::new();
    let text = doc.get_or_insert_text("body");
    let reconciler = TextReconciler::default();
    let mut txn = doc.transact_mut();
    text.insert(&mut txn, 0, "same");

    assert!(reconciler.reconcile(&mut txn, &text, "same").unwrap().is_empty());
    assert_eq!(reconciler.apply(&mut txn, &text, &[]).unwrap(), 0);
}

#[test]
fn test_apply_rejects_script_past_end() {
    let doc = Doc::new();
    let text = doc.get_or_insert_text("body");
    let reconciler = TextReconciler::default();
    let mut txn = doc.transact_mut();
    text.insert(&mut txn, 0, "abc");

    let err = reconciler
        .apply(&mut txn, &text, &[TextOp::Retain(2), TextOp::Delete(5)])
        .unwrap_err();

    assert!(matches!(err, TextError::OutOfBounds { position: 7, length: 3 }));
    assert_eq!(text.get_string(&txn), "abc");
}

#[test]
fn test_formatting_outside_edit_survives() {
    let doc = Doc::new();
    let text = doc.get_or_insert_text("body");
    let reconciler = TextReconciler::default();
    let mut txn = doc.transact_mut();
    text.insert(&mut txn, 0, "hello world");
    let bold = Attrs::from([("bold".into(), Any::Bool(true))]);
    text.format(&mut txn, 0, 5, bold.clone());

    reconciler
        .reconcile(&mut txn, &text, "hello brave world")
        .unwrap();

    assert_eq!(text.get_string(&txn), "hello brave world");
    let chunks = text.diff(&txn, YChange::identity);
    let first = &chunks[0];
    assert!(matches!(&first.insert, Out::Any(Any::String(s)) if s.as_ref() == "hello"));
    assert_eq!(first.attributes.as_deref(), Some(&bold));
}

#[test]
fn test_utf16_offsets_with_astral_characters() {
    let options = Options {
        offset_kind: OffsetKind::Utf16,
        ..Options::default()
    };
    let doc = Doc::with_options(options);
    let text = doc.get_or_insert_text("body");
    let reconciler = TextReconciler::new(OffsetKind::Utf16);
    let mut txn = doc.transact_mut();
    text.insert(&mut txn, 0, "a😀b😀c");

    reconciler.reconcile(&mut txn, &text, "a😀B😀c!").unwrap();

    assert_eq!(text.get_string(&txn), "a😀B😀c!");
}

#[test]
fn test_byte_offsets_with_multibyte_characters() {
    let doc = Doc::new();
    let text = doc.get_or_insert_text("body");
    let reconciler = TextReconciler::new(OffsetKind::Bytes);
    let mut txn = doc.transact_mut();
    text.insert(&mut txn, 0, "naïve café");

    reconciler.reconcile(&mut txn, &text, "naïf cafés").unwrap();

    assert_eq!(text.get_string(&txn), "naïf cafés");
}

#[test]
fn test_random_pairs_converge() {
    let mut rng = StdRng::seed_from_u64(0x7e47);
    let alphabet: Vec<char> = "xy zé😀\n".chars().collect();
    let doc = Doc::new();
    let text = doc.get_or_insert_text("body");
    let reconciler = TextReconciler::default();

    for _ in 0..100 {
        let target: String = (0..rng.gen_range(0..30))
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();
        let mut txn = doc.transact_mut();
        reconciler.reconcile(&mut txn, &text, &target).unwrap();
        assert_eq!(text.get_string(&txn), target);
    }
}

#[test]
fn test_concurrent_edits_to_one_field_merge() {
    let a = Peer::with_config(1, rich_text_config());
    let b = Peer::with_config(2, rich_text_config());
    a.save(&Record::new("Story").with_field("text", "hello world"));
    sync(&a.doc, &b.doc);

    a.save(&Record::new("Story").with_field("text", "hello brave world"));
    b.save(&Record::new("Story").with_field("text", "hello world!"));
    sync_both(&a.doc, &b.doc);

    let expected = Some("hello brave world!");
    assert_eq!(a.load("Story").unwrap().field("text"), expected);
    assert_eq!(b.load("Story").unwrap().field("text"), expected);
    assert_eq!(b.host.last_update().unwrap().field("text"), expected);
}

#[test]
fn test_prefix_policy_marks_fields_rich() {
    let config = BindingConfig::default().with_rich_text_prefix("rt_");
    let a = Peer::with_config(1, config.clone());
    let b = Peer::with_config(2, config);
    a.save(&Record::new("Prefixed").with_field("rt_body", "one two"));
    sync(&a.doc, &b.doc);

    a.save(&Record::new("Prefixed").with_field("rt_body", "zero one two"));
    b.save(&Record::new("Prefixed").with_field("rt_body", "one two three"));
    sync_both(&a.doc, &b.doc);

    assert_eq!(
        a.load("Prefixed").unwrap().field("rt_body"),
        Some("zero one two three")
    );
}

#[test]
fn test_plain_fields_resolve_last_writer_wins() {
    let a = Peer::new(1);
    let b = Peer::new(2);
    a.save(&Record::new("Plain").with_field("body", "base"));
    sync(&a.doc, &b.doc);

    a.save(&Record::new("Plain").with_field("body", "from a"));
    b.save(&Record::new("Plain").with_field("body", "from b"));
    sync_both(&a.doc, &b.doc);

    let merged = a.load("Plain").unwrap();
    assert_eq!(merged, b.load("Plain").unwrap());
    let body = merged.field("body").unwrap();
    assert!(body == "from a" || body == "from b");
}
