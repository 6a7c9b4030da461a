//! The sync binding: orchestrates local writes, remote observers and presence.
//!
//! A [`SyncBinding`] ties one host record store to one replicated [`Doc`].
//! Local mutations enter through [`save`](SyncBinding::save) and
//! [`delete`](SyncBinding::delete), each producing exactly one document
//! transaction tagged with the binding's [`OriginTag`]. Peer mutations arrive
//! as document events and are forwarded to the host by the
//! [`RemoteChangeObserver`] and [`TombstoneObserver`] registered at build time.
//!
//! The callback-style methods follow the host store's lifecycle contract:
//! every outcome, including panics inside the binding, is reported through the
//! callback and never escapes the call. The `*_record` variants return the
//! same outcome as a [`Result`] for Rust callers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use recordsync::{HostStore, Record, SyncBinding, y_crdt::Doc};
//!
//! struct Host;
//!
//! impl HostStore for Host {
//!     fn enqueue_reload(&self, _title: &str) {}
//!     fn add_or_update_record(&self, _record: Record) {}
//!     fn delete_record(&self, _title: &str) {}
//! }
//!
//! let binding = SyncBinding::builder()
//!     .document(Doc::new())
//!     .host(Arc::new(Host))
//!     .build()
//!     .unwrap();
//!
//! binding.save(&Record::new("Hello").with_field("text", "world"), |result| {
//!     assert!(result.is_ok());
//! });
//! binding.load("Hello", |result| {
//!     let record = result.unwrap().unwrap();
//!     assert_eq!(record.field("text"), Some("world"));
//! });
//! ```

mod errors;

pub use errors::BindingError;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use yrs::{Doc, Subscription, Transact, TransactionMut};

use crate::guard::{ReentrancyGuard, lock, panic_message};
use crate::host::HostStore;
use crate::layout::RecordLayout;
use crate::local::{DeleteOutcome, LocalDeleter, LocalWriter, WriteOutcome};
use crate::observer::{RemoteChangeObserver, TombstoneObserver};
use crate::origin::OriginTag;
use crate::presence::{
    Awareness, CursorOverlay, CursorRenderer, NoopCursorRenderer, PresenceChange,
    PresenceSubscription,
};
use crate::record::{FieldPolicy, Record};
use crate::{BindingConfig, Result};

/// Builder for [`SyncBinding`].
#[derive(Default)]
pub struct SyncBindingBuilder {
    doc: Option<Doc>,
    host: Option<Arc<dyn HostStore>>,
    config: BindingConfig,
    policy: Option<FieldPolicy>,
    renderer: Option<Arc<dyn CursorRenderer>>,
}

impl SyncBindingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The replicated document to bind. Required.
    pub fn document(mut self, doc: Doc) -> Self {
        self.doc = Some(doc);
        self
    }

    /// The host record store. Required.
    pub fn host(mut self, host: Arc<dyn HostStore>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn config(mut self, config: BindingConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the rich-text policy derived from the config.
    pub fn field_policy(mut self, policy: FieldPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Renderer for peer cursors. Defaults to [`NoopCursorRenderer`].
    pub fn cursor_renderer(mut self, renderer: Arc<dyn CursorRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Validate the inputs, register the document observers, and return the
    /// binding.
    ///
    /// Fails before registering anything when the document or host is missing
    /// or the config is invalid.
    pub fn build(self) -> Result<SyncBinding> {
        let doc = self.doc.ok_or(BindingError::MissingDocument)?;
        let host = self.host.ok_or(BindingError::MissingHost)?;
        self.config.validate()?;

        let mut layout = RecordLayout::new(&doc, &self.config);
        if let Some(policy) = self.policy {
            layout = layout.with_policy(policy);
        }

        let origin = OriginTag::new();
        let guard = Arc::new(ReentrancyGuard::new());

        let remote = Arc::new(RemoteChangeObserver::new(
            layout.clone(),
            origin,
            guard.clone(),
            host.clone(),
        ));
        let tombstones = Arc::new(TombstoneObserver::new(
            layout.clone(),
            origin,
            guard.clone(),
            host.clone(),
        ));
        let subscriptions = vec![remote.attach(), tombstones.attach()];

        let overlay = Arc::new(CursorOverlay::new(
            doc.clone(),
            layout.records.clone(),
            origin,
            self.config.cursor_field.clone(),
            self.renderer.unwrap_or_else(|| Arc::new(NoopCursorRenderer)),
        ));

        tracing::info!(
            origin = %origin,
            records = %self.config.records_root,
            titles = %self.config.titles_root,
            tombstones = %self.config.tombstones_root,
            "Sync binding attached to document"
        );

        Ok(SyncBinding {
            doc,
            layout,
            host,
            origin,
            guard,
            config: self.config,
            subscriptions: Mutex::new(subscriptions),
            overlay,
            presence: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }
}

struct PresenceLink {
    awareness: Arc<dyn Awareness>,
    _subscription: PresenceSubscription,
}

/// Bidirectional binding between a host record store and a replicated document.
pub struct SyncBinding {
    doc: Doc,
    layout: RecordLayout,
    host: Arc<dyn HostStore>,
    origin: OriginTag,
    guard: Arc<ReentrancyGuard>,
    config: BindingConfig,
    subscriptions: Mutex<Vec<Subscription>>,
    overlay: Arc<CursorOverlay>,
    presence: Mutex<Option<PresenceLink>>,
    destroyed: AtomicBool,
}

impl SyncBinding {
    pub fn builder() -> SyncBindingBuilder {
        SyncBindingBuilder::new()
    }

    /// Origin attached to every transaction this binding issues.
    pub fn origin(&self) -> OriginTag {
        self.origin
    }

    pub fn document(&self) -> &Doc {
        &self.doc
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    /// Save `record` and report the outcome through `callback`.
    pub fn save(&self, record: &Record, callback: impl FnOnce(Result<()>)) {
        let result = boundary("save", || self.save_record(record).map(|_| ()));
        if let Err(e) = &result {
            tracing::error!(title = %record.title(), error = %e, "Save failed");
        }
        callback(result);
    }

    /// Load the record titled `title` and report it through `callback`.
    pub fn load(&self, title: &str, callback: impl FnOnce(Result<Option<Record>>)) {
        let result = boundary("load", || self.load_record(title));
        if let Err(e) = &result {
            tracing::error!(title = %title, error = %e, "Load failed");
        }
        callback(result);
    }

    /// Delete the record titled `title` and report the outcome through `callback`.
    pub fn delete(&self, title: &str, callback: impl FnOnce(Result<()>)) {
        let result = boundary("delete", || self.delete_record(title).map(|_| ()));
        if let Err(e) = &result {
            tracing::error!(title = %title, error = %e, "Delete failed");
        }
        callback(result);
    }

    /// Write `record` into the document in one self-tagged transaction.
    ///
    /// On a read-only host the write is turned into a reload request. A call
    /// made while the binding is already inside a write or observer is a no-op.
    pub fn save_record(&self, record: &Record) -> Result<WriteOutcome> {
        if self.host.is_read_only() {
            tracing::debug!(title = %record.title(), "Host is read-only; requesting reload instead of save");
            self.host.enqueue_reload(record.title());
            return Ok(WriteOutcome {
                redirected: true,
                ..WriteOutcome::default()
            });
        }

        let writer = LocalWriter::new(&self.layout, self.host.as_ref());
        match self
            .guard
            .run(|| self.transact("save", |txn| writer.write(txn, record)))
        {
            Some(result) => result,
            None => {
                tracing::debug!(title = %record.title(), "Save re-entered while binding is busy; ignored");
                Ok(WriteOutcome::default())
            }
        }
    }

    /// Snapshot of the record titled `title`, or `None` when it is absent or
    /// tombstoned.
    ///
    /// Fails with [`BindingError::TransactionUnavailable`] while a write
    /// transaction is open, including from inside [`HostStore`] callbacks.
    pub fn load_record(&self, title: &str) -> Result<Option<Record>> {
        let txn = self.read("load")?;
        Ok(self.layout.load(&txn, title))
    }

    /// Remove `title` from the live index and tombstone it in one self-tagged
    /// transaction. On a read-only host the delete becomes a reload request.
    pub fn delete_record(&self, title: &str) -> Result<DeleteOutcome> {
        if self.host.is_read_only() {
            tracing::debug!(title = %title, "Host is read-only; requesting reload instead of delete");
            self.host.enqueue_reload(title);
            return Ok(DeleteOutcome {
                redirected: true,
                ..DeleteOutcome::default()
            });
        }

        let deleter = LocalDeleter::new(&self.layout);
        match self
            .guard
            .run(|| self.transact("delete", |txn| Ok(deleter.delete(txn, title))))
        {
            Some(result) => result,
            None => {
                tracing::debug!(title = %title, "Delete re-entered while binding is busy; ignored");
                Ok(DeleteOutcome::default())
            }
        }
    }

    /// Live titles in index order.
    pub fn titles(&self) -> Result<Vec<String>> {
        let txn = self.read("titles")?;
        Ok(self.layout.titles(&txn))
    }

    /// Tombstoned titles.
    pub fn tombstones(&self) -> Result<Vec<String>> {
        let txn = self.read("tombstones")?;
        Ok(self.layout.tombstones(&txn))
    }

    /// Snapshots of every live record.
    pub fn records(&self) -> Result<Vec<Record>> {
        let txn = self.read("records")?;
        Ok(self.layout.all_records(&txn))
    }

    /// Deliver every live record to the host store.
    ///
    /// Used once after binding to a document that already holds records.
    /// Returns the number of records delivered.
    pub fn push_all_to_host(&self) -> Result<usize> {
        let records = self.records()?;
        let count = records.len();
        for record in records {
            self.host.add_or_update_record(record);
        }
        tracing::info!(count, "Pushed document records to host");
        Ok(count)
    }

    /// Check the document layout invariants.
    pub fn verify(&self) -> Result<()> {
        let txn = self.read("verify")?;
        Ok(self.layout.verify(&txn)?)
    }

    /// Attach a presence source, replacing any previous one.
    ///
    /// Cursors of already-connected peers are rendered immediately; later
    /// presence changes are applied as they arrive.
    pub fn set_awareness(&self, awareness: Arc<dyn Awareness>) {
        let previous = lock(&self.presence).take();
        if previous.is_some() {
            tracing::debug!("Detaching previous awareness");
        }
        drop(previous);
        self.overlay.clear();

        let local = awareness.client_id();
        self.overlay.sync_all(local, &awareness.states());

        let overlay = self.overlay.clone();
        let subscription = awareness.on_change(Arc::new(move |change: &PresenceChange| {
            overlay.apply_change(local, change)
        }));

        tracing::info!(client = local, "Awareness attached");
        *lock(&self.presence) = Some(PresenceLink {
            awareness,
            _subscription: subscription,
        });
    }

    /// Publish the local selection of record indices, or clear it with `None`.
    ///
    /// Returns whether a new value was published. Does nothing without an
    /// attached awareness.
    pub fn set_local_selection(&self, selection: Option<(u32, u32)>) -> bool {
        let awareness = match lock(&self.presence).as_ref() {
            Some(link) => link.awareness.clone(),
            None => return false,
        };
        self.overlay.publish_selection(awareness.as_ref(), selection)
    }

    /// Clients whose cursor is currently rendered.
    pub fn rendered_cursors(&self) -> Vec<u64> {
        self.overlay.rendered_clients()
    }

    /// Detach every document and presence subscription. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        drop(subscriptions);
        let presence = lock(&self.presence).take();
        drop(presence);
        self.overlay.clear();
        tracing::info!(origin = %self.origin, "Sync binding destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn transact<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut TransactionMut) -> Result<R>,
    ) -> Result<R> {
        let mut txn = self
            .doc
            .try_transact_mut_with(self.origin.to_origin())
            .map_err(|e| BindingError::TransactionUnavailable {
                operation,
                reason: e.to_string(),
            })?;
        f(&mut txn)
    }

    fn read(&self, operation: &'static str) -> Result<yrs::Transaction<'_>> {
        self.doc
            .try_transact()
            .map_err(|e| {
                BindingError::TransactionUnavailable {
                    operation,
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

impl Drop for SyncBinding {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Run a public operation, converting a panic into an error.
fn boundary<R>(operation: &'static str, f: impl FnOnce() -> Result<R>) -> Result<R> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(BindingError::Panicked {
            operation,
            message: panic_message(payload.as_ref()),
        }
        .into())
    })
}
