//! Translation of peer-originated document events into host store mutations.
//!
//! Both observers first compare the transaction origin with the binding's
//! [`OriginTag`] and drop echoes of the binding's own writes. Remaining batches
//! are handled under the binding's [`ReentrancyGuard`]; any error is logged and
//! swallowed so a malformed event never tears down the subscription.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use yrs::types::array::ArrayEvent;
use yrs::types::{Change, Event, Events, PathSegment};
use yrs::{DeepObservable, Observable, Subscription, TransactionMut};

use crate::guard::{ReentrancyGuard, panic_message};
use crate::host::HostStore;
use crate::layout::RecordLayout;
use crate::origin::OriginTag;

/// Pushes full record snapshots to the host for every container touched by a
/// peer transaction.
pub struct RemoteChangeObserver {
    layout: RecordLayout,
    origin: OriginTag,
    guard: Arc<ReentrancyGuard>,
    host: Arc<dyn HostStore>,
}

impl RemoteChangeObserver {
    pub fn new(
        layout: RecordLayout,
        origin: OriginTag,
        guard: Arc<ReentrancyGuard>,
        host: Arc<dyn HostStore>,
    ) -> Self {
        Self {
            layout,
            origin,
            guard,
            host,
        }
    }

    /// Deep-observe the record array. Dropping the subscription detaches.
    pub fn attach(self: Arc<Self>) -> Subscription {
        let records = self.layout.records.clone();
        records.observe_deep(move |txn, events| {
            self.handle(txn, events);
        })
    }

    /// Handle one batch of record events.
    ///
    /// Returns the number of snapshots delivered to the host.
    pub fn handle(&self, txn: &TransactionMut, events: &Events) -> usize {
        if self.origin.matches(txn.origin()) {
            tracing::trace!("Ignoring echo of own record transaction");
            return 0;
        }

        let delivered = self.guard.run(|| {
            contained("remote record change", || self.deliver(txn, events))
        });

        delivered.flatten().unwrap_or_else(|| {
            tracing::debug!("Remote record batch skipped");
            0
        })
    }

    fn deliver(&self, txn: &TransactionMut, events: &Events) -> usize {
        let mut delivered = 0;
        for index in affected_indices(txn, events.iter()) {
            match self.layout.snapshot(txn, index) {
                Some(record) => {
                    tracing::debug!(title = %record.title(), index, "Delivering remote record change");
                    self.host.add_or_update_record(record);
                    delivered += 1;
                }
                None => tracing::warn!(index, "Remote event refers to a missing record container"),
            }
        }
        delivered
    }
}

/// Distinct container indices touched by a batch of events observed on the
/// record array.
///
/// Structural events on the array itself contribute the indices of inserted
/// containers; nested events contribute the leading index of their path.
pub(crate) fn affected_indices<'a>(
    txn: &TransactionMut,
    events: impl Iterator<Item = &'a Event>,
) -> BTreeSet<u32> {
    let mut indices = BTreeSet::new();
    for event in events {
        let path = event.path();
        match path.front() {
            Some(PathSegment::Index(index)) => {
                indices.insert(*index);
            }
            Some(PathSegment::Key(key)) => {
                tracing::warn!(key = %key, "Unexpected keyed path on record array event");
            }
            None => {
                if let Event::Array(array_event) = event {
                    inserted_indices(txn, array_event, &mut indices);
                }
            }
        }
    }
    indices
}

fn inserted_indices(txn: &TransactionMut, event: &ArrayEvent, indices: &mut BTreeSet<u32>) {
    let mut cursor = 0u32;
    for change in event.delta(txn) {
        match change {
            Change::Retain(n) => cursor += *n,
            Change::Added(values) => {
                let len = values.len() as u32;
                indices.extend(cursor..cursor + len);
                cursor += len;
            }
            Change::Removed(_) => {}
        }
    }
}

/// Deletes host records whose titles a peer tombstoned.
pub struct TombstoneObserver {
    layout: RecordLayout,
    origin: OriginTag,
    guard: Arc<ReentrancyGuard>,
    host: Arc<dyn HostStore>,
}

impl TombstoneObserver {
    pub fn new(
        layout: RecordLayout,
        origin: OriginTag,
        guard: Arc<ReentrancyGuard>,
        host: Arc<dyn HostStore>,
    ) -> Self {
        Self {
            layout,
            origin,
            guard,
            host,
        }
    }

    /// Observe the tombstone array. Dropping the subscription detaches.
    pub fn attach(self: Arc<Self>) -> Subscription {
        let tombstones = self.layout.tombstones.clone();
        tombstones.observe(move |txn, event| {
            self.handle(txn, event);
        })
    }

    /// Handle one tombstone batch. Returns the number of host deletions issued.
    pub fn handle(&self, txn: &TransactionMut, event: &ArrayEvent) -> usize {
        if self.origin.matches(txn.origin()) {
            tracing::trace!("Ignoring echo of own tombstone transaction");
            return 0;
        }

        let deleted = self.guard.run(|| {
            contained("remote deletion", || self.deliver(txn, event))
        });

        deleted.flatten().unwrap_or_else(|| {
            tracing::debug!("Remote tombstone batch skipped");
            0
        })
    }

    fn deliver(&self, txn: &TransactionMut, event: &ArrayEvent) -> usize {
        let mut deleted = 0;
        for change in event.delta(txn) {
            if let Change::Added(values) = change {
                for value in values {
                    let title = value.clone().to_string(txn);
                    tracing::debug!(title = %title, "Delivering remote deletion");
                    self.host.delete_record(&title);
                    deleted += 1;
                }
            }
        }
        deleted
    }
}

/// Run a host-facing handler, logging instead of propagating a panic.
pub(crate) fn contained<R>(what: &str, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(handler = what, error = %message, "Observer handler failed");
            None
        }
    }
}
