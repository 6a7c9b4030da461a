//! Translation of local record mutations into document edits.
//!
//! [`LocalWriter`] and [`LocalDeleter`] operate inside a transaction opened by
//! the caller; the binding opens exactly one origin-tagged transaction per
//! public save or delete so peers observe each mutation atomically.

use yrs::{Array, Map, MapPrelim, MapRef, TextPrelim, TransactionMut};

use crate::binding::BindingError;
use crate::host::HostStore;
use crate::layout::RecordLayout;
use crate::record::{FieldValue, Record, TITLE_FIELD};
use crate::Result;

/// Summary of the document mutations performed by a save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// A new container and title entry were appended.
    pub created: bool,
    /// The title was removed from the tombstones.
    pub undeleted: bool,
    /// Plain fields replaced.
    pub plain_fields_written: usize,
    /// Rich-text fields edited through the text reconciler.
    pub rich_fields_edited: usize,
    /// Fields dropped because the incoming record no longer has them.
    pub fields_removed: usize,
    /// The write was turned into a reload request because the host is read-only.
    pub redirected: bool,
}

impl WriteOutcome {
    /// True when the document was not touched.
    pub fn is_noop(&self) -> bool {
        !self.created
            && !self.undeleted
            && self.plain_fields_written == 0
            && self.rich_fields_edited == 0
            && self.fields_removed == 0
    }
}

/// Writes a host record into its record container.
pub struct LocalWriter<'a> {
    layout: &'a RecordLayout,
    host: &'a dyn HostStore,
}

impl<'a> LocalWriter<'a> {
    pub fn new(layout: &'a RecordLayout, host: &'a dyn HostStore) -> Self {
        Self { layout, host }
    }

    /// Bring the container for `record` in line with it.
    ///
    /// Fields whose content hash is unchanged are not touched, so saving an
    /// unchanged record performs no document mutation at all.
    pub fn write(&self, txn: &mut TransactionMut, record: &Record) -> Result<WriteOutcome> {
        let title = record.title();
        let mut outcome = WriteOutcome::default();

        let container = match self.layout.index_of(&*txn, title) {
            Some(index) => self.layout.container(&*txn, index).ok_or_else(|| {
                BindingError::InvariantViolation(format!(
                    "title {title:?} is indexed at {index} but that slot holds no record container"
                ))
            })?,
            None => {
                outcome.created = true;
                let container = self.layout.records.push_back(txn, MapPrelim::default());
                self.layout.titles.push_back(txn, title.to_string());
                container
            }
        };

        // Saving resurrects a deleted record.
        let tombstoned = self.layout.tombstone_indices(&*txn, title);
        for index in tombstoned.iter().rev() {
            self.layout.tombstones.remove_range(txn, *index, 1);
        }
        outcome.undeleted = !tombstoned.is_empty();

        let stale: Vec<String> = container
            .keys(&*txn)
            .filter(|name| *name != TITLE_FIELD && !record.has_field(name))
            .map(str::to_string)
            .collect();
        for name in &stale {
            container.remove(txn, name);
        }
        outcome.fields_removed = stale.len();

        if self.write_field(txn, &container, TITLE_FIELD, title, false)? {
            outcome.plain_fields_written += 1;
        }
        for (name, value) in record.fields() {
            let rich = self.layout.policy.is_rich_text(name);
            if self.write_field(txn, &container, name, value, rich)? {
                if rich {
                    outcome.rich_fields_edited += 1;
                } else {
                    outcome.plain_fields_written += 1;
                }
            }
        }

        tracing::debug!(
            title = %title,
            created = outcome.created,
            undeleted = outcome.undeleted,
            plain = outcome.plain_fields_written,
            rich = outcome.rich_fields_edited,
            removed = outcome.fields_removed,
            "Wrote record to document"
        );
        Ok(outcome)
    }

    /// Write one field if its content changed. Returns whether it was written.
    fn write_field(
        &self,
        txn: &mut TransactionMut,
        container: &MapRef,
        name: &str,
        value: &str,
        rich: bool,
    ) -> Result<bool> {
        let existing = self.layout.field_value(&*txn, container, name);
        if let Some(existing) = &existing {
            // A kind change is a write even when the content is equal.
            let stored = existing.flatten(&*txn);
            if existing.is_rich_text() == rich
                && self.host.content_hash(&stored) == self.host.content_hash(value)
            {
                return Ok(false);
            }
        }

        if rich {
            match existing {
                Some(FieldValue::RichText(text)) => {
                    let ops = self.layout.reconciler.reconcile(txn, &text, value)?;
                    tracing::trace!(field = name, ops = ops.len(), "Reconciled rich-text field");
                }
                _ => {
                    container.insert(txn, name, TextPrelim::new(value));
                    tracing::trace!(field = name, "Stored field as rich text");
                }
            }
        } else {
            container.insert(txn, name, value.to_string());
        }
        Ok(true)
    }
}

/// Summary of the document mutations performed by a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Number of live entries removed (more than one after concurrent creates).
    pub removed: usize,
    /// The title was appended to the tombstones.
    pub tombstoned: bool,
    /// The delete was turned into a reload request because the host is read-only.
    pub redirected: bool,
}

/// Removes a record from the live index and tombstones its title.
pub struct LocalDeleter<'a> {
    layout: &'a RecordLayout,
}

impl<'a> LocalDeleter<'a> {
    pub fn new(layout: &'a RecordLayout) -> Self {
        Self { layout }
    }

    pub fn delete(&self, txn: &mut TransactionMut, title: &str) -> DeleteOutcome {
        let indices = self.layout.indices_of(&*txn, title);
        for index in indices.iter().rev() {
            self.layout.records.remove_range(txn, *index, 1);
            self.layout.titles.remove_range(txn, *index, 1);
        }

        let tombstoned = !self.layout.is_tombstoned(&*txn, title);
        if tombstoned {
            self.layout.tombstones.push_back(txn, title.to_string());
        }

        tracing::debug!(title = %title, removed = indices.len(), tombstoned, "Deleted record from document");
        DeleteOutcome {
            removed: indices.len(),
            tombstoned,
            redirected: false,
        }
    }
}
