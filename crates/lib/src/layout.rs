//! Record layout inside the replicated document.
//!
//! Records live in three root arrays of one [`Doc`]:
//!
//! * `records`: one map (record container) per live record;
//! * `titles`: the title of each record, index-aligned with `records`;
//! * `tombstones`: titles of deleted records.
//!
//! [`RecordLayout`] owns handles to the three arrays and provides the read
//! side of the binding: title lookup, field access, snapshots, and the
//! [`load`](RecordLayout::load) operation. Writes go through
//! [`LocalWriter`](crate::LocalWriter) and [`LocalDeleter`](crate::LocalDeleter).

use std::collections::{BTreeMap, HashSet};

use yrs::{Any, Array, ArrayRef, Doc, Map, MapRef, Out, ReadTxn};

use crate::binding::BindingError;
use crate::record::{FieldPolicy, FieldValue, Record, TITLE_FIELD};
use crate::{BindingConfig, TextReconciler};

/// Handles to the three root arrays plus the field policy used to read and
/// write record containers.
#[derive(Debug, Clone)]
pub struct RecordLayout {
    pub(crate) records: ArrayRef,
    pub(crate) titles: ArrayRef,
    pub(crate) tombstones: ArrayRef,
    pub(crate) policy: FieldPolicy,
    pub(crate) reconciler: TextReconciler,
}

impl RecordLayout {
    /// Get or create the root arrays named in `config`.
    pub fn new(doc: &Doc, config: &BindingConfig) -> Self {
        Self {
            records: doc.get_or_insert_array(config.records_root.as_str()),
            titles: doc.get_or_insert_array(config.titles_root.as_str()),
            tombstones: doc.get_or_insert_array(config.tombstones_root.as_str()),
            policy: config.field_policy(),
            reconciler: TextReconciler::new(doc.offset_kind()),
        }
    }

    /// Replace the field policy derived from the config.
    pub fn with_policy(mut self, policy: FieldPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn records(&self) -> &ArrayRef {
        &self.records
    }

    pub fn titles_array(&self) -> &ArrayRef {
        &self.titles
    }

    pub fn tombstones_array(&self) -> &ArrayRef {
        &self.tombstones
    }

    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    /// Index of the first live record titled `title`.
    pub fn index_of<T: ReadTxn>(&self, txn: &T, title: &str) -> Option<u32> {
        position(&self.titles, txn, title)
    }

    /// Every index holding `title` in the live index, ascending.
    ///
    /// More than one entry only appears when peers concurrently created the
    /// same title.
    pub fn indices_of<T: ReadTxn>(&self, txn: &T, title: &str) -> Vec<u32> {
        positions(&self.titles, txn, title)
    }

    /// Every index holding `title` in the tombstone array, ascending.
    pub fn tombstone_indices<T: ReadTxn>(&self, txn: &T, title: &str) -> Vec<u32> {
        positions(&self.tombstones, txn, title)
    }

    pub fn is_tombstoned<T: ReadTxn>(&self, txn: &T, title: &str) -> bool {
        position(&self.tombstones, txn, title).is_some()
    }

    /// Live titles in index order.
    pub fn titles<T: ReadTxn>(&self, txn: &T) -> Vec<String> {
        strings(&self.titles, txn)
    }

    /// Tombstoned titles in insertion order, without duplicates.
    pub fn tombstones<T: ReadTxn>(&self, txn: &T) -> Vec<String> {
        let mut seen = HashSet::new();
        strings(&self.tombstones, txn)
            .into_iter()
            .filter(|title| seen.insert(title.clone()))
            .collect()
    }

    /// Record container at `index`.
    pub fn container<T: ReadTxn>(&self, txn: &T, index: u32) -> Option<MapRef> {
        match self.records.get(txn, index)? {
            Out::YMap(map) => Some(map),
            _ => None,
        }
    }

    /// Read one field of a container as a [`FieldValue`].
    pub fn field_value<T: ReadTxn>(&self, txn: &T, container: &MapRef, name: &str) -> Option<FieldValue> {
        match container.get(txn, name)? {
            Out::YText(text) => Some(FieldValue::RichText(text)),
            Out::Any(Any::String(value)) => Some(FieldValue::Plain(value.to_string())),
            other => Some(FieldValue::Plain(other.to_string(txn))),
        }
    }

    /// Flattened snapshot of the container at `index`.
    ///
    /// The title comes from the container's title field, or from the parallel
    /// title array when the container has none.
    pub fn snapshot<T: ReadTxn>(&self, txn: &T, index: u32) -> Option<Record> {
        let container = self.container(txn, index)?;
        let fields: BTreeMap<String, String> = container
            .iter(txn)
            .map(|(name, value)| (name.to_string(), value.to_string(txn)))
            .collect();
        let fallback = match self.titles.get(txn, index) {
            Some(title) => title.to_string(txn),
            None => String::new(),
        };
        Some(Record::from_flat(fields, &fallback))
    }

    /// Snapshot of the record titled `title`.
    ///
    /// Returns `None` when the title is tombstoned or not in the live index.
    pub fn load<T: ReadTxn>(&self, txn: &T, title: &str) -> Option<Record> {
        if self.is_tombstoned(txn, title) {
            return None;
        }
        let index = self.index_of(txn, title)?;
        self.snapshot(txn, index)
    }

    /// Snapshots of every live, non-tombstoned record in index order.
    pub fn all_records<T: ReadTxn>(&self, txn: &T) -> Vec<Record> {
        let tombstoned: HashSet<String> = strings(&self.tombstones, txn).into_iter().collect();
        (0..self.records.len(txn))
            .filter_map(|index| self.snapshot(txn, index))
            .filter(|record| !tombstoned.contains(record.title()))
            .collect()
    }

    /// Check index parity, title uniqueness, and tombstone disjointness.
    pub fn verify<T: ReadTxn>(&self, txn: &T) -> Result<(), BindingError> {
        let records = self.records.len(txn);
        let titles = self.titles(txn);
        if records as usize != titles.len() {
            return Err(BindingError::InvariantViolation(format!(
                "{records} record containers but {} titles",
                titles.len()
            )));
        }

        let mut seen = HashSet::new();
        for title in &titles {
            if !seen.insert(title.as_str()) {
                return Err(BindingError::InvariantViolation(format!(
                    "title '{title}' appears more than once in the live index"
                )));
            }
        }

        for title in strings(&self.tombstones, txn) {
            if seen.contains(title.as_str()) {
                return Err(BindingError::InvariantViolation(format!(
                    "title '{title}' is both live and tombstoned"
                )));
            }
        }

        for (index, title) in titles.iter().enumerate() {
            let container = self.container(txn, index as u32).ok_or_else(|| {
                BindingError::InvariantViolation(format!("no record container at index {index}"))
            })?;
            if let Some(stored) = self.field_value(txn, &container, TITLE_FIELD) {
                let stored = stored.flatten(txn);
                if &stored != title {
                    return Err(BindingError::InvariantViolation(format!(
                        "container {index} is titled '{stored}' but indexed as '{title}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn string_at(value: Out) -> Option<String> {
    match value {
        Out::Any(Any::String(s)) => Some(s.to_string()),
        _ => None,
    }
}

fn strings<T: ReadTxn>(array: &ArrayRef, txn: &T) -> Vec<String> {
    array.iter(txn).filter_map(string_at).collect()
}

fn position<T: ReadTxn>(array: &ArrayRef, txn: &T, title: &str) -> Option<u32> {
    array
        .iter(txn)
        .position(|value| matches!(value, Out::Any(Any::String(ref s)) if &**s == title))
        .map(|index| index as u32)
}

fn positions<T: ReadTxn>(array: &ArrayRef, txn: &T, title: &str) -> Vec<u32> {
    array
        .iter(txn)
        .enumerate()
        .filter(|(_, value)| matches!(value, Out::Any(Any::String(s)) if &**s == title))
        .map(|(index, _)| index as u32)
        .collect()
}
