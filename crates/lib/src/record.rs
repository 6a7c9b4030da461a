//! Host-side record model and field classification.
//!
//! A [`Record`] is what the host store hands to the binding and what the
//! binding hands back: a title plus string-valued fields. Inside the replicated
//! document each field is either a plain scalar or a collaborative text; the
//! [`FieldPolicy`] decides which, and [`FieldValue`] is the tagged union read
//! back out of a record container.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::{Deserialize, Serialize};
use yrs::{GetString, ReadTxn, TextRef};

/// Name of the container field that mirrors the record title.
pub const TITLE_FIELD: &str = "title";

/// A titled record with string fields, ordered by field name.
///
/// The title is kept separately from the other fields; [`Record::fields`]
/// never contains [`TITLE_FIELD`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    title: String,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

impl Record {
    /// Create a record with no fields besides its title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Build a record from a flat field map that carries the title under
    /// [`TITLE_FIELD`]. Falls back to `fallback_title` when that field is missing.
    pub fn from_flat(mut fields: BTreeMap<String, String>, fallback_title: &str) -> Self {
        let title = fields
            .remove(TITLE_FIELD)
            .unwrap_or_else(|| fallback_title.to_string());
        Self { title, fields }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set a field. Setting [`TITLE_FIELD`] renames the record.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if name == TITLE_FIELD {
            self.title = value.into();
        } else {
            self.fields.insert(name, value.into());
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        name == TITLE_FIELD || self.fields.contains_key(name)
    }

    /// String value of a field, including the title.
    pub fn field(&self, name: &str) -> Option<&str> {
        if name == TITLE_FIELD {
            Some(&self.title)
        } else {
            self.fields.get(name).map(String::as_str)
        }
    }

    /// Fields other than the title.
    pub fn fields(&self) -> btree_map::Iter<'_, String, String> {
        self.fields.iter()
    }

    /// Number of fields other than the title.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// All fields, with the title under [`TITLE_FIELD`].
    pub fn to_flat(&self) -> BTreeMap<String, String> {
        let mut flat = self.fields.clone();
        flat.insert(TITLE_FIELD.to_string(), self.title.clone());
        flat
    }
}

/// Value of a single field as stored in a record container.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Scalar value replaced wholesale on change.
    Plain(String),
    /// Collaborative text edited with character-level operations.
    RichText(TextRef),
}

impl FieldValue {
    /// Flatten the value to its current string content.
    pub fn flatten<T: ReadTxn>(&self, txn: &T) -> String {
        match self {
            FieldValue::Plain(value) => value.clone(),
            FieldValue::RichText(text) => text.get_string(txn),
        }
    }

    pub fn is_rich_text(&self) -> bool {
        matches!(self, FieldValue::RichText(_))
    }
}

/// Decides which fields are stored as collaborative text.
///
/// Two independent predicates are supported: an explicit list of field names
/// and a field-name prefix. A field is rich text when either predicate
/// matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPolicy {
    rich_fields: Vec<String>,
    rich_prefix: Option<String>,
}

impl FieldPolicy {
    /// Policy that treats every field as plain.
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn new(rich_fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            rich_fields: rich_fields.into_iter().map(Into::into).collect(),
            rich_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.rich_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Whether `name` appears in the explicit rich-text list.
    pub fn is_declared(&self, name: &str) -> bool {
        self.rich_fields.iter().any(|field| field == name)
    }

    /// Whether `name` matches the rich-text prefix rule.
    pub fn matches_prefix(&self, name: &str) -> bool {
        self.rich_prefix
            .as_deref()
            .is_some_and(|prefix| name.starts_with(prefix))
    }

    pub fn is_rich_text(&self, name: &str) -> bool {
        name != TITLE_FIELD && (self.is_declared(name) || self.matches_prefix(name))
    }
}
