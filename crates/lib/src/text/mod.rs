//! Incremental reconciliation of collaborative text fields.
//!
//! Instead of replacing a rich-text field wholesale on every save, the binding
//! diffs the stored content against the incoming value and applies only the
//! changed regions to the shared [`TextRef`]. Concurrent edits made by peers
//! to other regions of the same text therefore merge at character level, and
//! formatting attached to untouched regions survives.

mod diff;
mod errors;

pub use diff::diff;
pub use errors::TextError;

use yrs::{GetString, OffsetKind, Text, TextRef, TransactionMut};

/// A single step of a text edit script.
///
/// Counts are in Unicode scalar values of the old (for [`Retain`](TextOp::Retain)
/// and [`Delete`](TextOp::Delete)) content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOp {
    Retain(usize),
    Insert(String),
    Delete(usize),
}

/// Computes and applies minimal edit scripts to shared text.
#[derive(Debug, Clone)]
pub struct TextReconciler {
    offset_kind: OffsetKind,
}

impl Default for TextReconciler {
    fn default() -> Self {
        Self::new(OffsetKind::Bytes)
    }
}

impl TextReconciler {
    /// Create a reconciler for a document using `offset_kind` for text indices.
    pub fn new(offset_kind: OffsetKind) -> Self {
        Self { offset_kind }
    }

    /// See [`diff`].
    pub fn diff(&self, old: &str, new: &str) -> Vec<TextOp> {
        diff(old, new)
    }

    /// Apply `ops` to `text` inside `txn`.
    ///
    /// The ops must describe an edit of the text's current content. Returns the
    /// number of mutating operations performed; an empty script touches nothing.
    pub fn apply(
        &self,
        txn: &mut TransactionMut,
        text: &TextRef,
        ops: &[TextOp],
    ) -> Result<usize, TextError> {
        if ops.is_empty() {
            return Ok(0);
        }

        let current = text.get_string(&*txn);
        let offsets = self.char_offsets(&current);
        let char_len = offsets.len() - 1;

        // Resolve every op against the original content before mutating.
        let mut edits = Vec::with_capacity(ops.len());
        let mut pos = 0usize;
        for op in ops {
            let end = match op {
                TextOp::Retain(n) | TextOp::Delete(n) => pos + n,
                TextOp::Insert(_) => pos,
            };
            if end > char_len {
                return Err(TextError::OutOfBounds {
                    position: end,
                    length: char_len,
                });
            }
            match op {
                TextOp::Retain(_) => {}
                TextOp::Delete(_) => edits.push(ResolvedEdit::Remove {
                    at: offsets[pos],
                    len: offsets[end] - offsets[pos],
                }),
                TextOp::Insert(chunk) => edits.push(ResolvedEdit::Insert {
                    at: offsets[pos],
                    chunk,
                }),
            }
            pos = end;
        }

        // Back to front, so earlier offsets stay valid.
        let applied = edits.len();
        for edit in edits.into_iter().rev() {
            match edit {
                ResolvedEdit::Remove { at, len } => text.remove_range(txn, at, len),
                ResolvedEdit::Insert { at, chunk } => text.insert(txn, at, chunk),
            }
        }
        Ok(applied)
    }

    /// Diff `new` against the current content of `text` and apply the result.
    pub fn reconcile(
        &self,
        txn: &mut TransactionMut,
        text: &TextRef,
        new: &str,
    ) -> Result<Vec<TextOp>, TextError> {
        let current = text.get_string(&*txn);
        let ops = self.diff(&current, new);
        self.apply(txn, text, &ops)?;
        Ok(ops)
    }

    /// Prefix sums of per-character lengths in the document's offset unit.
    fn char_offsets(&self, content: &str) -> Vec<u32> {
        let mut offsets = Vec::with_capacity(content.len() + 1);
        let mut total = 0u32;
        offsets.push(total);
        for c in content.chars() {
            total += match self.offset_kind {
                OffsetKind::Utf16 => c.len_utf16() as u32,
                _ => c.len_utf8() as u32,
            };
            offsets.push(total);
        }
        offsets
    }
}

enum ResolvedEdit<'a> {
    Remove { at: u32, len: u32 },
    Insert { at: u32, chunk: &'a str },
}
