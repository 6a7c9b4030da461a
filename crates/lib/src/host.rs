//! The host record store as seen from the binding.
//!
//! The host owns persistence, indexing and UI. The binding only needs a few
//! capabilities from it: receiving full record snapshots and deletions that
//! originate from peers, a read-only switch, a reload queue, and a content
//! hash used to detect unchanged fields.

use sha2::{Digest, Sha256};

use crate::Record;

/// Capabilities the binding consumes from the host record store.
///
/// Implementations are called synchronously from document observers while
/// the remote transaction is still committing, so they must not block on the
/// binding itself. From inside these methods:
///
/// * [`save_record`](crate::SyncBinding::save_record) and
///   [`delete_record`](crate::SyncBinding::delete_record) are skipped by the
///   binding's reentrancy guard and return an empty outcome;
/// * reads such as [`load_record`](crate::SyncBinding::load_record) fail with
///   [`BindingError::TransactionUnavailable`](crate::BindingError::TransactionUnavailable)
///   because the document is locked.
///
/// The snapshot handed to [`add_or_update_record`](Self::add_or_update_record)
/// already reflects the committed state, so there is nothing left to read.
pub trait HostStore: Send + Sync {
    /// Whether this host is a read-only follower.
    ///
    /// Writes issued while read-only are turned into reload requests.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Ask the host to re-pull the authoritative state of `title`.
    fn enqueue_reload(&self, title: &str);

    /// Insert or replace a record with the given full snapshot.
    fn add_or_update_record(&self, record: Record);

    /// Remove a record that a peer deleted.
    fn delete_record(&self, title: &str);

    /// Hash used to decide whether a field value changed.
    ///
    /// Defaults to the hex-encoded SHA-256 of the value.
    fn content_hash(&self, value: &str) -> String {
        sha256_hex(value)
    }
}

/// Hex-encoded SHA-256 digest of `value`.
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
