//!
//! Recordsync: a bidirectional binding between a host record store and a
//! replicated Y-CRDT document.
//!
//! ## Core Concepts
//!
//! * **Records (`record::Record`)**: Titled bags of string fields, the unit the host store persists and displays.
//! * **Record layout (`layout::RecordLayout`)**: Three root arrays in the document: record containers, their titles, and tombstoned titles.
//! * **Local writes (`local::LocalWriter`, `local::LocalDeleter`)**: Turn host saves and deletes into one origin-tagged document transaction each.
//! * **Remote observers (`observer::RemoteChangeObserver`, `observer::TombstoneObserver`)**: Turn peer transactions into host store updates and deletions.
//! * **Text reconciliation (`text::TextReconciler`)**: Applies minimal edits to rich-text fields so concurrent character-level edits merge.
//! * **Presence (`presence::CursorOverlay`)**: Renders peer cursors and publishes the local one through an awareness source.
//! * **Sync binding (`binding::SyncBinding`)**: Owns all of the above for one host and one document.

pub mod binding;
pub mod config;
pub mod guard;
pub mod host;
pub mod layout;
pub mod local;
pub mod observer;
pub mod origin;
pub mod presence;
pub mod record;
pub mod text;

pub use binding::{BindingError, SyncBinding, SyncBindingBuilder};
pub use config::{BindingConfig, ConfigError};
pub use guard::ReentrancyGuard;
pub use host::{HostStore, sha256_hex};
pub use layout::RecordLayout;
pub use local::{DeleteOutcome, LocalDeleter, LocalWriter, WriteOutcome};
pub use observer::{RemoteChangeObserver, TombstoneObserver};
pub use origin::OriginTag;
pub use presence::{
    Awareness, CursorOverlay, CursorRenderer, CursorState, NoopCursorRenderer, PeerState, PeerUser,
    PresenceChange, PresenceError, PresenceHandler, PresenceSubscription,
};
pub use record::{FieldPolicy, FieldValue, Record, TITLE_FIELD};
pub use text::{TextError, TextOp, TextReconciler};

/// Y-CRDT types re-exported for convenience.
///
/// This module re-exports the `yrs` crate so that client code doesn't need to
/// add it as a separate dependency to construct and exchange documents.
pub mod y_crdt {
    pub use yrs::*;
}

/// Result type used throughout the Recordsync library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Recordsync library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured errors from the binding module
    #[error(transparent)]
    Binding(binding::BindingError),

    /// Structured errors from the text module
    #[error(transparent)]
    Text(text::TextError),

    /// Structured errors from the presence module
    #[error(transparent)]
    Presence(presence::PresenceError),

    /// Structured errors from the config module
    #[error(transparent)]
    Config(config::ConfigError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Binding(_) => "binding",
            Error::Text(_) => "text",
            Error::Presence(_) => "presence",
            Error::Config(_) => "config",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error means no document transaction could be opened.
    pub fn is_transaction_error(&self) -> bool {
        match self {
            Error::Binding(binding_err) => binding_err.is_transaction_error(),
            Error::Presence(presence_err) => presence_err.is_document_busy(),
            _ => false,
        }
    }

    /// Check if this error reports a broken document layout.
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            Error::Binding(binding_err) => binding_err.is_invariant_violation(),
            _ => false,
        }
    }

    /// Check if this error is configuration-related.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this error is presence-related.
    pub fn is_presence_error(&self) -> bool {
        matches!(self, Error::Presence(_))
    }

    /// Check if this error is a text edit that did not fit the stored content.
    pub fn is_text_error(&self) -> bool {
        matches!(self, Error::Text(_))
    }
}
