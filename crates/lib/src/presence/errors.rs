//! Error types for presence handling.

use thiserror::Error;

/// Errors raised while reading or publishing presence state.
///
/// The cursor overlay logs these instead of returning them; they are exposed
/// for embedding code that parses presence state directly.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PresenceError {
    /// A peer's presence state does not have the expected shape.
    #[error("Malformed presence state from client {client}: {reason}")]
    MalformedState { client: u64, reason: String },

    /// A cursor position could not be decoded.
    #[error("Invalid cursor position: {0}")]
    InvalidPosition(String),

    /// The document could not be read or written to convert positions.
    #[error("Document unavailable for cursor conversion: {0}")]
    DocumentBusy(String),
}

impl PresenceError {
    /// Check if this error means the document could not be transacted.
    pub fn is_document_busy(&self) -> bool {
        matches!(self, PresenceError::DocumentBusy(_))
    }
}

impl From<PresenceError> for crate::Error {
    fn from(err: PresenceError) -> Self {
        crate::Error::Presence(err)
    }
}
