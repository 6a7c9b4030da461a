//! Error types for text reconciliation.

use thiserror::Error;

/// Errors raised while applying an edit script to shared text.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TextError {
    /// The script reaches past the end of the text it is applied to.
    #[error("Edit script reaches position {position} but text has {length} characters")]
    OutOfBounds { position: usize, length: usize },
}

impl From<TextError> for crate::Error {
    fn from(err: TextError) -> Self {
        crate::Error::Text(err)
    }
}
