//! Error types for the sync binding.

use thiserror::Error;

/// Errors raised by [`SyncBinding`](crate::SyncBinding) operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BindingError {
    /// The builder was finished without a replicated document.
    #[error("A replicated document is required to build a sync binding")]
    MissingDocument,

    /// The builder was finished without a host store.
    #[error("A host store is required to build a sync binding")]
    MissingHost,

    /// The document could not open a transaction, typically because another
    /// transaction is still being committed.
    #[error("Could not open a document transaction for {operation}: {reason}")]
    TransactionUnavailable {
        operation: &'static str,
        reason: String,
    },

    /// The document layout violates one of the binding's invariants.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// An operation panicked and was stopped at the public boundary.
    #[error("{operation} panicked: {message}")]
    Panicked {
        operation: &'static str,
        message: String,
    },
}

impl BindingError {
    /// Check if this error is about transaction availability.
    pub fn is_transaction_error(&self) -> bool {
        matches!(self, BindingError::TransactionUnavailable { .. })
    }

    /// Check if this error reports a broken layout invariant.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, BindingError::InvariantViolation(_))
    }

    /// Check if this error comes from construction.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            BindingError::MissingDocument | BindingError::MissingHost
        )
    }

    /// Name of the failed operation, when known.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            BindingError::TransactionUnavailable { operation, .. }
            | BindingError::Panicked { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

impl From<BindingError> for crate::Error {
    fn from(err: BindingError) -> Self {
        crate::Error::Binding(err)
    }
}
