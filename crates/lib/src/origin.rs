//! Transaction origin tags.
//!
//! Every document transaction issued by a binding carries that binding's
//! [`OriginTag`]. Observers compare the origin of incoming batches against
//! their own tag to drop echoes of their own writes.

use std::fmt;

use uuid::Uuid;
use yrs::Origin;

/// Opaque causation identifier, unique per binding instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OriginTag(Uuid);

impl OriginTag {
    /// Generate a fresh random tag.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The tag as a document transaction origin.
    pub fn to_origin(&self) -> Origin {
        Origin::from(self.0.as_bytes().as_slice())
    }

    /// Whether a transaction with `origin` was issued under this tag.
    pub fn matches(&self, origin: Option<&Origin>) -> bool {
        origin.is_some_and(|origin| *origin == self.to_origin())
    }
}

impl Default for OriginTag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OriginTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
