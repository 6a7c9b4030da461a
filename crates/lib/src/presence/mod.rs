//! Peer presence (awareness) and cursor overlay.
//!
//! Presence is ephemeral per-client state, distinct from the durable record
//! document: who the peer is and where their cursor sits. The binding does
//! not transport presence; it consumes an [`Awareness`] implementation supplied
//! by the embedding application and publishes the local cursor through it.
//!
//! Cursor positions travel as pairs of [`yrs::StickyIndex`] values anchored to
//! the record array, so they stay meaningful while peers insert and delete
//! other records concurrently.
//!
//! Wire shape of one client's state:
//!
//! ```json
//! {
//!   "user": { "name": "Ada", "color": "#30bced" },
//!   "cursor": { "anchor": "<base64 sticky index>", "head": "<base64 sticky index>" }
//! }
//! ```

mod cursor;
mod errors;

pub use cursor::{CursorOverlay, CursorRenderer, NoopCursorRenderer};
pub use errors::PresenceError;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use yrs::StickyIndex;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;

/// Identity a peer advertises in its presence state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// Encoded cursor: anchor and head as base64 v1-encoded sticky indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    pub anchor: String,
    pub head: String,
}

impl CursorState {
    pub fn encode(anchor: &StickyIndex, head: &StickyIndex) -> Self {
        Self {
            anchor: Base64::encode_string(&anchor.encode_v1()),
            head: Base64::encode_string(&head.encode_v1()),
        }
    }

    /// Decode both positions.
    pub fn decode(&self) -> Result<(StickyIndex, StickyIndex), PresenceError> {
        Ok((decode_sticky(&self.anchor)?, decode_sticky(&self.head)?))
    }
}

fn decode_sticky(encoded: &str) -> Result<StickyIndex, PresenceError> {
    let bytes = Base64::decode_vec(encoded)
        .map_err(|e| PresenceError::InvalidPosition(format!("base64: {e}")))?;
    StickyIndex::decode_v1(&bytes).map_err(|e| PresenceError::InvalidPosition(e.to_string()))
}

/// The parts of a peer's presence state the overlay understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerState {
    #[serde(default)]
    pub user: Option<PeerUser>,
    #[serde(default)]
    pub cursor: Option<CursorState>,
}

impl PeerState {
    /// Parse a raw presence state, reading the cursor from `cursor_field`.
    pub fn from_value(
        client: u64,
        value: &serde_json::Value,
        cursor_field: &str,
    ) -> Result<Self, PresenceError> {
        let malformed = |reason: String| PresenceError::MalformedState { client, reason };
        let object = value
            .as_object()
            .ok_or_else(|| malformed("state is not an object".to_string()))?;
        let user = match object.get("user") {
            None | Some(serde_json::Value::Null) => None,
            Some(user) => {
                Some(serde_json::from_value(user.clone()).map_err(|e| malformed(e.to_string()))?)
            }
        };
        let cursor = match object.get(cursor_field) {
            None | Some(serde_json::Value::Null) => None,
            Some(cursor) => {
                Some(serde_json::from_value(cursor.clone()).map_err(|e| malformed(e.to_string()))?)
            }
        };
        Ok(Self { user, cursor })
    }
}

/// Clients whose presence changed in one awareness update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceChange {
    pub added: Vec<u64>,
    pub updated: Vec<u64>,
    pub removed: Vec<u64>,
    /// Current state of every added or updated client.
    pub states: HashMap<u64, serde_json::Value>,
}

impl PresenceChange {
    /// Added and updated clients, in that order.
    pub fn changed(&self) -> impl Iterator<Item = u64> + '_ {
        self.added.iter().chain(&self.updated).copied()
    }
}

/// Callback invoked on every presence change.
pub type PresenceHandler = Arc<dyn Fn(&PresenceChange) + Send + Sync>;

/// Presence capability consumed by the binding.
pub trait Awareness: Send + Sync {
    /// Client id of the local peer.
    fn client_id(&self) -> u64;

    /// Current state of every known client, including the local one.
    fn states(&self) -> HashMap<u64, serde_json::Value>;

    /// Set one field of the local client's state.
    fn set_local_state_field(&self, field: &str, value: serde_json::Value);

    /// Register `handler` for presence changes until the returned subscription
    /// is dropped or unsubscribed.
    fn on_change(&self, handler: PresenceHandler) -> PresenceSubscription;
}

/// Handle that detaches a presence handler when dropped.
pub struct PresenceSubscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl PresenceSubscription {
    /// Wrap the detach action of an [`Awareness`] implementation.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Detach now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for PresenceSubscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for PresenceSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
