//! Rendering peer cursors and publishing the local one.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use yrs::branch::Branch;
use yrs::{ArrayRef, Assoc, Doc, IndexedSequence, ReadTxn, StickyIndex, Transact};

use super::{Awareness, CursorState, PeerState, PeerUser, PresenceChange, PresenceError};
use crate::guard::lock;
use crate::observer::contained;
use crate::origin::OriginTag;

/// Draws peer cursor markers. Implemented by the embedding UI.
pub trait CursorRenderer: Send + Sync {
    /// Create or move the marker for `client` to the resolved record indices.
    fn render(&self, client: u64, user: &PeerUser, anchor: u32, head: u32);

    /// Remove the marker for `client`.
    fn remove(&self, client: u64);
}

/// Renderer for headless bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCursorRenderer;

impl CursorRenderer for NoopCursorRenderer {
    fn render(&self, _client: u64, _user: &PeerUser, _anchor: u32, _head: u32) {}

    fn remove(&self, _client: u64) {}
}

/// Maps peer presence to cursor markers and the local selection to presence.
///
/// Positions are sticky indices on the record array. Every failure is logged
/// and swallowed; none propagates to the caller.
pub struct CursorOverlay {
    doc: Doc,
    records: ArrayRef,
    origin: OriginTag,
    cursor_field: String,
    renderer: Arc<dyn CursorRenderer>,
    rendered: Mutex<BTreeSet<u64>>,
    /// `None` until something was published; then the last published cursor.
    last_published: Mutex<Option<Option<CursorState>>>,
}

impl CursorOverlay {
    pub fn new(
        doc: Doc,
        records: ArrayRef,
        origin: OriginTag,
        cursor_field: impl Into<String>,
        renderer: Arc<dyn CursorRenderer>,
    ) -> Self {
        Self {
            doc,
            records,
            origin,
            cursor_field: cursor_field.into(),
            renderer,
            rendered: Mutex::new(BTreeSet::new()),
            last_published: Mutex::new(None),
        }
    }

    /// Render every known peer in `states`, skipping the local client.
    pub fn sync_all(&self, local: u64, states: &HashMap<u64, serde_json::Value>) {
        let mut clients: Vec<u64> = states.keys().copied().filter(|c| *c != local).collect();
        clients.sort_unstable();
        for client in clients {
            self.update_peer(client, states.get(&client));
        }
    }

    /// Apply one presence change, skipping the local client.
    pub fn apply_change(&self, local: u64, change: &PresenceChange) {
        for client in change.changed().filter(|c| *c != local) {
            self.update_peer(client, change.states.get(&client));
        }
        for client in change.removed.iter().copied().filter(|c| *c != local) {
            self.remove_marker(client);
        }
    }

    /// Clients that currently have a rendered marker.
    pub fn rendered_clients(&self) -> Vec<u64> {
        lock(&self.rendered).iter().copied().collect()
    }

    /// Remove every rendered marker and forget the last published cursor.
    pub fn clear(&self) {
        *lock(&self.last_published) = None;
        let clients: Vec<u64> = std::mem::take(&mut *lock(&self.rendered)).into_iter().collect();
        for client in clients {
            contained("cursor removal", || self.renderer.remove(client));
        }
    }

    fn update_peer(&self, client: u64, state: Option<&serde_json::Value>) {
        let outcome = match state {
            Some(state) => self.render_peer(client, state),
            None => Ok(false),
        };
        match outcome {
            Ok(true) => {}
            Ok(false) => self.remove_marker(client),
            Err(e) => {
                tracing::warn!(client, error = %e, "Dropping cursor for peer");
                self.remove_marker(client);
            }
        }
    }

    /// Render the peer's cursor. Returns false when it has none or it no
    /// longer resolves.
    fn render_peer(&self, client: u64, state: &serde_json::Value) -> Result<bool, PresenceError> {
        let peer = PeerState::from_value(client, state, &self.cursor_field)?;
        let Some(cursor) = peer.cursor else {
            return Ok(false);
        };
        let Some((anchor, head)) = self.resolve(&cursor)? else {
            tracing::debug!(client, "Peer cursor no longer resolves");
            return Ok(false);
        };

        let user = peer.user.unwrap_or_default();
        if contained("cursor render", || self.renderer.render(client, &user, anchor, head)).is_none() {
            return Ok(false);
        }
        lock(&self.rendered).insert(client);
        Ok(true)
    }

    fn remove_marker(&self, client: u64) {
        if lock(&self.rendered).remove(&client) {
            contained("cursor removal", || self.renderer.remove(client));
        }
    }

    /// Resolve an encoded cursor to absolute record indices.
    ///
    /// Returns `None` when either position no longer resolves, resolves
    /// into something other than the record array, or is anchored to a
    /// record that has since been deleted.
    pub fn resolve(&self, cursor: &CursorState) -> Result<Option<(u32, u32)>, PresenceError> {
        let (anchor, head) = cursor.decode()?;
        let txn = self
            .doc
            .try_transact()
            .map_err(|e| PresenceError::DocumentBusy(e.to_string()))?;
        let records = AsRef::<Branch>::as_ref(&self.records).id();
        let deleted = txn.snapshot().delete_set;
        let resolve = |sticky: &StickyIndex| {
            // get_offset slides a deleted anchor onto its neighbour.
            if sticky.id().is_some_and(|id| deleted.is_deleted(id)) {
                return None;
            }
            sticky
                .get_offset(&txn)
                .filter(|offset| offset.branch.id() == records)
                .map(|offset| offset.index)
        };
        Ok(resolve(&anchor).zip(resolve(&head)))
    }

    /// Encode a selection of record indices as sticky positions.
    pub fn encode_selection(&self, anchor: u32, head: u32) -> Result<Option<CursorState>, PresenceError> {
        let mut txn = self
            .doc
            .try_transact_mut_with(self.origin.to_origin())
            .map_err(|e| PresenceError::DocumentBusy(e.to_string()))?;
        let anchor = self.records.sticky_index(&mut txn, anchor, Assoc::After);
        let head = self.records.sticky_index(&mut txn, head, Assoc::After);
        Ok(anchor
            .zip(head)
            .map(|(anchor, head)| CursorState::encode(&anchor, &head)))
    }

    /// Publish the local selection through `awareness`.
    ///
    /// `None` clears the cursor. Nothing is published when the encoded value
    /// equals the last one published. Returns whether a value was published.
    pub fn publish_selection(&self, awareness: &dyn Awareness, selection: Option<(u32, u32)>) -> bool {
        let cursor = match selection {
            Some((anchor, head)) => match self.encode_selection(anchor, head) {
                Ok(cursor) => cursor,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode local selection");
                    return false;
                }
            },
            None => None,
        };

        let mut last = lock(&self.last_published);
        if last.as_ref() == Some(&cursor) {
            return false;
        }
        let value = match &cursor {
            Some(cursor) => match serde_json::to_value(cursor) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize local cursor");
                    return false;
                }
            },
            None => serde_json::Value::Null,
        };
        let field = self.cursor_field.as_str();
        if contained("cursor publish", || awareness.set_local_state_field(field, value)).is_none() {
            return false;
        }
        *last = Some(cursor);
        true
    }
}
