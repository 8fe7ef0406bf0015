//! Transfer Module
//!
//! A single file transfer in one direction, owning its backing resource.

use crate::engine::{PeerId, TransferId, TransferKind};
use crate::store::Resource;
use serde::Serialize;

/// Which side supplies the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Peer sends, we write
    Incoming,
    /// We read, peer pulls
    Outgoing,
}

/// Transfer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Cancelled)
    }
}

/// Progress snapshot for notifications
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: Option<u64>,
    pub state: TransferState,
}

impl TransferProgress {
    /// `None` for streams of unknown size.
    pub fn percentage(&self) -> Option<f32> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => {
                let done = self.bytes_transferred.min(total);
                Some((done as f32 / total as f32) * 100.0)
            }
            None => None,
        }
    }
}

/// One transfer. State and cursor are only mutated through the registry.
pub struct Transfer {
    peer: PeerId,
    id: TransferId,
    direction: Direction,
    kind: TransferKind,
    total_size: Option<u64>,
    name: String,
    state: TransferState,
    cursor: u64,
    resource: Option<Box<dyn Resource>>,
    released: bool,
}

impl Transfer {
    pub(crate) fn new(
        peer: PeerId,
        id: TransferId,
        direction: Direction,
        kind: TransferKind,
        total_size: Option<u64>,
        name: String,
    ) -> Self {
        Transfer {
            peer,
            id,
            direction,
            kind,
            total_size,
            name,
            state: TransferState::Pending,
            cursor: 0,
            resource: None,
            released: false,
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn has_resource(&self) -> bool {
        self.resource.is_some()
    }

    pub fn progress(&self) -> TransferProgress {
        TransferProgress {
            bytes_transferred: self.cursor,
            total_bytes: self.total_size,
            state: self.state,
        }
    }

    pub(crate) fn set_state(&mut self, state: TransferState) {
        self.state = state;
    }

    /// Raise the high-water mark. Never moves backwards.
    pub(crate) fn advance_cursor(&mut self, end: u64) {
        if end > self.cursor {
            self.cursor = end;
        }
    }

    pub(crate) fn bind(&mut self, resource: Box<dyn Resource>) {
        debug_assert!(self.resource.is_none(), "transfer resource bound twice");
        self.resource = Some(resource);
    }

    pub(crate) fn resource_mut(&mut self) -> Option<&mut (dyn Resource + 'static)> {
        self.resource.as_deref_mut()
    }

    /// Close the resource if one is bound. Safe to call repeatedly; the
    /// resource sees exactly one `close`.
    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Some(mut resource) = self.resource.take() {
            if let Err(e) = resource.close() {
                tracing::warn!(
                    "Failed to close resource of transfer {} ({}): {}",
                    self.id,
                    self.peer,
                    e
                );
            }
        }
    }
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("peer", &self.peer)
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("kind", &self.kind)
            .field("total_size", &self.total_size)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("has_resource", &self.resource.is_some())
            .finish()
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        self.release();
    }
}
