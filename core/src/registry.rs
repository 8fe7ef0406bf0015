//! Transfer Registry
//!
//! Owns every live transfer, keyed by `(peer, transfer id)`. Terminal
//! transfers are released and dropped here and nowhere else.

use crate::engine::{PeerId, TransferId, TransferKind};
use crate::error::{Result, TransferError};
use crate::store::BackingStore;
use crate::transfer::{Direction, Transfer, TransferState};
use std::collections::HashMap;
use std::path::Path;

/// Registry key for a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub peer: PeerId,
    pub id: TransferId,
}

impl TransferKey {
    pub fn new(peer: PeerId, id: TransferId) -> Self {
        TransferKey { peer, id }
    }
}

/// Declared attributes of a new transfer
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub peer: PeerId,
    pub id: TransferId,
    pub direction: Direction,
    pub kind: TransferKind,
    pub total_size: Option<u64>,
    pub name: String,
}

pub struct TransferRegistry {
    store: Box<dyn BackingStore>,
    transfers: HashMap<TransferKey, Transfer>,
}

impl TransferRegistry {
    pub fn new(store: Box<dyn BackingStore>) -> Self {
        TransferRegistry {
            store,
            transfers: HashMap::new(),
        }
    }

    /// Register a transfer in `Pending`. When a locator is given the
    /// resource is opened now; a failed open leaves no entry behind.
    pub fn create(&mut self, new: NewTransfer, locator: Option<&Path>) -> Result<TransferKey> {
        let key = TransferKey::new(new.peer, new.id);
        if self.transfers.contains_key(&key) {
            return Err(TransferError::AlreadyExists {
                peer: new.peer,
                id: new.id,
            });
        }

        let mut transfer = Transfer::new(
            new.peer,
            new.id,
            new.direction,
            new.kind,
            new.total_size,
            new.name,
        );
        if let Some(locator) = locator {
            transfer.bind(self.store.open(new.direction, locator)?);
        }

        tracing::info!(
            "Registered {:?} transfer {} for {} ({:?} bytes)",
            new.direction,
            new.id,
            new.peer,
            new.total_size
        );
        self.transfers.insert(key, transfer);
        Ok(key)
    }

    /// Open the resource of a pending transfer that has none yet.
    pub fn bind(&mut self, peer: PeerId, id: TransferId, locator: &Path) -> Result<()> {
        let store = &self.store;
        let transfer = self
            .transfers
            .get_mut(&TransferKey::new(peer, id))
            .ok_or(TransferError::NotFound { peer, id })?;

        if transfer.has_resource() {
            return Ok(());
        }
        transfer.bind(store.open(transfer.direction(), locator)?);
        Ok(())
    }

    pub fn lookup(&self, peer: PeerId, id: TransferId) -> Result<&Transfer> {
        self.transfers
            .get(&TransferKey::new(peer, id))
            .ok_or(TransferError::NotFound { peer, id })
    }

    pub(crate) fn lookup_mut(&mut self, peer: PeerId, id: TransferId) -> Result<&mut Transfer> {
        self.transfers
            .get_mut(&TransferKey::new(peer, id))
            .ok_or(TransferError::NotFound { peer, id })
    }

    /// Apply a validated state change. Terminal states release the
    /// resource and drop the entry before returning.
    pub(crate) fn set_state(
        &mut self,
        peer: PeerId,
        id: TransferId,
        state: TransferState,
    ) -> Result<TransferState> {
        let transfer = self.lookup_mut(peer, id)?;
        let previous = transfer.state();
        transfer.set_state(state);
        tracing::info!("Transfer {} for {}: {:?} -> {:?}", id, peer, previous, state);

        if state.is_terminal() {
            self.remove(peer, id)?;
        }
        Ok(state)
    }

    /// Release the resource and drop the entry.
    pub fn remove(&mut self, peer: PeerId, id: TransferId) -> Result<Transfer> {
        let mut transfer = self
            .transfers
            .remove(&TransferKey::new(peer, id))
            .ok_or(TransferError::NotFound { peer, id })?;
        transfer.release();
        Ok(transfer)
    }

    /// Force-cancel every transfer of a peer whose connection is gone.
    ///
    /// No command goes to the engine. Returns the removed transfers,
    /// already released and marked `Cancelled`.
    pub fn remove_all(&mut self, peer: PeerId) -> Vec<Transfer> {
        let keys: Vec<TransferKey> = self
            .transfers
            .keys()
            .filter(|key| key.peer == peer)
            .copied()
            .collect();

        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(mut transfer) = self.transfers.remove(&key) {
                transfer.set_state(TransferState::Cancelled);
                transfer.release();
                removed.push(transfer);
            }
        }

        if !removed.is_empty() {
            tracing::info!("Dropped {} transfer(s) of {}", removed.len(), peer);
        }
        removed
    }

    pub fn transfers_for(&self, peer: PeerId) -> impl Iterator<Item = &Transfer> + '_ {
        self.transfers.values().filter(move |t| t.peer() == peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transfer> + '_ {
        self.transfers.values()
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}
