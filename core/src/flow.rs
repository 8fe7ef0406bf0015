//! Chunk Flow Controller
//!
//! Pull-based chunk delivery. For outgoing transfers the engine asks for
//! `(offset, length)` and we answer with whatever the resource yields; for
//! incoming transfers the engine hands us `(offset, bytes)` to write.
//! A zero-length request or an empty chunk at the cursor completes the
//! transfer.

use crate::engine::{Control, Engine, PeerId, TransferId};
use crate::error::{Result, TransferError};
use crate::registry::TransferRegistry;
use crate::transfer::{Direction, TransferState};
use bytes::Bytes;
use std::io;

/// What a chunk indication did to its transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Transfer not active; no I/O happened
    Ignored,
    /// Outgoing bytes handed to the engine
    Sent { len: usize, cursor: u64 },
    /// Incoming bytes written to the resource
    Written { cursor: u64 },
    /// Sentinel received; transfer completed and released
    Completed,
}

/// Serve a chunk request for an outgoing transfer.
///
/// On an I/O error the transfer is cancelled, CANCEL is sent to the peer,
/// and the error is returned.
pub fn chunk_requested<E: Engine>(
    registry: &mut TransferRegistry,
    engine: &mut E,
    max_chunk_len: usize,
    peer: PeerId,
    id: TransferId,
    offset: u64,
    length: usize,
) -> Result<ChunkOutcome> {
    let transfer = registry.lookup_mut(peer, id)?;
    if transfer.direction() != Direction::Outgoing {
        return Err(TransferError::WrongDirection {
            expected: Direction::Outgoing,
        });
    }
    if transfer.state() != TransferState::Active {
        tracing::debug!(
            "Ignoring chunk request for {:?} transfer {} ({})",
            transfer.state(),
            id,
            peer
        );
        return Ok(ChunkOutcome::Ignored);
    }

    if length == 0 {
        registry.set_state(peer, id, TransferState::Completed)?;
        return Ok(ChunkOutcome::Completed);
    }

    let want = length.min(max_chunk_len.max(1));
    let read = match transfer.resource_mut() {
        Some(resource) => resource.read_at(offset, want),
        None => Err(unbound()),
    };
    let data = match read {
        Ok(data) => data,
        Err(e) => {
            abort(registry, engine, peer, id, &e);
            return Err(e.into());
        }
    };

    let len = data.len();
    tracing::trace!("Sending {} bytes at {} for transfer {} ({})", len, offset, id, peer);
    engine.send_chunk(peer, id, offset, Bytes::from(data))?;

    let transfer = registry.lookup_mut(peer, id)?;
    transfer.advance_cursor(offset.saturating_add(len as u64));
    Ok(ChunkOutcome::Sent {
        len,
        cursor: transfer.cursor(),
    })
}

/// Store a received chunk for an incoming transfer.
///
/// Offsets need not be contiguous; the cursor tracks the highest byte
/// written. On an I/O error the transfer is cancelled and CANCEL is sent.
pub fn chunk_received<E: Engine>(
    registry: &mut TransferRegistry,
    engine: &mut E,
    peer: PeerId,
    id: TransferId,
    offset: u64,
    data: &[u8],
) -> Result<ChunkOutcome> {
    let transfer = registry.lookup_mut(peer, id)?;
    if transfer.direction() != Direction::Incoming {
        return Err(TransferError::WrongDirection {
            expected: Direction::Incoming,
        });
    }
    if transfer.state() != TransferState::Active {
        tracing::debug!(
            "Ignoring chunk for {:?} transfer {} ({})",
            transfer.state(),
            id,
            peer
        );
        return Ok(ChunkOutcome::Ignored);
    }

    if data.is_empty() {
        if offset == transfer.cursor() {
            registry.set_state(peer, id, TransferState::Completed)?;
            return Ok(ChunkOutcome::Completed);
        }
        tracing::debug!(
            "Empty chunk at {} does not match cursor {} for transfer {} ({})",
            offset,
            transfer.cursor(),
            id,
            peer
        );
        return Ok(ChunkOutcome::Ignored);
    }

    let written = match transfer.resource_mut() {
        Some(resource) => resource.write_at(offset, data),
        None => Err(unbound()),
    };
    if let Err(e) = written {
        abort(registry, engine, peer, id, &e);
        return Err(e.into());
    }

    transfer.advance_cursor(offset.saturating_add(data.len() as u64));
    tracing::trace!(
        "Wrote {} bytes at {} for transfer {} ({})",
        data.len(),
        offset,
        id,
        peer
    );
    Ok(ChunkOutcome::Written {
        cursor: transfer.cursor(),
    })
}

fn unbound() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "no resource bound to transfer")
}

/// Local storage failed: tell the peer to stop and drop the transfer.
pub(crate) fn abort<E: Engine>(
    registry: &mut TransferRegistry,
    engine: &mut E,
    peer: PeerId,
    id: TransferId,
    err: &io::Error,
) {
    tracing::warn!("I/O error on transfer {} ({}): {}", id, peer, err);

    if let Err(e) = engine.send_control(peer, id, Control::Cancel) {
        tracing::warn!("Could not send CANCEL for transfer {} ({}): {}", id, peer, e);
    }
    if let Err(e) = registry.set_state(peer, id, TransferState::Cancelled) {
        tracing::warn!("Failed to cancel transfer {} ({}): {}", id, peer, e);
    }
}
