//! Error Types
//!
//! Failures are always scoped to a single transfer; nothing here is fatal
//! to the process.

use crate::engine::{EngineError, PeerId, TransferId};
use crate::transfer::Direction;
use thiserror::Error;

/// Why a control command is illegal in the transfer's current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("transfer is already paused")]
    AlreadyPaused,
    #[error("transfer is not paused")]
    NotPaused,
    #[error("transfer has not started yet")]
    NotActive,
    #[error("incoming transfer must be accepted locally first")]
    AwaitingLocalAccept,
    #[error("outgoing transfer is waiting for the peer to accept")]
    AwaitingRemoteAccept,
    #[error("transfer was already accepted")]
    AlreadyAccepted,
    #[error("transfer already finished")]
    Finished,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no transfer {id} for {peer}")]
    NotFound { peer: PeerId, id: TransferId },

    #[error("transfer {id} for {peer} already exists")]
    AlreadyExists { peer: PeerId, id: TransferId },

    #[error("invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("peer is not connected")]
    PeerNotConnected,

    #[error("engine temporarily refused the command")]
    ResourceExhausted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation requires an {expected:?} transfer")]
    WrongDirection { expected: Direction },
}

impl From<EngineError> for TransferError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::PeerNotConnected => TransferError::PeerNotConnected,
            EngineError::ResourceExhausted => TransferError::ResourceExhausted,
        }
    }
}

impl TransferError {
    /// Retryable errors leave the transfer state untouched.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransferError::PeerNotConnected | TransferError::ResourceExhausted
        )
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
