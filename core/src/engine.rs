//! Engine Interface
//!
//! Identifier types and the outbound command surface of the messaging engine.
//! The engine owns transport, crypto and routing; the core only ever holds
//! the opaque tokens defined here.

use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Opaque peer token handed out by the engine.
///
/// The core hashes and compares it, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PeerId(u32);

impl PeerId {
    pub const fn new(raw: u32) -> Self {
        PeerId(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Transfer number assigned by the engine, unique per peer while active.
pub type TransferId = u32;

/// Application-defined transfer classification, forwarded untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TransferKind(pub u32);

impl TransferKind {
    pub const DATA: TransferKind = TransferKind(0);
    pub const AVATAR: TransferKind = TransferKind(1);
}

/// Control command governing a transfer's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Resume,
    Pause,
    Cancel,
}

/// Reasons the engine may refuse an outbound command.
///
/// Both are retryable; the transfer is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("peer is not connected")]
    PeerNotConnected,
    #[error("engine send queue is full")]
    ResourceExhausted,
}

/// Outbound commands consumed from the core.
pub trait Engine {
    /// Tell the peer we accept its transfer request.
    fn accept_transfer(&mut self, peer: PeerId, id: TransferId) -> Result<(), EngineError>;

    fn send_control(
        &mut self,
        peer: PeerId,
        id: TransferId,
        control: Control,
    ) -> Result<(), EngineError>;

    fn send_chunk(
        &mut self,
        peer: PeerId,
        id: TransferId,
        offset: u64,
        data: Bytes,
    ) -> Result<(), EngineError>;
}
