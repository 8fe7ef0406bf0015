//! Indication Dispatcher
//!
//! Entry point for the engine's iteration loop. Each indication is applied
//! synchronously, one at a time; failures stay local to their transfer and
//! never interrupt the stream. Lifecycle notifications are pushed to an
//! optional bounded channel and dropped rather than blocking.

use crate::config::TransferConfig;
use crate::control;
use crate::engine::{Control, Engine, PeerId, TransferId, TransferKind};
use crate::error::{Result, TransferError, TransitionError};
use crate::flow::{self, ChunkOutcome};
use crate::registry::{NewTransfer, TransferRegistry};
use crate::store::BackingStore;
use crate::transfer::{Direction, TransferProgress, TransferState};
use bytes::Bytes;
use serde::Serialize;
use std::path::Path;
use tokio::sync::mpsc;

/// Indications delivered by the engine
#[derive(Debug, Clone)]
pub enum Indication {
    TransferRequested {
        peer: PeerId,
        id: TransferId,
        kind: TransferKind,
        total_size: Option<u64>,
        name: String,
    },
    ControlReceived {
        peer: PeerId,
        id: TransferId,
        control: Control,
    },
    ChunkRequested {
        peer: PeerId,
        id: TransferId,
        offset: u64,
        length: usize,
    },
    ChunkReceived {
        peer: PeerId,
        id: TransferId,
        offset: u64,
        data: Bytes,
    },
    /// The peer's connection is gone
    PeerDisconnected { peer: PeerId },
}

/// Why a transfer ended in `Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    Local,
    Remote,
    Io,
    PeerDisconnected,
}

/// Advisory, user-facing lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    Created {
        peer: PeerId,
        id: TransferId,
        direction: Direction,
        kind: TransferKind,
        total_size: Option<u64>,
        name: String,
    },
    Resumed {
        peer: PeerId,
        id: TransferId,
    },
    Paused {
        peer: PeerId,
        id: TransferId,
    },
    Progress {
        peer: PeerId,
        id: TransferId,
        progress: TransferProgress,
    },
    Completed {
        peer: PeerId,
        id: TransferId,
    },
    Cancelled {
        peer: PeerId,
        id: TransferId,
        reason: CancelReason,
    },
    /// The engine refused a command. The transfer is unchanged and the command
    /// may be retried, except for CANCEL, which has already been applied.
    CommandDeferred {
        peer: PeerId,
        id: TransferId,
        error: String,
    },
}

/// Non-blocking sender half of the notification queue
struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    fn emit(&mut self, notification: Notification) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!("Notification queue full, dropping {:?}", dropped);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Notification receiver gone, disabling notifications");
                self.tx = None;
            }
        }
    }
}

pub struct Dispatcher<E: Engine> {
    registry: TransferRegistry,
    engine: E,
    config: TransferConfig,
    notifier: Notifier,
}

impl<E: Engine> Dispatcher<E> {
    /// Dispatcher without a notification consumer
    pub fn new(engine: E, store: Box<dyn BackingStore>, config: TransferConfig) -> Self {
        Dispatcher {
            registry: TransferRegistry::new(store),
            engine,
            config,
            notifier: Notifier { tx: None },
        }
    }

    /// Dispatcher plus the receiving end of its notification queue
    pub fn with_notifications(
        engine: E,
        store: Box<dyn BackingStore>,
        config: TransferConfig,
    ) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(config.notification_capacity.max(1));
        let mut dispatcher = Self::new(engine, store, config);
        dispatcher.notifier.tx = Some(tx);
        (dispatcher, rx)
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Apply one engine indication. Never fails; errors are logged and
    /// confined to the affected transfer.
    pub fn handle(&mut self, indication: Indication) {
        let result = match indication {
            Indication::TransferRequested {
                peer,
                id,
                kind,
                total_size,
                name,
            } => self.on_transfer_requested(peer, id, kind, total_size, name),
            Indication::ControlReceived { peer, id, control } => {
                self.on_control(peer, id, control)
            }
            Indication::ChunkRequested {
                peer,
                id,
                offset,
                length,
            } => self.on_chunk_requested(peer, id, offset, length),
            Indication::ChunkReceived {
                peer,
                id,
                offset,
                data,
            } => self.on_chunk_received(peer, id, offset, &data),
            Indication::PeerDisconnected { peer } => {
                self.peer_disconnected(peer);
                Ok(())
            }
        };

        if let Err(e) = result {
            match e {
                TransferError::NotFound { peer, id } => {
                    tracing::debug!("Dropping stale indication for transfer {} ({})", id, peer);
                }
                other => tracing::warn!("Indication failed: {}", other),
            }
        }
    }

    fn on_transfer_requested(
        &mut self,
        peer: PeerId,
        id: TransferId,
        kind: TransferKind,
        total_size: Option<u64>,
        name: String,
    ) -> Result<()> {
        let new = NewTransfer {
            peer,
            id,
            direction: Direction::Incoming,
            kind,
            total_size,
            name,
        };
        self.register(new, None)
    }

    fn on_control(&mut self, peer: PeerId, id: TransferId, control: Control) -> Result<()> {
        let state = control::apply_remote(&mut self.registry, peer, id, control)?;
        self.notify_state(peer, id, state, CancelReason::Remote);
        Ok(())
    }

    fn on_chunk_requested(
        &mut self,
        peer: PeerId,
        id: TransferId,
        offset: u64,
        length: usize,
    ) -> Result<()> {
        let outcome = flow::chunk_requested(
            &mut self.registry,
            &mut self.engine,
            self.config.max_chunk_len,
            peer,
            id,
            offset,
            length,
        );
        self.after_chunk(peer, id, outcome)
    }

    fn on_chunk_received(
        &mut self,
        peer: PeerId,
        id: TransferId,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        let outcome =
            flow::chunk_received(&mut self.registry, &mut self.engine, peer, id, offset, data);
        self.after_chunk(peer, id, outcome)
    }

    fn after_chunk(
        &mut self,
        peer: PeerId,
        id: TransferId,
        outcome: Result<ChunkOutcome>,
    ) -> Result<()> {
        match outcome {
            Ok(ChunkOutcome::Ignored) => Ok(()),
            Ok(ChunkOutcome::Sent { .. }) | Ok(ChunkOutcome::Written { .. }) => {
                let progress = self.registry.lookup(peer, id)?.progress();
                self.notifier.emit(Notification::Progress { peer, id, progress });
                Ok(())
            }
            Ok(ChunkOutcome::Completed) => {
                self.notifier.emit(Notification::Completed { peer, id });
                Ok(())
            }
            Err(TransferError::Io(e)) => {
                self.notifier.emit(Notification::Cancelled {
                    peer,
                    id,
                    reason: CancelReason::Io,
                });
                Err(TransferError::Io(e))
            }
            Err(e) => {
                self.defer_if_retryable(peer, id, &e);
                Err(e)
            }
        }
    }

    /// Force-cancel everything belonging to a peer that went away.
    pub fn peer_disconnected(&mut self, peer: PeerId) {
        for transfer in self.registry.remove_all(peer) {
            self.notifier.emit(Notification::Cancelled {
                peer,
                id: transfer.id(),
                reason: CancelReason::PeerDisconnected,
            });
        }
    }

    /// Register an outgoing transfer the engine has already assigned an id to.
    pub fn send_file(
        &mut self,
        peer: PeerId,
        id: TransferId,
        kind: TransferKind,
        total_size: Option<u64>,
        name: impl Into<String>,
        locator: &Path,
    ) -> Result<()> {
        let new = NewTransfer {
            peer,
            id,
            direction: Direction::Outgoing,
            kind,
            total_size,
            name: name.into(),
        };
        self.register(new, Some(locator))
    }

    /// Accept a pending incoming transfer, writing it to `locator`.
    ///
    /// If the destination cannot be opened the transfer is cancelled and the
    /// peer is told so.
    pub fn accept(&mut self, peer: PeerId, id: TransferId, locator: &Path) -> Result<()> {
        let transfer = self.registry.lookup(peer, id)?;
        if transfer.direction() != Direction::Incoming {
            return Err(TransferError::WrongDirection {
                expected: Direction::Incoming,
            });
        }
        if transfer.state() != TransferState::Pending {
            return Err(TransitionError::AlreadyAccepted.into());
        }

        match self.registry.bind(peer, id, locator) {
            Ok(()) => {}
            Err(TransferError::Io(e)) => {
                flow::abort(&mut self.registry, &mut self.engine, peer, id, &e);
                self.notifier.emit(Notification::Cancelled {
                    peer,
                    id,
                    reason: CancelReason::Io,
                });
                return Err(TransferError::Io(e));
            }
            Err(e) => return Err(e),
        }
        self.local_control(peer, id, Control::Resume)
    }

    /// Decline a pending incoming transfer.
    pub fn reject(&mut self, peer: PeerId, id: TransferId) -> Result<()> {
        self.cancel(peer, id)
    }

    pub fn pause(&mut self, peer: PeerId, id: TransferId) -> Result<()> {
        self.local_control(peer, id, Control::Pause)
    }

    pub fn resume(&mut self, peer: PeerId, id: TransferId) -> Result<()> {
        self.local_control(peer, id, Control::Resume)
    }

    pub fn cancel(&mut self, peer: PeerId, id: TransferId) -> Result<()> {
        self.local_control(peer, id, Control::Cancel)
    }

    pub fn progress(&self, peer: PeerId, id: TransferId) -> Result<TransferProgress> {
        Ok(self.registry.lookup(peer, id)?.progress())
    }

    fn register(&mut self, new: NewTransfer, locator: Option<&Path>) -> Result<()> {
        let created = Notification::Created {
            peer: new.peer,
            id: new.id,
            direction: new.direction,
            kind: new.kind,
            total_size: new.total_size,
            name: new.name.clone(),
        };
        self.registry.create(new, locator)?;
        self.notifier.emit(created);
        Ok(())
    }

    fn local_control(&mut self, peer: PeerId, id: TransferId, control: Control) -> Result<()> {
        match control::apply_local(&mut self.registry, &mut self.engine, peer, id, control) {
            Ok(applied) => {
                if let Some(e) = applied.undelivered {
                    self.defer_if_retryable(peer, id, &TransferError::from(e));
                }
                self.notify_state(peer, id, applied.state, CancelReason::Local);
                Ok(())
            }
            Err(e) => {
                self.defer_if_retryable(peer, id, &e);
                Err(e)
            }
        }
    }

    fn notify_state(
        &mut self,
        peer: PeerId,
        id: TransferId,
        state: TransferState,
        reason: CancelReason,
    ) {
        let notification = match state {
            TransferState::Active => Notification::Resumed { peer, id },
            TransferState::Paused => Notification::Paused { peer, id },
            TransferState::Cancelled => Notification::Cancelled { peer, id, reason },
            TransferState::Completed => Notification::Completed { peer, id },
            TransferState::Pending => return,
        };
        self.notifier.emit(notification);
    }

    fn defer_if_retryable(&mut self, peer: PeerId, id: TransferId, err: &TransferError) {
        if err.is_retryable() {
            tracing::info!("Command for transfer {} ({}) deferred: {}", id, peer, err);
            self.notifier.emit(Notification::CommandDeferred {
                peer,
                id,
                error: err.to_string(),
            });
        }
    }
}

/// Anything left in the registry at shutdown is abandoned; dropping the
/// registry releases every resource.
impl<E: Engine> Drop for Dispatcher<E> {
    fn drop(&mut self) {
        if !self.registry.is_empty() {
            tracing::info!(
                "Abandoning {} in-flight transfer(s) on shutdown",
                self.registry.len()
            );
        }
    }
}
