//! Control State Machine
//!
//! PAUSE / RESUME / CANCEL transitions. Validation is pure; applying a
//! transition goes through the registry so terminal states release the
//! resource.

use crate::engine::{Control, Engine, EngineError, PeerId, TransferId};
use crate::error::{Result, TransitionError};
use crate::registry::TransferRegistry;
use crate::transfer::{Direction, TransferState};

/// Who issued a control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Local user / API call
    Local,
    /// Control indication from the peer
    Remote,
}

/// Compute the state a control command leads to, without mutating anything.
pub fn next_state(
    direction: Direction,
    state: TransferState,
    control: Control,
    origin: Origin,
) -> std::result::Result<TransferState, TransitionError> {
    use TransferState::*;

    if state.is_terminal() {
        return Err(TransitionError::Finished);
    }

    match (control, state) {
        (Control::Cancel, _) => Ok(Cancelled),
        (Control::Pause, Active) => Ok(Paused),
        (Control::Pause, Paused) => Err(TransitionError::AlreadyPaused),
        (Control::Pause, _) => Err(TransitionError::NotActive),
        (Control::Resume, Paused) => Ok(Active),
        (Control::Resume, Active) => Err(TransitionError::NotPaused),
        (Control::Resume, Pending) => match (direction, origin) {
            (Direction::Incoming, Origin::Local) | (Direction::Outgoing, Origin::Remote) => {
                Ok(Active)
            }
            (Direction::Incoming, Origin::Remote) => Err(TransitionError::AwaitingLocalAccept),
            (Direction::Outgoing, Origin::Local) => Err(TransitionError::AwaitingRemoteAccept),
        },
        (Control::Resume, Completed | Cancelled) => Err(TransitionError::Finished),
    }
}

/// Apply a control indication received from the peer. Nothing is sent back.
pub fn apply_remote(
    registry: &mut TransferRegistry,
    peer: PeerId,
    id: TransferId,
    control: Control,
) -> Result<TransferState> {
    let transfer = registry.lookup(peer, id)?;
    let next = next_state(transfer.direction(), transfer.state(), control, Origin::Remote)?;
    registry.set_state(peer, id, next)
}

/// A local command that took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub state: TransferState,
    /// The engine refused to tell the peer; the local change stands anyway.
    pub undelivered: Option<EngineError>,
}

/// Apply a locally issued control command.
///
/// PAUSE and RESUME go to the engine first; if the engine refuses them the
/// transfer is left exactly as it was. CANCEL always takes effect locally,
/// a refused send is reported through [`Applied::undelivered`].
pub fn apply_local<E: Engine>(
    registry: &mut TransferRegistry,
    engine: &mut E,
    peer: PeerId,
    id: TransferId,
    control: Control,
) -> Result<Applied> {
    let transfer = registry.lookup(peer, id)?;
    let direction = transfer.direction();
    let state = transfer.state();
    let has_resource = transfer.has_resource();
    let next = next_state(direction, state, control, Origin::Local)?;

    if control == Control::Cancel {
        let undelivered = engine.send_control(peer, id, control).err();
        if let Some(e) = undelivered {
            tracing::warn!("Could not send CANCEL for transfer {} ({}): {}", id, peer, e);
        }
        let state = registry.set_state(peer, id, next)?;
        return Ok(Applied { state, undelivered });
    }

    let accepting = state == TransferState::Pending && next == TransferState::Active;
    if accepting && !has_resource {
        return Err(TransitionError::AwaitingLocalAccept.into());
    }

    if accepting {
        engine.accept_transfer(peer, id)?;
    } else {
        engine.send_control(peer, id, control)?;
    }

    let state = registry.set_state(peer, id, next)?;
    Ok(Applied {
        state,
        undelivered: None,
    })
}
