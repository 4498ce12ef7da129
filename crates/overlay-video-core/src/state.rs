//! Pipeline lifecycle state machine.
//!
//! ```text
//!                      initialize
//!   Uninitialized ───────────────► Ready ──┬──► Playing ◄──► Paused
//!        ▲                           │     └──────────────────▲
//!        │ release (from any state)  │
//!        │                           ▼ EOS / stop        error event
//!        └──────────────────────  Stopped            Error ◄── Ready | Playing | Paused
//! ```
//!
//! Stopped and Error are terminal for an engine handle: playing again needs a
//! fresh create + initialize.

use crate::error::PlayerError;

/// Lifecycle state of a pipeline session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// No engine handle, or the handle was released
    #[default]
    Uninitialized,
    /// Engine initialized and prerolled, not playing
    Ready,
    /// Playing
    Playing,
    /// Paused by user or by buffering
    Paused,
    /// End of stream or explicit stop
    Stopped,
    /// Engine reported an error on the bus
    Error,
}

impl PipelineState {
    /// Returns true if an engine handle has been initialized and not torn down.
    pub fn is_initialized(&self) -> bool {
        matches!(
            self,
            PipelineState::Ready | PipelineState::Playing | PipelineState::Paused
        )
    }

    /// Stopped and Error both require a fresh session to play again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Stopped | PipelineState::Error)
    }

    /// Returns whether `self -> to` is a legal transition.
    pub fn can_transition_to(&self, to: PipelineState) -> bool {
        use PipelineState::*;
        match (*self, to) {
            (_, Uninitialized) => true,
            (Uninitialized, Ready) => true,
            (Ready, Playing) | (Ready, Paused) => true,
            (Playing, Paused) | (Paused, Playing) => true,
            (Ready | Playing | Paused, Stopped | Error) => true,
            _ => false,
        }
    }

    /// Lowercase name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Ready => "ready",
            PipelineState::Playing => "playing",
            PipelineState::Paused => "paused",
            PipelineState::Stopped => "stopped",
            PipelineState::Error => "error",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Validating wrapper around [`PipelineState`].
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    state: PipelineState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Moves to `to`, returning the previous state.
    ///
    /// Transitioning to the current state is accepted and changes nothing.
    pub fn transition(&mut self, to: PipelineState) -> Result<PipelineState, PlayerError> {
        let from = self.state;
        if from == to {
            return Ok(from);
        }
        if !from.can_transition_to(to) {
            return Err(PlayerError::Protocol(format!(
                "illegal transition {from} -> {to}"
            )));
        }
        tracing::debug!("pipeline state: {} -> {}", from, to);
        self.state = to;
        Ok(from)
    }

    /// Puts back a state saved before a failed engine call.
    pub fn restore(&mut self, previous: PipelineState) {
        if self.state != previous {
            tracing::debug!("pipeline state rollback: {} -> {}", self.state, previous);
        }
        self.state = previous;
    }

    /// Back to Uninitialized. Never fails.
    pub fn reset(&mut self) {
        self.state = PipelineState::Uninitialized;
    }
}
