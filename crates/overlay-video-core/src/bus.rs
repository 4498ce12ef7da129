//! Engine bus events and how they move the session state machine.
//!
//! The engine's bus runs on its own thread. [`BusWatch`] is the piece of the
//! session handed to that thread: it folds each [`BusEvent`] into the shared
//! [`SessionStatus`] and tells the engine which pipeline states to request in
//! response. It never calls back into the engine itself, so engines can apply
//! the reaction however their framework wants.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::EngineState;
use crate::state::{PipelineState, StateMachine};

/// Buffering percentage at which a stalled pipeline may resume.
pub const BUFFER_HIGH_THRESHOLD: i32 = 100;

/// Asynchronous notification from the decode engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// Engine error with its message
    Error(String),
    /// End of stream reached
    EndOfStream,
    /// Buffering progress in percent
    Buffering(i32),
    /// The pipeline clock became unusable
    ClockLost,
    /// An element changed state
    StateChanged {
        /// True if the source is the top-level pipeline
        from_pipeline: bool,
        old: EngineState,
        new: EngineState,
    },
}

/// Engine states to request, in order, after handling an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusReaction {
    requests: Vec<EngineState>,
}

impl BusReaction {
    pub fn none() -> Self {
        Self::default()
    }

    fn request(state: EngineState) -> Self {
        Self {
            requests: vec![state],
        }
    }

    /// States to request from the engine, in order.
    pub fn states(&self) -> &[EngineState] {
        &self.requests
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatusInner {
    pub(crate) machine: StateMachine,
    /// Last pipeline state reported on the bus was Playing
    pub(crate) playing: bool,
    /// Raised by error and end-of-stream
    pub(crate) stop: bool,
    /// The user asked to play and has not paused since
    pub(crate) wants_playing: bool,
    pub(crate) buffering_percent: i32,
    pub(crate) last_error: Option<String>,
    pub(crate) events_handled: u64,
    pub(crate) events_ignored: u64,
}

/// Point-in-time copy of a session's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: PipelineState,
    pub playing: bool,
    pub stop: bool,
    pub buffering_percent: i32,
    pub last_error: Option<String>,
    pub events_handled: u64,
    pub events_ignored: u64,
}

/// Session status shared between the command path and the bus thread.
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    inner: Arc<Mutex<StatusInner>>,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with the status locked.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut StatusInner) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn state(&self) -> PipelineState {
        self.inner.lock().machine.state()
    }

    /// Initialized, reported playing by the engine, and not stopped.
    pub fn is_playing(&self) -> bool {
        let inner = self.inner.lock();
        inner.machine.state().is_initialized() && inner.playing && !inner.stop
    }

    /// True after an error or end-of-stream.
    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stop
    }

    pub fn buffering_percent(&self) -> i32 {
        self.inner.lock().buffering_percent
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.lock();
        StatusSnapshot {
            state: inner.machine.state(),
            playing: inner.playing,
            stop: inner.stop,
            buffering_percent: inner.buffering_percent,
            last_error: inner.last_error.clone(),
            events_handled: inner.events_handled,
            events_ignored: inner.events_ignored,
        }
    }

    /// Clears the per-stream flags before a new initialize.
    pub(crate) fn begin_stream(&self) {
        let mut inner = self.inner.lock();
        inner.playing = false;
        inner.stop = false;
        inner.wants_playing = false;
        inner.buffering_percent = 0;
        inner.last_error = None;
    }
}

/// Bus-thread view of a session.
#[derive(Debug, Clone)]
pub struct BusWatch {
    status: SessionStatus,
}

impl BusWatch {
    pub fn new(status: SessionStatus) -> Self {
        Self { status }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Folds one event into the session status.
    pub fn handle(&self, event: &BusEvent) -> BusReaction {
        let mut inner = self.status.inner.lock();
        let state = inner.machine.state();

        if !state.is_initialized() {
            // Late events for a torn-down or not-yet-ready pipeline
            if let BusEvent::Error(msg) = event {
                inner.last_error = Some(msg.clone());
            }
            inner.events_ignored += 1;
            tracing::debug!("bus event {:?} ignored in state {}", event, state);
            return BusReaction::none();
        }
        inner.events_handled += 1;

        match event {
            BusEvent::Error(msg) => {
                tracing::error!("pipeline error: {}", msg);
                let _ = inner.machine.transition(PipelineState::Error);
                inner.last_error = Some(msg.clone());
                inner.stop = true;
                inner.playing = false;
                inner.wants_playing = false;
                BusReaction::request(EngineState::Ready)
            }
            BusEvent::EndOfStream => {
                tracing::info!("end of stream");
                let _ = inner.machine.transition(PipelineState::Stopped);
                inner.stop = true;
                inner.playing = false;
                inner.wants_playing = false;
                BusReaction::request(EngineState::Ready)
            }
            BusEvent::Buffering(percent) => {
                let percent = *percent;
                inner.buffering_percent = percent;
                if inner.playing {
                    return BusReaction::none();
                }
                tracing::debug!("buffering: {}%", percent);
                if percent < BUFFER_HIGH_THRESHOLD {
                    BusReaction::request(EngineState::Paused)
                } else if inner.wants_playing {
                    BusReaction::request(EngineState::Playing)
                } else {
                    // User paused; stay paused once the buffer is full
                    BusReaction::none()
                }
            }
            BusEvent::ClockLost => {
                if !inner.wants_playing {
                    return BusReaction::none();
                }
                tracing::debug!("clock lost, renegotiating");
                BusReaction {
                    requests: vec![EngineState::Paused, EngineState::Playing],
                }
            }
            BusEvent::StateChanged {
                from_pipeline,
                old,
                new,
            } => {
                if !*from_pipeline {
                    return BusReaction::none();
                }
                tracing::debug!("pipeline state changed: {:?} -> {:?}", old, new);
                inner.playing = *new == EngineState::Playing;
                if inner.playing && inner.wants_playing && state != PipelineState::Playing {
                    let _ = inner.machine.transition(PipelineState::Playing);
                }
                BusReaction::none()
            }
        }
    }
}
