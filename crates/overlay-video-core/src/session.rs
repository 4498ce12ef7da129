//! Pipeline session: one engine handle and its lifecycle.
//!
//! A session owns exactly one [`MediaEngine`] from [`PipelineSession::create`]
//! until [`PipelineSession::stop`] or [`PipelineSession::release`]. Commands
//! are validated against the shared [`SessionStatus`] before the engine is
//! touched, and the state is rolled back if the engine refuses a transition.
//!
//! The status lock is never held across an engine call, since engines may
//! deliver bus events synchronously from inside `set_state`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bus::{BusWatch, SessionStatus, StatusSnapshot};
use crate::config::SessionConfig;
use crate::engine::{EngineFactory, EngineState, MediaEngine};
use crate::error::PlayerError;
use crate::handoff::HandoffQueue;
use crate::mode::{RenderMode, SinkConfig, WindowRect};
use crate::state::PipelineState;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A single stream's pipeline and its state.
pub struct PipelineSession {
    id: u64,
    mode: RenderMode,
    config: SessionConfig,
    /// None once stopped or released
    engine: Option<Box<dyn MediaEngine>>,
    /// True between a successful engine initialize and teardown
    engine_live: bool,
    status: SessionStatus,
    /// Handoff queue, composited sessions only
    frames: Option<Arc<HandoffQueue>>,
    window: Option<WindowRect>,
    uri: Option<String>,
}

impl PipelineSession {
    /// Creates a session and its engine handle. The render mode is fixed here.
    pub fn create(
        factory: &dyn EngineFactory,
        mode: RenderMode,
        config: &SessionConfig,
    ) -> Result<Self, PlayerError> {
        let config = config.clone().with_mode(mode);
        let engine = factory.create(mode, &config)?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let frames = match mode {
            RenderMode::Composited => Some(Arc::new(HandoffQueue::new(config.queue_capacity))),
            RenderMode::HolePunch => None,
        };
        tracing::info!(
            "session {} created ({:?}, engine {})",
            id,
            mode,
            engine.name()
        );
        Ok(Self {
            id,
            mode,
            config,
            engine: Some(engine),
            engine_live: false,
            status: SessionStatus::new(),
            frames,
            window: None,
            uri: None,
        })
    }

    /// Unique id of this session's engine handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Builds the engine pipeline for `uri` and moves to Ready.
    pub fn initialize(&mut self, uri: &str) -> Result<(), PlayerError> {
        let state = self.status.state();
        if state.is_initialized() {
            return Err(PlayerError::Engine(format!(
                "session {} already initialized ({state})",
                self.id
            )));
        }
        if state.is_terminal() {
            return Err(PlayerError::Protocol(format!(
                "session {} is {state}; create a new session",
                self.id
            )));
        }
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(PlayerError::Engine("empty source uri".to_string()));
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(PlayerError::Protocol(format!(
                "session {} was released; create a new session",
                self.id
            )));
        };

        let sink = match (self.mode, &self.frames) {
            (RenderMode::HolePunch, _) => SinkConfig::overlay_plane(&self.config, self.window),
            (RenderMode::Composited, Some(frames)) => {
                SinkConfig::frame_callback(&self.config, frames.producer())
            }
            (RenderMode::Composited, None) => {
                return Err(PlayerError::Engine("composited session has no queue".into()));
            }
        };

        self.status.begin_stream();
        if let Err(e) = engine.initialize(uri, sink, BusWatch::new(self.status.clone())) {
            tracing::warn!("session {}: initialize {} failed: {}", self.id, uri, e);
            engine.release();
            return Err(e);
        }
        self.engine_live = true;
        self.status
            .with(|inner| inner.machine.transition(PipelineState::Ready))?;
        self.uri = Some(uri.to_string());
        tracing::info!("session {} initialized with {}", self.id, uri);
        Ok(())
    }

    /// Starts or resumes playback.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        self.request(PipelineState::Playing, EngineState::Playing, true)
    }

    /// Pauses playback. A paused session is not resumed by buffering.
    pub fn pause(&mut self) -> Result<(), PlayerError> {
        self.request(PipelineState::Paused, EngineState::Paused, false)
    }

    /// Pauses if playing, otherwise plays.
    pub fn toggle(&mut self) -> Result<(), PlayerError> {
        match self.status.state() {
            PipelineState::Playing => self.pause(),
            PipelineState::Ready | PipelineState::Paused => self.play(),
            other => Err(PlayerError::Protocol(format!(
                "cannot toggle session {} in state {other}",
                self.id
            ))),
        }
    }

    fn request(
        &mut self,
        target: PipelineState,
        engine_state: EngineState,
        wants_playing: bool,
    ) -> Result<(), PlayerError> {
        let id = self.id;
        let (previous, previous_wants) = self.status.with(|inner| {
            let state = inner.machine.state();
            if !state.is_initialized() {
                return Err(PlayerError::Protocol(format!(
                    "cannot move session {id} to {target} while {state}"
                )));
            }
            let previous = inner.machine.transition(target)?;
            let previous_wants = std::mem::replace(&mut inner.wants_playing, wants_playing);
            Ok((previous, previous_wants))
        })?;

        let Some(engine) = self.engine.as_mut() else {
            return Err(PlayerError::Protocol(format!("session {id} has no engine")));
        };
        if let Err(e) = engine.set_state(engine_state) {
            tracing::warn!("session {}: {:?} failed, rolling back: {}", id, engine_state, e);
            self.status.with(|inner| {
                // A bus event may have moved the state meanwhile; leave that alone
                if inner.machine.state() == target {
                    inner.machine.restore(previous);
                    inner.wants_playing = previous_wants;
                }
            });
            return Err(e);
        }
        Ok(())
    }

    /// Tears the engine down and leaves the session Stopped.
    pub fn stop(&mut self) -> Result<(), PlayerError> {
        let state = self.status.state();
        if !state.is_initialized() {
            // Error and end-of-stream leave the engine parked in Ready
            self.teardown();
            tracing::debug!("session {}: stop in state {}", self.id, state);
            return Ok(());
        }
        self.teardown();
        self.status.with(|inner| {
            inner.wants_playing = false;
            inner.playing = false;
            inner.machine.transition(PipelineState::Stopped).map(|_| ())
        })?;
        tracing::info!("session {} stopped", self.id);
        Ok(())
    }

    /// Releases the engine and returns to Uninitialized. Never fails.
    pub fn release(&mut self) {
        if self.engine_live {
            tracing::info!("session {} released", self.id);
        }
        self.teardown();
        self.status.with(|inner| {
            inner.machine.reset();
            inner.wants_playing = false;
            inner.playing = false;
        });
    }

    fn teardown(&mut self) {
        if !self.engine_live {
            return;
        }
        self.engine_live = false;
        if let Some(mut engine) = self.engine.take() {
            engine.release();
        }
        if let Some(frames) = &self.frames {
            frames.close();
        }
    }

    /// Moves the overlay plane. Ignored for empty rectangles and for
    /// composited sessions.
    pub fn set_window(&mut self, rect: WindowRect) -> Result<(), PlayerError> {
        if rect.is_empty() {
            return Ok(());
        }
        self.window = Some(rect);
        if !self.mode.routes_window_to_engine() {
            return Ok(());
        }
        match self.engine.as_mut() {
            Some(engine) if self.engine_live => engine.set_window(rect),
            _ => Ok(()),
        }
    }

    /// Initialized, engine reports Playing, and no error or end-of-stream.
    pub fn is_playing(&self) -> bool {
        self.status.is_playing()
    }

    pub fn use_hole(&self) -> bool {
        self.mode.use_hole()
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn state(&self) -> PipelineState {
        self.status.state()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Consumer side of the handoff queue (composited sessions only).
    pub fn frames(&self) -> Option<Arc<HandoffQueue>> {
        self.frames.clone()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn window(&self) -> Option<WindowRect> {
        self.window
    }
}

impl Drop for PipelineSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PipelineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSession")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("state", &self.status.state())
            .field("uri", &self.uri)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{PatternConfig, PatternEngineFactory};

    fn factory() -> PatternEngineFactory {
        PatternEngineFactory::new(PatternConfig::default().with_size(8, 8).with_fps(200))
    }

    #[test]
    fn test_play_before_initialize_is_protocol_error() {
        let mut session =
            PipelineSession::create(&factory(), RenderMode::Composited, &SessionConfig::default())
                .unwrap();
        assert!(matches!(session.play(), Err(PlayerError::Protocol(_))));
        assert!(matches!(session.pause(), Err(PlayerError::Protocol(_))));
        assert_eq!(session.state(), PipelineState::Uninitialized);
    }

    #[test]
    fn test_lifecycle_with_pattern_engine() {
        let mut session =
            PipelineSession::create(&factory(), RenderMode::Composited, &SessionConfig::default())
                .unwrap();
        session.initialize("pattern://bars").unwrap();
        assert_eq!(session.state(), PipelineState::Ready);
        assert!(!session.is_playing());

        session.play().unwrap();
        assert!(session.is_playing());
        session.toggle().unwrap();
        assert_eq!(session.state(), PipelineState::Paused);
        assert!(!session.is_playing());

        session.stop().unwrap();
        assert_eq!(session.state(), PipelineState::Stopped);
        assert!(session.frames().map(|q| q.is_closed()).unwrap_or(false));

        session.release();
        assert_eq!(session.state(), PipelineState::Uninitialized);
        assert!(matches!(
            session.initialize("pattern://bars"),
            Err(PlayerError::Protocol(_))
        ));
    }

    #[test]
    fn test_empty_uri_rejected() {
        let mut session =
            PipelineSession::create(&factory(), RenderMode::HolePunch, &SessionConfig::default())
                .unwrap();
        assert!(matches!(session.initialize("  "), Err(PlayerError::Engine(_))));
        assert_eq!(session.state(), PipelineState::Uninitialized);
    }

    #[test]
    fn test_hole_punch_session_has_no_queue() {
        let session =
            PipelineSession::create(&factory(), RenderMode::HolePunch, &SessionConfig::default())
                .unwrap();
        assert!(session.use_hole());
        assert!(session.frames().is_none());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let config = SessionConfig::default();
        let a = PipelineSession::create(&factory(), RenderMode::Composited, &config).unwrap();
        let b = PipelineSession::create(&factory(), RenderMode::Composited, &config).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
