//! Plugin instance: the host's entry points wired to a session and a
//! presentation loop.
//!
//! The host calls into this from a single thread: embed attributes at
//! [`PlayerInstance::init`], view changes through
//! [`PlayerInstance::resize_surface`], script messages through
//! [`PlayerInstance::dispatch`], and swap completions through
//! [`PlayerInstance::on_swap_complete`] (or
//! [`PlayerInstance::pump_swap_completions`] when the surface completes on
//! another thread).

use std::str::FromStr;

use crossbeam_channel::Receiver;
use overlay_video_core::{
    EngineFactory, LoopStatus, PipelineSession, PipelineState, PlayerConfig, PlayerError,
    PresentationLoop, PresenterStats, RenderMode, SwapCompletion, WindowRect,
};

use crate::surface::SurfaceProvider;

/// Script-level command posted by the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start if idle, otherwise toggle pause
    PlayPause,
    /// Tear the session down
    Stop,
}

impl FromStr for Command {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "playPause()" => Ok(Command::PlayPause),
            "stop()" => Ok(Command::Stop),
            other => Err(PlayerError::Protocol(format!("unknown command {other:?}"))),
        }
    }
}

/// Input forwarded by the host. Only used for the fullscreen toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    MouseDown,
    MouseUp,
    KeyDown,
    Other,
}

/// One embedded player.
pub struct PlayerInstance {
    config: PlayerConfig,
    engines: Box<dyn EngineFactory>,
    surfaces: Box<dyn SurfaceProvider>,
    completions: Option<Receiver<SwapCompletion>>,
    session: Option<PipelineSession>,
    presenter: PresentationLoop,
    source_uri: Option<String>,
    /// Last non-empty view rectangle
    view: Option<WindowRect>,
    fullscreen: bool,
}

impl PlayerInstance {
    /// Creates an instance after probing both collaborators.
    ///
    /// A failed probe is [`PlayerError::Fatal`]: the instance cannot run at all.
    pub fn new(
        config: PlayerConfig,
        engines: Box<dyn EngineFactory>,
        surfaces: Box<dyn SurfaceProvider>,
    ) -> Result<Self, PlayerError> {
        engines
            .probe(config.session.mode)
            .map_err(into_fatal)?;
        surfaces.probe().map_err(into_fatal)?;

        let completions = surfaces.completions();
        let source_uri = config.src.clone();
        let mut presenter = PresentationLoop::new(config.presenter);
        presenter.set_mode(config.session.mode);
        tracing::info!("player instance created ({:?})", config.session.mode);
        Ok(Self {
            config,
            engines,
            surfaces,
            completions,
            session: None,
            presenter,
            source_uri,
            view: None,
            fullscreen: false,
        })
    }

    /// Applies embed attributes and starts playback if a source was given.
    ///
    /// Malformed attributes are logged and skipped.
    pub fn init<'a>(
        &mut self,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), PlayerError> {
        let probed = self.config.session.mode;
        for (key, value) in attributes {
            if let Err(e) = self.config.apply_attribute(key, value) {
                tracing::warn!("ignoring attribute {}={:?}: {}", key, value, e);
            }
        }
        let mode = self.config.session.mode;
        if mode != probed {
            // A `hole` attribute selected a mode the startup probe never saw
            if let Err(e) = self.engines.probe(mode) {
                self.config.session.mode = probed;
                return Err(into_fatal(e));
            }
            self.presenter.set_mode(mode);
            tracing::info!("render mode switched to {:?} by attributes", mode);
        }
        if self.config.src.is_some() {
            self.source_uri = self.config.src.clone();
        }
        match self.source_uri.is_some() {
            true => self.start_play(),
            false => Ok(()),
        }
    }

    /// Host view change. Empty rectangles are ignored.
    pub fn resize_surface(&mut self, rect: WindowRect) -> Result<(), PlayerError> {
        if rect.is_empty() {
            tracing::trace!("ignoring empty view {:?}", rect);
            return Ok(());
        }
        self.view = Some(rect);

        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.set_window(rect) {
                tracing::warn!("set_window failed: {}", e);
            }
        }

        if self.presenter.has_surface() {
            self.presenter.resize(rect.width, rect.height)?;
        } else {
            let surface = self.surfaces.create_surface(rect.width, rect.height)?;
            self.presenter.attach_surface(surface);
        }
        self.presenter.kick();
        Ok(())
    }

    /// Handles a script command.
    pub fn dispatch(&mut self, command: Command) -> Result<(), PlayerError> {
        tracing::debug!("dispatch {:?}", command);
        match command {
            Command::PlayPause => {
                let state = self.session.as_ref().map(|s| s.state());
                match (self.session.as_mut(), state) {
                    (Some(session), Some(PipelineState::Playing)) => session.pause(),
                    (Some(session), Some(PipelineState::Ready | PipelineState::Paused)) => {
                        session.play()
                    }
                    // No live handle: start over with a fresh one
                    _ => self.start_play(),
                }
            }
            Command::Stop => {
                self.stop_session();
                Ok(())
            }
        }
    }

    /// Parses and dispatches a host message string.
    pub fn handle_message(&mut self, message: &str) -> Result<(), PlayerError> {
        let command = message.parse::<Command>()?;
        self.dispatch(command)
    }

    /// Sets the source used by the next start. A running session keeps its own.
    pub fn set_source_uri(&mut self, uri: impl Into<String>) {
        let uri = uri.into();
        self.source_uri = (!uri.trim().is_empty()).then_some(uri);
    }

    /// Host reported the GPU context gone. Rebuilds the surface at the last
    /// known size; the blit program is rebuilt on the next frame.
    pub fn on_surface_lost(&mut self) -> Result<(), PlayerError> {
        tracing::info!("surface lost");
        self.presenter.detach_surface();
        let Some(view) = self.view else {
            return Ok(());
        };
        let surface = self.surfaces.create_surface(view.width, view.height)?;
        self.presenter.attach_surface(surface);
        self.presenter.kick();
        Ok(())
    }

    /// Mouse-up toggles fullscreen. Returns the resulting flag.
    pub fn on_input_event(&mut self, event: InputEvent) -> bool {
        if event == InputEvent::MouseUp {
            self.fullscreen = !self.fullscreen;
            tracing::debug!("fullscreen {}", self.fullscreen);
        }
        self.fullscreen
    }

    /// Feeds one swap completion to the presentation loop.
    pub fn on_swap_complete(&mut self, completion: SwapCompletion) -> LoopStatus {
        self.presenter.on_swap_complete(completion)
    }

    /// Handles the completions queued by the surface so far. Returns how many
    /// were handled.
    ///
    /// Completions produced while pumping wait for the next call, so one pump
    /// advances the loop by at most one tick per outstanding swap.
    pub fn pump_swap_completions(&mut self) -> usize {
        let Some(rx) = self.completions.clone() else {
            return 0;
        };
        let queued = rx.len();
        let mut handled = 0;
        for completion in rx.try_iter().take(queued) {
            self.presenter.on_swap_complete(completion);
            handled += 1;
        }
        handled
    }

    fn start_play(&mut self) -> Result<(), PlayerError> {
        let Some(uri) = self.source_uri.clone() else {
            return Err(PlayerError::Protocol("no source uri set".into()));
        };
        self.stop_session();

        let mode = self.config.session.mode;
        let mut session = PipelineSession::create(self.engines.as_ref(), mode, &self.config.session)?;
        if let Some(view) = self.view {
            session.set_window(view)?;
        }
        session.initialize(&uri)?;
        session.play()?;

        self.presenter.set_mode(mode);
        self.presenter.set_frames(session.frames());
        tracing::info!("playing {} in session {}", uri, session.id());
        self.session = Some(session);
        self.presenter.kick();
        Ok(())
    }

    fn stop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop() {
                tracing::warn!("stop failed: {}", e);
            }
            session.release();
        }
        self.presenter.set_frames(None);
    }

    /// Initialized, playing, and not stopped by an error or end-of-stream.
    pub fn is_playing(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_playing())
    }

    /// State of the current session, Uninitialized if there is none.
    pub fn state(&self) -> PipelineState {
        self.session
            .as_ref()
            .map_or(PipelineState::Uninitialized, |s| s.state())
    }

    /// Engine handle id of the current session.
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id())
    }

    pub fn session(&self) -> Option<&PipelineSession> {
        self.session.as_ref()
    }

    /// Mode of the live session, or the configured mode when there is none.
    pub fn mode(&self) -> RenderMode {
        self.session
            .as_ref()
            .map_or(self.config.session.mode, |s| s.mode())
    }

    pub fn use_hole(&self) -> bool {
        self.mode().use_hole()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn has_surface(&self) -> bool {
        self.presenter.has_surface()
    }

    pub fn is_presenting(&self) -> bool {
        self.presenter.is_running()
    }

    pub fn presenter_stats(&self) -> PresenterStats {
        self.presenter.stats()
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }
}

impl Drop for PlayerInstance {
    fn drop(&mut self) {
        self.stop_session();
        self.presenter.detach_surface();
    }
}

fn into_fatal(err: PlayerError) -> PlayerError {
    match err {
        PlayerError::Fatal(_) => err,
        other => PlayerError::Fatal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!("playPause()".parse::<Command>().unwrap(), Command::PlayPause);
        assert_eq!(" stop() ".parse::<Command>().unwrap(), Command::Stop);
        assert!(matches!(
            "seek(10)".parse::<Command>(),
            Err(PlayerError::Protocol(_))
        ));
    }

    #[test]
    fn test_into_fatal_wraps_other_errors() {
        assert_eq!(
            into_fatal(PlayerError::Engine("no playbin".into())),
            PlayerError::Fatal("Engine error: no playbin".into())
        );
        assert_eq!(
            into_fatal(PlayerError::Fatal("x".into())),
            PlayerError::Fatal("x".into())
        );
    }
}
