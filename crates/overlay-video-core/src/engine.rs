//! Boundary to the external decode/demux engine.
//!
//! The session talks to engines only through these traits. Implementations:
//! [`crate::pattern`] (synthetic test pattern, always available) and
//! `gst_engine` (GStreamer playbin, behind the `gstreamer` feature).

use crate::bus::BusWatch;
use crate::config::SessionConfig;
use crate::error::PlayerError;
use crate::mode::{RenderMode, SinkConfig, WindowRect};

/// Pipeline state requested from, or reported by, an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Null,
    Ready,
    Paused,
    Playing,
}

/// One engine handle, exclusively owned by a pipeline session.
pub trait MediaEngine: Send {
    /// Builds the pipeline for `uri` with the given output sink and brings it
    /// to Ready. Bus events from then on go through `bus`.
    fn initialize(&mut self, uri: &str, sink: SinkConfig, bus: BusWatch)
        -> Result<(), PlayerError>;

    /// Requests a pipeline state change.
    fn set_state(&mut self, state: EngineState) -> Result<(), PlayerError>;

    /// Moves the overlay plane. Only called for hole-punch sessions.
    fn set_window(&mut self, rect: WindowRect) -> Result<(), PlayerError>;

    /// Tears the pipeline down. Must tolerate being called more than once.
    fn release(&mut self);

    /// Engine name for logs.
    fn name(&self) -> &str {
        "engine"
    }
}

/// Creates engine handles for new sessions.
pub trait EngineFactory: Send + Sync {
    /// Checks that the capabilities `mode` needs are present.
    ///
    /// A failure here is fatal for the plugin instance.
    fn probe(&self, _mode: RenderMode) -> Result<(), PlayerError> {
        Ok(())
    }

    /// Creates an uninitialized engine handle.
    fn create(
        &self,
        mode: RenderMode,
        config: &SessionConfig,
    ) -> Result<Box<dyn MediaEngine>, PlayerError>;
}
