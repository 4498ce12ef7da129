//! overlay-video-core: frame pipeline core for overlay and composited video.
//!
//! This crate has no GPU or UI dependency. It contains:
//!
//! - Frame handoff: [`frame`], [`handoff`]
//! - Pipeline lifecycle: [`state`], [`bus`], [`session`]
//! - Engine boundary: [`engine`], [`pattern`], `gst_engine` (feature `gstreamer`)
//! - Presentation: [`presenter`], [`mode`]
//! - Settings and errors: [`config`], [`error`]
//!
//! It is consumed by `overlay-video` (host instance and wgpu surface).

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod handoff;
pub mod mode;
pub mod pattern;
pub mod presenter;
pub mod session;
pub mod state;

#[cfg(feature = "gstreamer")]
pub mod gst_engine;

pub use bus::{BusEvent, BusReaction, BusWatch, SessionStatus, StatusSnapshot};
pub use config::{Color, PlayerConfig, PresenterConfig, SessionConfig};
pub use engine::{EngineFactory, EngineState, MediaEngine};
pub use error::PlayerError;
pub use frame::{FrameBuffer, PixelFormat};
pub use handoff::{FrameProducer, HandoffQueue, HandoffStats, PushOutcome};
pub use mode::{RenderMode, SinkConfig, WindowRect};
pub use pattern::{PatternConfig, PatternEngineFactory};
pub use presenter::{
    LoopStatus, PresentationLoop, PresentationSurface, PresenterStats, SwapCompletion, SwapTicket,
};
pub use session::PipelineSession;
pub use state::{PipelineState, StateMachine};

#[cfg(feature = "gstreamer")]
pub use gst_engine::GstEngineFactory;
