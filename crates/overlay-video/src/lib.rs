//! overlay-video: embeddable video player instance.
//!
//! [`PlayerInstance`] takes the host's calls (attributes, view changes,
//! script commands, swap completions) and drives an
//! [`overlay_video_core::PipelineSession`] plus a
//! [`overlay_video_core::PresentationLoop`]. Surfaces come from a
//! [`SurfaceProvider`]; with the `wgpu` feature, [`WgpuSurfaceProvider`]
//! renders into an offscreen texture the host composites.
//!
//! ```ignore
//! let mut player = PlayerInstance::new(config, Box::new(engines), Box::new(surfaces))?;
//! player.init([("src", "file:///movie.mp4"), ("hole", "false")])?;
//! player.resize_surface(WindowRect::new(0, 0, 1280, 720))?;
//! // each host frame:
//! player.pump_swap_completions();
//! ```

pub mod instance;
pub mod surface;
pub mod upload;

#[cfg(feature = "wgpu")]
pub mod wgpu_surface;

pub use overlay_video_core as core;

pub use instance::{Command, InputEvent, PlayerInstance};
pub use overlay_video_core::{
    Color, PipelineState, PlayerConfig, PlayerError, RenderMode, SessionConfig, WindowRect,
};
pub use surface::SurfaceProvider;

#[cfg(feature = "wgpu")]
pub use wgpu_surface::{SurfaceTarget, TargetView, WgpuSurfaceProvider};
