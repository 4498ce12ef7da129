//! Rendering mode selection and the sink configuration each mode asks for.

use std::time::Duration;

use crate::config::SessionConfig;
use crate::frame::PixelFormat;
use crate::handoff::FrameProducer;

/// How decoded video reaches the screen. Fixed for the life of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    /// A hardware overlay plane shows the video; the GPU surface only
    /// clears a color-keyed hole for it.
    HolePunch,
    /// Frames are handed to the presentation loop and blitted as textures.
    #[default]
    Composited,
}

impl RenderMode {
    /// Maps the plugin's `hole` flag to a mode.
    pub fn from_hole_flag(hole: bool) -> Self {
        if hole {
            RenderMode::HolePunch
        } else {
            RenderMode::Composited
        }
    }

    pub fn use_hole(&self) -> bool {
        matches!(self, RenderMode::HolePunch)
    }

    /// Window rectangle updates only mean something to the overlay plane.
    pub fn routes_window_to_engine(&self) -> bool {
        self.use_hole()
    }
}

/// Visible region of the plugin in host coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowRect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Parameters for a direct hardware-plane sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayPlaneConfig {
    pub sync: bool,
    pub qos: bool,
    pub enable_last_sample: bool,
    pub max_lateness: Duration,
    /// Plane rectangle to apply once the sink exists
    pub window: Option<WindowRect>,
}

/// Parameters for a sink that raises a callback per decoded frame.
#[derive(Debug, Clone)]
pub struct FrameCallbackConfig {
    /// Where each decoded frame goes
    pub producer: FrameProducer,
    /// Layout the engine must convert frames to
    pub format: PixelFormat,
    /// Fixed output size, or the stream's native size
    pub size: Option<(u32, u32)>,
}

/// Output sink an engine is asked to build.
///
/// Only the composited variant carries a [`FrameProducer`], so a hole-punch
/// engine has nothing to push frames into.
#[derive(Debug, Clone)]
pub enum SinkConfig {
    OverlayPlane(OverlayPlaneConfig),
    FrameCallback(FrameCallbackConfig),
}

impl SinkConfig {
    /// Hardware-plane sink for hole-punch sessions.
    pub fn overlay_plane(config: &SessionConfig, window: Option<WindowRect>) -> Self {
        SinkConfig::OverlayPlane(OverlayPlaneConfig {
            sync: true,
            qos: true,
            enable_last_sample: false,
            max_lateness: config.max_lateness,
            window,
        })
    }

    /// Per-frame callback sink for composited sessions.
    pub fn frame_callback(config: &SessionConfig, producer: FrameProducer) -> Self {
        SinkConfig::FrameCallback(FrameCallbackConfig {
            producer,
            format: config.frame_format,
            size: config.frame_size,
        })
    }

    /// The mode this sink belongs to.
    pub fn mode(&self) -> RenderMode {
        match self {
            SinkConfig::OverlayPlane(_) => RenderMode::HolePunch,
            SinkConfig::FrameCallback(_) => RenderMode::Composited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::HandoffQueue;
    use std::sync::Arc;

    #[test]
    fn test_hole_flag_mapping() {
        assert_eq!(RenderMode::from_hole_flag(true), RenderMode::HolePunch);
        assert_eq!(RenderMode::from_hole_flag(false), RenderMode::Composited);
        assert!(RenderMode::HolePunch.routes_window_to_engine());
        assert!(!RenderMode::Composited.routes_window_to_engine());
    }

    #[test]
    fn test_overlay_plane_defaults() {
        let config = SessionConfig::default();
        let sink = SinkConfig::overlay_plane(&config, Some(WindowRect::from_size(640, 480)));
        let SinkConfig::OverlayPlane(plane) = sink else {
            panic!("expected overlay plane sink");
        };
        assert!(plane.sync && plane.qos);
        assert!(!plane.enable_last_sample);
        assert_eq!(plane.max_lateness, Duration::from_millis(20));
        assert_eq!(plane.window, Some(WindowRect::new(0, 0, 640, 480)));
    }

    #[test]
    fn test_frame_callback_carries_producer() {
        let config = SessionConfig::default().with_frame_size(320, 240);
        let queue = Arc::new(HandoffQueue::new(2));
        let sink = SinkConfig::frame_callback(&config, queue.producer());
        assert_eq!(sink.mode(), RenderMode::Composited);
        let SinkConfig::FrameCallback(cb) = sink else {
            panic!("expected frame callback sink");
        };
        assert_eq!(cb.size, Some((320, 240)));
        assert_eq!(cb.format, PixelFormat::Rgba);
    }

    #[test]
    fn test_empty_rect() {
        assert!(WindowRect::new(5, 5, 0, 10).is_empty());
        assert!(WindowRect::new(5, 5, 10, 0).is_empty());
        assert!(!WindowRect::from_size(1, 1).is_empty());
    }
}
