//! In-memory player configuration.
//!
//! Nothing here is persisted. Hosts build a [`PlayerConfig`] in code or fold
//! plugin embed attributes into one with [`PlayerConfig::apply_attribute`].

use std::time::Duration;

use crate::error::PlayerError;
use crate::frame::PixelFormat;
use crate::handoff::DEFAULT_QUEUE_CAPACITY;
use crate::mode::RenderMode;

/// Default GStreamer plugin search path, used only when the variable is unset.
pub const DEFAULT_PLUGIN_PATH: &str = "/usr/lib/gstreamer-1.0";

/// Default maximum lateness for the overlay-plane sink.
pub const DEFAULT_MAX_LATENESS: Duration = Duration::from_millis(20);

/// Linear RGBA clear color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .ok()
                .map(|v| v as f32 / 255.0)
        };
        Some(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Settings fixed at session creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: RenderMode,
    /// Handoff queue bound (composited only)
    pub queue_capacity: usize,
    /// Fixed composited output size, or the stream's native size
    pub frame_size: Option<(u32, u32)>,
    /// Layout composited frames are converted to
    pub frame_format: PixelFormat,
    /// Overlay-plane sink lateness budget
    pub max_lateness: Duration,
    /// Plugin search path applied if the environment has none
    pub plugin_path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Composited,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            frame_size: None,
            frame_format: PixelFormat::Rgba,
            max_lateness: DEFAULT_MAX_LATENESS,
            plugin_path: Some(DEFAULT_PLUGIN_PATH.to_string()),
        }
    }
}

impl SessionConfig {
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    pub fn with_max_lateness(mut self, lateness: Duration) -> Self {
        self.max_lateness = lateness;
        self
    }

    pub fn with_plugin_path(mut self, path: Option<String>) -> Self {
        self.plugin_path = path;
        self
    }
}

/// Settings for the presentation loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenterConfig {
    /// Color the overlay compositor treats as transparent
    pub color_key: Color,
    /// First-clear color for composited surfaces
    pub background: Color,
}

impl Default for PresenterConfig {
    fn default() -> Self {
        Self {
            color_key: Color::RED,
            background: Color::GREEN,
        }
    }
}

/// Everything a plugin instance needs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerConfig {
    /// Source URI to start with, if any
    pub src: Option<String>,
    pub session: SessionConfig,
    pub presenter: PresenterConfig,
}

impl PlayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_hole(mut self, hole: bool) -> Self {
        self.session.mode = RenderMode::from_hole_flag(hole);
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_color_key(mut self, color: Color) -> Self {
        self.presenter.color_key = color;
        self
    }

    /// Builds a config from embed attributes, skipping ones that fail to parse.
    pub fn from_attributes<'a>(attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut config = Self::default();
        for (key, value) in attrs {
            if let Err(e) = config.apply_attribute(key, value) {
                tracing::warn!("ignoring attribute {}={:?}: {}", key, value, e);
            }
        }
        config
    }

    /// Folds one embed attribute into the config.
    ///
    /// Unknown keys are logged and ignored; malformed values are a
    /// [`PlayerError::Protocol`].
    pub fn apply_attribute(&mut self, key: &str, value: &str) -> Result<(), PlayerError> {
        match key.to_ascii_lowercase().as_str() {
            "src" => {
                let value = value.trim();
                self.src = (!value.is_empty()).then(|| value.to_string());
            }
            "hole" => {
                let hole = parse_bool(value)
                    .ok_or_else(|| PlayerError::Protocol(format!("bad hole flag {value:?}")))?;
                self.session.mode = RenderMode::from_hole_flag(hole);
            }
            "queue-capacity" => {
                let capacity: usize = value.trim().parse().map_err(|_| {
                    PlayerError::Protocol(format!("bad queue capacity {value:?}"))
                })?;
                self.session.queue_capacity = capacity.max(1);
            }
            "color-key" => {
                self.presenter.color_key = Color::from_hex(value)
                    .ok_or_else(|| PlayerError::Protocol(format!("bad color key {value:?}")))?;
            }
            other => {
                tracing::debug!("unknown attribute {:?} ignored", other);
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
