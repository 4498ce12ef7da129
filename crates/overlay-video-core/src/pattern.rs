//! Synthetic test-pattern engine.
//!
//! Produces scrolling color bars on a background thread, paced to a fixed
//! frame rate, and reports state changes and end-of-stream through the bus
//! like a real engine would. Used by hosts without GStreamer and by tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::bus::{BusEvent, BusReaction, BusWatch};
use crate::config::SessionConfig;
use crate::engine::{EngineFactory, EngineState, MediaEngine};
use crate::error::PlayerError;
use crate::frame::{FrameBuffer, PixelFormat};
use crate::mode::{RenderMode, SinkConfig, WindowRect};

/// URI scheme the pattern engine answers to. Any other URI is accepted too.
pub const PATTERN_SCHEME: &str = "pattern://";

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Pattern engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternConfig {
    /// Output size when the sink does not fix one
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Post end-of-stream after this many frames
    pub frames_before_eos: Option<u64>,
    /// Post an error after this many frames
    pub frames_before_error: Option<u64>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            fps: 30,
            frames_before_eos: None,
            frames_before_error: None,
        }
    }
}

impl PatternConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    pub fn with_eos_after(mut self, frames: u64) -> Self {
        self.frames_before_eos = Some(frames);
        self
    }

    pub fn with_error_after(mut self, frames: u64) -> Self {
        self.frames_before_error = Some(frames);
        self
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Factory for [`PatternEngine`] handles.
#[derive(Debug, Clone, Default)]
pub struct PatternEngineFactory {
    config: PatternConfig,
}

impl PatternEngineFactory {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for PatternEngineFactory {
    fn create(
        &self,
        _mode: RenderMode,
        _config: &SessionConfig,
    ) -> Result<Box<dyn MediaEngine>, PlayerError> {
        Ok(Box::new(PatternEngine::new(self.config.clone())))
    }
}

enum PatternCommand {
    Play,
    Pause,
    Stop,
}

/// Test-pattern engine handle.
pub struct PatternEngine {
    config: PatternConfig,
    bus: Option<BusWatch>,
    state: EngineState,
    command_tx: Option<Sender<PatternCommand>>,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    window: Option<WindowRect>,
}

impl PatternEngine {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            config,
            bus: None,
            state: EngineState::Null,
            command_tx: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
            window: None,
        }
    }

    /// Last overlay rectangle received (hole-punch sessions).
    pub fn window(&self) -> Option<WindowRect> {
        self.window
    }

    fn send(&self, command: PatternCommand) {
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(command);
        }
    }
}

impl MediaEngine for PatternEngine {
    fn initialize(
        &mut self,
        uri: &str,
        sink: SinkConfig,
        bus: BusWatch,
    ) -> Result<(), PlayerError> {
        if self.bus.is_some() {
            return Err(PlayerError::Engine("pattern engine already initialized".into()));
        }
        if !uri.starts_with(PATTERN_SCHEME) {
            tracing::debug!("pattern engine ignoring source {}", uri);
        }

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        self.stop_flag.store(false, Ordering::Release);

        match sink {
            SinkConfig::FrameCallback(cb) => {
                let (width, height) = cb.size.unwrap_or((self.config.width, self.config.height));
                let worker = PatternWorker {
                    config: self.config.clone(),
                    width: width.max(1),
                    height: height.max(1),
                    format: cb.format,
                    producer: cb.producer,
                    bus: bus.clone(),
                    stop: Arc::clone(&self.stop_flag),
                };
                let handle = thread::Builder::new()
                    .name("pattern-engine".into())
                    .spawn(move || worker.run(command_rx))
                    .map_err(|e| PlayerError::Engine(format!("failed to spawn pattern thread: {e}")))?;
                self.handle = Some(handle);
            }
            SinkConfig::OverlayPlane(plane) => {
                // Nothing to draw: the overlay plane is outside our reach
                self.window = plane.window;
            }
        }

        self.command_tx = Some(command_tx);
        self.bus = Some(bus);
        self.state = EngineState::Ready;
        tracing::info!("pattern engine ready ({}x{} @ {} fps)", self.config.width, self.config.height, self.config.fps);
        Ok(())
    }

    fn set_state(&mut self, state: EngineState) -> Result<(), PlayerError> {
        let Some(bus) = self.bus.clone() else {
            return Err(PlayerError::Engine("pattern engine not initialized".into()));
        };
        let old = std::mem::replace(&mut self.state, state);
        match state {
            EngineState::Playing => self.send(PatternCommand::Play),
            _ => self.send(PatternCommand::Pause),
        }
        let reaction = bus.handle(&BusEvent::StateChanged {
            from_pipeline: true,
            old,
            new: state,
        });
        if let Some(&last) = reaction.states().last() {
            self.state = last;
            match last {
                EngineState::Playing => self.send(PatternCommand::Play),
                _ => self.send(PatternCommand::Pause),
            }
        }
        Ok(())
    }

    fn set_window(&mut self, rect: WindowRect) -> Result<(), PlayerError> {
        tracing::debug!("pattern engine window {:?}", rect);
        self.window = Some(rect);
        Ok(())
    }

    fn release(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        self.send(PatternCommand::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.command_tx = None;
        self.bus = None;
        self.state = EngineState::Null;
    }

    fn name(&self) -> &str {
        "pattern"
    }
}

impl Drop for PatternEngine {
    fn drop(&mut self) {
        self.release();
    }
}

struct PatternWorker {
    config: PatternConfig,
    width: u32,
    height: u32,
    format: PixelFormat,
    producer: crate::handoff::FrameProducer,
    bus: BusWatch,
    stop: Arc<AtomicBool>,
}

impl PatternWorker {
    fn run(self, commands: Receiver<PatternCommand>) {
        let interval = self.config.frame_interval();
        let mut playing = false;
        let mut produced = 0u64;

        loop {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let command = if playing {
                match commands.recv_timeout(interval) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match commands.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => break,
                }
            };

            match command {
                Some(PatternCommand::Play) => playing = true,
                Some(PatternCommand::Pause) => playing = false,
                Some(PatternCommand::Stop) => break,
                None => {
                    if self.producer.is_closed() {
                        break;
                    }
                    let frame = render_bars(self.width, self.height, self.format, produced);
                    self.producer.push(frame);
                    produced += 1;
                    tracing::trace!("pattern frame {}", produced);

                    let event = if self.config.frames_before_error == Some(produced) {
                        Some(BusEvent::Error("pattern engine: injected error".into()))
                    } else if self.config.frames_before_eos == Some(produced) {
                        Some(BusEvent::EndOfStream)
                    } else {
                        None
                    };
                    if let Some(event) = event {
                        let reaction = self.bus.handle(&event);
                        playing = apply_reaction(playing, &reaction);
                    }
                }
            }
        }
        tracing::debug!("pattern thread exiting after {} frames", produced);
    }
}

fn apply_reaction(playing: bool, reaction: &BusReaction) -> bool {
    match reaction.states().last() {
        Some(EngineState::Playing) => true,
        Some(_) => false,
        None => playing,
    }
}

/// Renders vertical color bars scrolled by `offset` columns.
pub fn render_bars(width: u32, height: u32, format: PixelFormat, offset: u64) -> FrameBuffer {
    let bpp = format.bytes_per_pixel();
    let width_px = width as usize;
    let bar_width = (width_px / BARS.len()).max(1);
    let shift = (offset as usize).wrapping_mul(2);

    let mut row = Vec::with_capacity(width_px * bpp);
    for x in 0..width_px {
        let [r, g, b] = BARS[((x + shift) / bar_width) % BARS.len()];
        match format {
            PixelFormat::Rgba => row.extend_from_slice(&[r, g, b, 255]),
            PixelFormat::Bgra => row.extend_from_slice(&[b, g, r, 255]),
            PixelFormat::Rgb24 => row.extend_from_slice(&[r, g, b]),
        }
    }

    let mut data = Vec::with_capacity(row.len() * height as usize);
    for _ in 0..height {
        data.extend_from_slice(&row);
    }
    FrameBuffer::new(data, width, height, format)
}
