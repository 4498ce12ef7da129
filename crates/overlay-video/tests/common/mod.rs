//! Scripted engine and recording surface for instance tests.

#![allow(dead_code)]

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use overlay_video::core::{
    BusEvent, BusWatch, Color, EngineFactory, EngineState, FrameBuffer, FrameProducer,
    MediaEngine, PixelFormat, PlayerError, PresentationSurface, PushOutcome, RenderMode,
    SessionConfig, SinkConfig, SwapCompletion, SwapTicket, WindowRect,
};
use overlay_video::SurfaceProvider;
use parking_lot::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct EngineShared {
    created: usize,
    released: usize,
    probe_error: Option<PlayerError>,
    unsupported: Option<RenderMode>,
    bus: Option<BusWatch>,
    producer: Option<FrameProducer>,
    windows: Vec<WindowRect>,
}

/// Engine factory whose engines can be driven from the test.
#[derive(Clone, Default)]
pub struct ScriptedEngines {
    shared: Arc<Mutex<EngineShared>>,
}

impl ScriptedEngines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_probe(message: &str) -> Self {
        let engines = Self::default();
        engines.shared.lock().probe_error = Some(PlayerError::Engine(message.into()));
        engines
    }

    /// Engines whose probe rejects `mode`, as a build without kmssink would.
    pub fn without_mode(mode: RenderMode) -> Self {
        let engines = Self::default();
        engines.shared.lock().unsupported = Some(mode);
        engines
    }

    pub fn created(&self) -> usize {
        self.shared.lock().created
    }

    pub fn released(&self) -> usize {
        self.shared.lock().released
    }

    pub fn has_producer(&self) -> bool {
        self.shared.lock().producer.is_some()
    }

    pub fn windows(&self) -> Vec<WindowRect> {
        self.shared.lock().windows.clone()
    }

    /// Pushes a 2x2 RGBA frame filled with `tag`.
    pub fn push_frame(&self, tag: u8) -> Option<PushOutcome> {
        let producer = self.shared.lock().producer.clone()?;
        Some(producer.push(FrameBuffer::new(vec![tag; 16], 2, 2, PixelFormat::Rgba)))
    }

    pub fn emit(&self, event: BusEvent) {
        let Some(bus) = self.shared.lock().bus.clone() else {
            return;
        };
        bus.handle(&event);
    }
}

impl EngineFactory for ScriptedEngines {
    fn probe(&self, mode: RenderMode) -> Result<(), PlayerError> {
        let shared = self.shared.lock();
        if shared.unsupported == Some(mode) {
            return Err(PlayerError::Engine(format!("{mode:?} sink missing")));
        }
        match shared.probe_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn create(
        &self,
        _mode: RenderMode,
        _config: &SessionConfig,
    ) -> Result<Box<dyn MediaEngine>, PlayerError> {
        self.shared.lock().created += 1;
        Ok(Box::new(ScriptedEngine {
            shared: Arc::clone(&self.shared),
            state: EngineState::Null,
        }))
    }
}

struct ScriptedEngine {
    shared: Arc<Mutex<EngineShared>>,
    state: EngineState,
}

impl MediaEngine for ScriptedEngine {
    fn initialize(&mut self, _uri: &str, sink: SinkConfig, bus: BusWatch) -> Result<(), PlayerError> {
        let mut shared = self.shared.lock();
        shared.producer = match sink {
            SinkConfig::FrameCallback(cb) => Some(cb.producer),
            SinkConfig::OverlayPlane(_) => None,
        };
        shared.bus = Some(bus);
        self.state = EngineState::Ready;
        Ok(())
    }

    fn set_state(&mut self, state: EngineState) -> Result<(), PlayerError> {
        let bus = self.shared.lock().bus.clone();
        let old = std::mem::replace(&mut self.state, state);
        if let Some(bus) = bus {
            bus.handle(&BusEvent::StateChanged {
                from_pipeline: true,
                old,
                new: state,
            });
        }
        Ok(())
    }

    fn set_window(&mut self, rect: WindowRect) -> Result<(), PlayerError> {
        self.shared.lock().windows.push(rect);
        Ok(())
    }

    fn release(&mut self) {
        let mut shared = self.shared.lock();
        shared.released += 1;
        shared.bus = None;
        shared.producer = None;
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    Clear(Color),
    Upload(u8),
    Compile,
    Draw,
    Swap,
}

#[derive(Default)]
struct SurfaceLog {
    created: usize,
    calls: Vec<SurfaceCall>,
}

/// Surface provider whose surfaces log calls and complete swaps through a
/// channel, like the wgpu surface does.
#[derive(Clone)]
pub struct RecordingSurfaces {
    log: Arc<Mutex<SurfaceLog>>,
    tx: Sender<SwapCompletion>,
    rx: Receiver<SwapCompletion>,
}

impl RecordingSurfaces {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            log: Arc::default(),
            tx,
            rx,
        }
    }

    pub fn created(&self) -> usize {
        self.log.lock().created
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.log.lock().calls.clone()
    }

    pub fn count(&self, call: &SurfaceCall) -> usize {
        self.log.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn clear_calls(&self) {
        self.log.lock().calls.clear();
    }

    /// Completions waiting for the instance to pump them.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl SurfaceProvider for RecordingSurfaces {
    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn PresentationSurface>, PlayerError> {
        self.log.lock().created += 1;
        Ok(Box::new(RecordingSurface {
            log: Arc::clone(&self.log),
            tx: self.tx.clone(),
            size: (width, height),
        }))
    }

    fn completions(&self) -> Option<Receiver<SwapCompletion>> {
        Some(self.rx.clone())
    }
}

struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
    tx: Sender<SwapCompletion>,
    size: (u32, u32),
}

impl PresentationSurface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), PlayerError> {
        self.size = (width, height);
        Ok(())
    }

    fn clear(&mut self, color: Color) {
        self.log.lock().calls.push(SurfaceCall::Clear(color));
    }

    fn upload_frame(&mut self, frame: &FrameBuffer) -> Result<(), PlayerError> {
        self.log.lock().calls.push(SurfaceCall::Upload(frame.data()[0]));
        Ok(())
    }

    fn compile_blit_program(&mut self) -> Result<(), PlayerError> {
        self.log.lock().calls.push(SurfaceCall::Compile);
        Ok(())
    }

    fn draw_fullscreen_quad(&mut self) -> Result<(), PlayerError> {
        self.log.lock().calls.push(SurfaceCall::Draw);
        Ok(())
    }

    fn swap_buffers(&mut self, ticket: SwapTicket) -> Result<(), PlayerError> {
        self.log.lock().calls.push(SurfaceCall::Swap);
        let _ = self.tx.send(ticket.complete(0));
        Ok(())
    }
}
