//! Scripted engine used by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use overlay_video_core::{
    BusEvent, BusWatch, EngineFactory, EngineState, FrameBuffer, FrameProducer, MediaEngine,
    PixelFormat, PlayerError, PushOutcome, RenderMode, SessionConfig, SinkConfig, WindowRect,
};
use parking_lot::Mutex;

/// Routes engine and session logs to the test harness. Set RUST_LOG to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
pub struct FakeShared {
    pub created: usize,
    pub released: usize,
    pub calls: Vec<String>,
    pub fail_initialize: bool,
    pub fail_set_state: bool,
    pub bus: Option<BusWatch>,
    pub producer: Option<FrameProducer>,
    pub sink_mode: Option<RenderMode>,
    pub windows: Vec<WindowRect>,
    pub reactions: Vec<EngineState>,
}

/// Factory whose engines record every call and let tests drive the bus.
#[derive(Clone, Default)]
pub struct FakeEngineFactory {
    pub shared: Arc<Mutex<FakeShared>>,
}

impl FakeEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.shared.lock().created
    }

    pub fn released(&self) -> usize {
        self.shared.lock().released
    }

    pub fn calls(&self) -> Vec<String> {
        self.shared.lock().calls.clone()
    }

    pub fn fail_initialize(&self, fail: bool) {
        self.shared.lock().fail_initialize = fail;
    }

    pub fn fail_set_state(&self, fail: bool) {
        self.shared.lock().fail_set_state = fail;
    }

    pub fn has_producer(&self) -> bool {
        self.shared.lock().producer.is_some()
    }

    pub fn windows(&self) -> Vec<WindowRect> {
        self.shared.lock().windows.clone()
    }

    pub fn reactions(&self) -> Vec<EngineState> {
        self.shared.lock().reactions.clone()
    }

    /// Pushes a 1x1 frame tagged with `tag` through the sink callback.
    pub fn push_frame(&self, tag: u8) -> Option<PushOutcome> {
        let producer = self.shared.lock().producer.clone()?;
        Some(producer.push(FrameBuffer::new(vec![tag; 4], 1, 1, PixelFormat::Rgba)))
    }

    /// Delivers a bus event as the engine's bus thread would.
    pub fn emit(&self, event: BusEvent) {
        let Some(bus) = self.shared.lock().bus.clone() else {
            return;
        };
        let reaction = bus.handle(&event);
        self.shared
            .lock()
            .reactions
            .extend_from_slice(reaction.states());
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(
        &self,
        _mode: RenderMode,
        _config: &SessionConfig,
    ) -> Result<Box<dyn MediaEngine>, PlayerError> {
        self.shared.lock().created += 1;
        Ok(Box::new(FakeEngine {
            shared: Arc::clone(&self.shared),
            state: EngineState::Null,
        }))
    }
}

pub struct FakeEngine {
    shared: Arc<Mutex<FakeShared>>,
    state: EngineState,
}

impl MediaEngine for FakeEngine {
    fn initialize(
        &mut self,
        uri: &str,
        sink: SinkConfig,
        bus: BusWatch,
    ) -> Result<(), PlayerError> {
        let mut shared = self.shared.lock();
        shared.calls.push(format!("initialize {uri}"));
        if shared.fail_initialize {
            return Err(PlayerError::Engine("missing sink element".into()));
        }
        shared.sink_mode = Some(sink.mode());
        shared.producer = match sink {
            SinkConfig::FrameCallback(cb) => Some(cb.producer),
            SinkConfig::OverlayPlane(_) => None,
        };
        shared.bus = Some(bus);
        self.state = EngineState::Ready;
        Ok(())
    }

    fn set_state(&mut self, state: EngineState) -> Result<(), PlayerError> {
        let bus = {
            let mut shared = self.shared.lock();
            shared.calls.push(format!("set_state {state:?}"));
            if shared.fail_set_state {
                return Err(PlayerError::Engine(format!("{state:?} refused")));
            }
            shared.bus.clone()
        };
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
        let mut shared = self.shared.lock();
        shared.calls.push("set_window".into());
        shared.windows.push(rect);
        Ok(())
    }

    fn release(&mut self) {
        let mut shared = self.shared.lock();
        shared.calls.push("release".into());
        shared.released += 1;
        shared.bus = None;
        shared.producer = None;
    }

    fn name(&self) -> &str {
        "fake"
    }
}
