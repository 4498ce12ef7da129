//! GStreamer playbin engine.
//!
//! Hole-punch sessions hand playbin a `kmssink` that scans out to a hardware
//! plane; the window rectangle is forwarded through `GstVideoOverlay` (or the
//! vendor `plane-x`/`plane-y` properties when the sink has them). Composited
//! sessions get a `videoconvert ! videoscale ! capsfilter ! appsink` bin whose
//! preroll and sample callbacks push straight into the handoff queue.
//!
//! Bus messages are drained on a dedicated thread and folded through the
//! session's [`BusWatch`]; the states it asks for are applied to playbin from
//! that same thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use gstreamer_video::prelude::*;

use crate::bus::{BusEvent, BusWatch};
use crate::config::SessionConfig;
use crate::engine::{EngineFactory, EngineState, MediaEngine};
use crate::error::PlayerError;
use crate::frame::{FrameBuffer, PixelFormat};
use crate::handoff::FrameProducer;
use crate::mode::{FrameCallbackConfig, OverlayPlaneConfig, RenderMode, SinkConfig, WindowRect};

/// Environment variable GStreamer 1.x reads extra plugin paths from.
pub const PLUGIN_PATH_ENV: &str = "GST_PLUGIN_PATH_1_0";

/// How long the bus thread waits for a message before rechecking its stop flag.
const BUS_POLL_INTERVAL_MS: u64 = 100;

/// Appsink queue depth; the handoff queue does the real buffering.
const APPSINK_MAX_BUFFERS: u32 = 2;

/// Initializes GStreamer once, defaulting the plugin path if the environment
/// has none.
fn init_gstreamer(config: &SessionConfig) -> Result<(), PlayerError> {
    if std::env::var_os(PLUGIN_PATH_ENV).is_none() {
        if let Some(path) = &config.plugin_path {
            tracing::debug!("{} unset, using {}", PLUGIN_PATH_ENV, path);
            std::env::set_var(PLUGIN_PATH_ENV, path);
        }
    }
    gst::init().map_err(|e| PlayerError::Engine(format!("GStreamer init failed: {e}")))
}

fn required_elements(mode: RenderMode) -> &'static [&'static str] {
    match mode {
        RenderMode::HolePunch => &["playbin", "kmssink"],
        RenderMode::Composited => &["playbin", "videoconvert", "videoscale", "capsfilter", "appsink"],
    }
}

/// Creates [`GstEngine`] handles.
#[derive(Debug, Clone, Default)]
pub struct GstEngineFactory {
    config: SessionConfig,
}

impl GstEngineFactory {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for GstEngineFactory {
    fn probe(&self, mode: RenderMode) -> Result<(), PlayerError> {
        init_gstreamer(&self.config).map_err(|e| PlayerError::Fatal(e.to_string()))?;
        let missing: Vec<&str> = required_elements(mode)
            .iter()
            .copied()
            .filter(|name| gst::ElementFactory::find(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(PlayerError::Fatal(format!(
                "missing GStreamer elements for {:?}: {}",
                mode,
                missing.join(", ")
            )));
        }
        tracing::info!("GStreamer {} ready for {:?}", gst::version_string(), mode);
        Ok(())
    }

    fn create(
        &self,
        mode: RenderMode,
        config: &SessionConfig,
    ) -> Result<Box<dyn MediaEngine>, PlayerError> {
        init_gstreamer(config)?;
        Ok(Box::new(GstEngine::new(mode)))
    }
}

/// A playbin pipeline owned by one session.
pub struct GstEngine {
    mode: RenderMode,
    playbin: Option<gst::Element>,
    /// kmssink in hole-punch mode, the appsink bin otherwise
    video_sink: Option<gst::Element>,
    bus_stop: Arc<AtomicBool>,
    bus_thread: Option<JoinHandle<()>>,
}

impl GstEngine {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            playbin: None,
            video_sink: None,
            bus_stop: Arc::new(AtomicBool::new(false)),
            bus_thread: None,
        }
    }

    fn build_overlay_sink(plane: &OverlayPlaneConfig) -> Result<gst::Element, PlayerError> {
        let sink = gst::ElementFactory::make("kmssink")
            .name("vsink")
            .property("sync", plane.sync)
            .property("qos", plane.qos)
            .property("enable-last-sample", plane.enable_last_sample)
            .property("max-lateness", plane.max_lateness.as_nanos() as i64)
            .build()
            .map_err(|e| PlayerError::Engine(format!("Failed to create kmssink: {e}")))?;
        // Vendor kmssink builds scan out to a dedicated plane when asked
        set_vendor_property(&sink, "in-plane", 1);
        Ok(sink)
    }

    fn build_frame_sink(cb: &FrameCallbackConfig) -> Result<gst::Element, PlayerError> {
        let bin = gst::Bin::builder().name("frame-sink").build();

        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| PlayerError::Engine(format!("Failed to create videoconvert: {e}")))?;
        let scale = gst::ElementFactory::make("videoscale")
            .build()
            .map_err(|e| PlayerError::Engine(format!("Failed to create videoscale: {e}")))?;

        let mut caps = gst_video::VideoCapsBuilder::new().format(to_video_format(cb.format));
        if let Some((width, height)) = cb.size {
            caps = caps.width(width as i32).height(height as i32);
        }
        let appsink = gst_app::AppSink::builder()
            .caps(&caps.build())
            .max_buffers(APPSINK_MAX_BUFFERS)
            .drop(true)
            .build();

        let preroll_producer = cb.producer.clone();
        let sample_producer = cb.producer.clone();
        let format = cb.format;
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_preroll(move |sink| {
                    let sample = sink.pull_preroll().map_err(|_| gst::FlowError::Flushing)?;
                    push_sample(&preroll_producer, &sample, format)
                })
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    push_sample(&sample_producer, &sample, format)
                })
                .build(),
        );

        bin.add_many([&convert, &scale, appsink.upcast_ref()])
            .map_err(|e| PlayerError::Engine(format!("Failed to add sink elements: {e}")))?;
        gst::Element::link_many([&convert, &scale, appsink.upcast_ref()])
            .map_err(|e| PlayerError::Engine(format!("Failed to link sink elements: {e}")))?;

        let Some(pad) = convert.static_pad("sink") else {
            return Err(PlayerError::Engine("videoconvert has no sink pad".into()));
        };
        let ghost = gst::GhostPad::with_target(&pad)
            .map_err(|e| PlayerError::Engine(format!("Failed to create ghost pad: {e}")))?;
        ghost
            .set_active(true)
            .map_err(|e| PlayerError::Engine(format!("Failed to activate ghost pad: {e}")))?;
        bin.add_pad(&ghost)
            .map_err(|e| PlayerError::Engine(format!("Failed to add ghost pad: {e}")))?;

        Ok(bin.upcast())
    }

    fn spawn_bus_thread(&mut self, playbin: &gst::Element, watch: BusWatch) -> Result<(), PlayerError> {
        let Some(bus) = playbin.bus() else {
            return Err(PlayerError::Engine("playbin has no bus".into()));
        };
        self.bus_stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.bus_stop);
        let playbin_weak = playbin.downgrade();

        let handle = thread::Builder::new()
            .name("gst-bus".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let Some(msg) = bus.timed_pop(gst::ClockTime::from_mseconds(BUS_POLL_INTERVAL_MS))
                    else {
                        continue;
                    };
                    let Some(playbin) = playbin_weak.upgrade() else {
                        break;
                    };
                    let Some(event) = to_bus_event(&msg, &playbin) else {
                        continue;
                    };
                    let reaction = watch.handle(&event);
                    for state in reaction.states() {
                        if let Err(e) = playbin.set_state(to_gst_state(*state)) {
                            tracing::warn!("bus reaction {:?} failed: {:?}", state, e);
                        }
                    }
                }
                tracing::debug!("gst bus thread exiting");
            })
            .map_err(|e| PlayerError::Engine(format!("Failed to spawn bus thread: {e}")))?;
        self.bus_thread = Some(handle);
        Ok(())
    }
}

impl MediaEngine for GstEngine {
    fn initialize(
        &mut self,
        uri: &str,
        sink: SinkConfig,
        bus: BusWatch,
    ) -> Result<(), PlayerError> {
        if self.playbin.is_some() {
            return Err(PlayerError::Engine("pipeline already initialized".into()));
        }
        if sink.mode() != self.mode {
            return Err(PlayerError::Engine(format!(
                "sink for {:?} given to a {:?} engine",
                sink.mode(),
                self.mode
            )));
        }

        let playbin = gst::ElementFactory::make("playbin")
            .name("player")
            .property("uri", uri)
            .build()
            .map_err(|e| PlayerError::Engine(format!("Failed to create playbin: {e}")))?;
        playbin.set_property_from_str("flags", "native-video+native-audio");

        let (video_sink, window) = match &sink {
            SinkConfig::OverlayPlane(plane) => (Self::build_overlay_sink(plane)?, plane.window),
            SinkConfig::FrameCallback(cb) => (Self::build_frame_sink(cb)?, None),
        };
        playbin.set_property("video-sink", &video_sink);

        self.spawn_bus_thread(&playbin, bus)?;
        self.playbin = Some(playbin.clone());
        self.video_sink = Some(video_sink);

        if let Err(e) = playbin.set_state(gst::State::Ready) {
            self.release();
            return Err(PlayerError::Engine(format!("Failed to reach Ready: {e:?}")));
        }
        if let Some(rect) = window {
            self.set_window(rect)?;
        }
        tracing::info!("playbin ready for {} ({:?})", uri, self.mode);
        Ok(())
    }

    fn set_state(&mut self, state: EngineState) -> Result<(), PlayerError> {
        let Some(playbin) = &self.playbin else {
            return Err(PlayerError::Engine("pipeline not initialized".into()));
        };
        playbin
            .set_state(to_gst_state(state))
            .map(|_| ())
            .map_err(|e| PlayerError::Engine(format!("Failed to set {state:?}: {e:?}")))
    }

    fn set_window(&mut self, rect: WindowRect) -> Result<(), PlayerError> {
        let Some(sink) = &self.video_sink else {
            return Ok(());
        };
        if let Some(overlay) = sink.dynamic_cast_ref::<gst_video::VideoOverlay>() {
            overlay
                .set_render_rectangle(rect.x, rect.y, rect.width as i32, rect.height as i32)
                .map_err(|e| PlayerError::Engine(format!("Failed to set render rectangle: {e}")))?;
        } else if set_vendor_property(sink, "plane-x", rect.x) {
            set_vendor_property(sink, "plane-y", rect.y);
        } else {
            tracing::debug!("video sink cannot place its plane; window {:?} ignored", rect);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.bus_stop.store(true, Ordering::Release);
        if let Some(handle) = self.bus_thread.take() {
            let _ = handle.join();
        }
        if let Some(playbin) = self.playbin.take() {
            let _ = playbin.set_state(gst::State::Null);
            tracing::debug!("playbin released");
        }
        self.video_sink = None;
    }

    fn name(&self) -> &str {
        "gstreamer"
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        self.release();
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    assert_send::<gst::Element>();
    assert_send::<BusWatch>();
    assert_send::<FrameProducer>();
};

/// Sets an optional vendor property whose type varies between sink builds.
/// Returns false when the property is absent or has an unexpected type.
fn set_vendor_property(element: &gst::Element, name: &str, value: i32) -> bool {
    let Some(pspec) = element.find_property(name) else {
        return false;
    };
    let ty = pspec.value_type();
    if ty == bool::static_type() {
        element.set_property(name, value != 0);
    } else if ty == i32::static_type() {
        element.set_property(name, value);
    } else if ty == u32::static_type() {
        element.set_property(name, value.max(0) as u32);
    } else {
        tracing::debug!("{} has unsupported type {}", name, ty);
        return false;
    }
    true
}

fn push_sample(
    producer: &FrameProducer,
    sample: &gst::Sample,
    format: PixelFormat,
) -> Result<gst::FlowSuccess, gst::FlowError> {
    if producer.is_closed() {
        return Err(gst::FlowError::Flushing);
    }
    match sample_to_frame(sample, format) {
        Some(frame) => {
            producer.push(frame);
        }
        None => tracing::warn!("dropping unmappable sample"),
    }
    Ok(gst::FlowSuccess::Ok)
}

fn sample_to_frame(sample: &gst::Sample, format: PixelFormat) -> Option<FrameBuffer> {
    let caps = sample.caps()?;
    let info = gst_video::VideoInfo::from_caps(caps).ok()?;
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;
    let stride = *info.stride().first()? as usize;
    let len = (stride * info.height() as usize).min(map.size());
    Some(FrameBuffer::with_stride(
        map.as_slice()[..len].to_vec(),
        info.width(),
        info.height(),
        format,
        stride,
    ))
}

fn to_video_format(format: PixelFormat) -> gst_video::VideoFormat {
    match format {
        PixelFormat::Rgba => gst_video::VideoFormat::Rgba,
        PixelFormat::Bgra => gst_video::VideoFormat::Bgra,
        PixelFormat::Rgb24 => gst_video::VideoFormat::Rgb,
    }
}

fn to_gst_state(state: EngineState) -> gst::State {
    match state {
        EngineState::Null => gst::State::Null,
        EngineState::Ready => gst::State::Ready,
        EngineState::Paused => gst::State::Paused,
        EngineState::Playing => gst::State::Playing,
    }
}

fn from_gst_state(state: gst::State) -> EngineState {
    match state {
        gst::State::Ready => EngineState::Ready,
        gst::State::Paused => EngineState::Paused,
        gst::State::Playing => EngineState::Playing,
        _ => EngineState::Null,
    }
}

fn to_bus_event(msg: &gst::Message, playbin: &gst::Element) -> Option<BusEvent> {
    match msg.view() {
        gst::MessageView::Error(err) => Some(BusEvent::Error(format!(
            "{} ({:?})",
            err.error(),
            err.debug()
        ))),
        gst::MessageView::Eos(_) => Some(BusEvent::EndOfStream),
        gst::MessageView::Buffering(buffering) => Some(BusEvent::Buffering(buffering.percent())),
        gst::MessageView::ClockLost(_) => Some(BusEvent::ClockLost),
        gst::MessageView::StateChanged(changed) => Some(BusEvent::StateChanged {
            from_pipeline: changed
                .src()
                .map(|s| s == playbin.upcast_ref::<gst::Object>())
                .unwrap_or(false),
            old: from_gst_state(changed.old()),
            new: from_gst_state(changed.current()),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping_round_trips() {
        for state in [
            EngineState::Null,
            EngineState::Ready,
            EngineState::Paused,
            EngineState::Playing,
        ] {
            assert_eq!(from_gst_state(to_gst_state(state)), state);
        }
        assert_eq!(from_gst_state(gst::State::VoidPending), EngineState::Null);
    }

    #[test]
    fn test_required_elements_per_mode() {
        assert!(required_elements(RenderMode::HolePunch).contains(&"kmssink"));
        assert!(!required_elements(RenderMode::Composited).contains(&"kmssink"));
        assert!(required_elements(RenderMode::Composited).contains(&"appsink"));
    }

    #[test]
    fn test_video_format_mapping() {
        assert_eq!(to_video_format(PixelFormat::Rgb24), gst_video::VideoFormat::Rgb);
        assert_eq!(to_video_format(PixelFormat::Rgba), gst_video::VideoFormat::Rgba);
    }
}
