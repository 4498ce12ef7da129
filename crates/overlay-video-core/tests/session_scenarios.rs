//! End-to-end session behavior against a scripted engine.

mod common;

use common::FakeEngineFactory;
use overlay_video_core::{
    BusEvent, EngineState, PipelineSession, PipelineState, PlayerError, RenderMode,
    SessionConfig, WindowRect,
};

fn composited(factory: &FakeEngineFactory) -> PipelineSession {
    common::init_tracing();
    PipelineSession::create(factory, RenderMode::Composited, &SessionConfig::default()).unwrap()
}

#[test]
fn test_three_frames_come_out_in_push_order() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();
    session.play().unwrap();

    for tag in 1..=3 {
        factory.push_frame(tag).unwrap();
    }
    let frames = session.frames().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames.try_pop().map(|f| f.data()[0]), Some(1));
    assert_eq!(frames.try_pop().map(|f| f.data()[0]), Some(2));
    assert_eq!(frames.try_pop().map(|f| f.data()[0]), Some(3));
    assert!(frames.try_pop().is_none());
}

#[test]
fn test_second_initialize_is_engine_error() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();
    assert!(matches!(
        session.initialize("file:///a.mp4"),
        Err(PlayerError::Engine(_))
    ));
    assert_eq!(session.state(), PipelineState::Ready);

    session.play().unwrap();
    assert!(matches!(
        session.initialize("file:///b.mp4"),
        Err(PlayerError::Engine(_))
    ));
    assert_eq!(session.state(), PipelineState::Playing);
    assert_eq!(session.uri(), Some("file:///a.mp4"));
}

#[test]
fn test_error_event_while_playing() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();
    session.play().unwrap();
    assert!(session.is_playing());

    factory.emit(BusEvent::Error("demux failed".into()));
    assert_eq!(session.state(), PipelineState::Error);
    assert!(!session.is_playing());
    assert_eq!(factory.reactions(), vec![EngineState::Ready]);
    assert_eq!(session.status().last_error.as_deref(), Some("demux failed"));

    // The errored handle cannot be resumed
    assert!(matches!(session.play(), Err(PlayerError::Protocol(_))));
    assert!(matches!(
        session.initialize("file:///a.mp4"),
        Err(PlayerError::Protocol(_))
    ));
}

#[test]
fn test_end_of_stream_stops() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();
    session.play().unwrap();

    factory.emit(BusEvent::EndOfStream);
    assert_eq!(session.state(), PipelineState::Stopped);
    assert!(!session.is_playing());

    // Stop still tears the parked engine down
    session.stop().unwrap();
    assert_eq!(factory.released(), 1);
    assert_eq!(session.state(), PipelineState::Stopped);
}

#[test]
fn test_release_is_idempotent() {
    let factory = FakeEngineFactory::new();
    let mut never_initialized = composited(&factory);
    never_initialized.release();
    never_initialized.release();
    assert_eq!(never_initialized.state(), PipelineState::Uninitialized);
    assert_eq!(factory.released(), 0);

    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();
    session.play().unwrap();
    session.release();
    session.release();
    assert_eq!(session.state(), PipelineState::Uninitialized);
    assert_eq!(factory.released(), 1);
}

#[test]
fn test_release_frees_queued_frames() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();
    factory.push_frame(1);
    factory.push_frame(2);
    let frames = session.frames().unwrap();

    session.release();
    assert!(frames.is_empty());
    assert_eq!(frames.stats().released_on_close, 2);
}

#[test]
fn test_failed_state_change_rolls_back() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();

    factory.fail_set_state(true);
    assert!(matches!(session.play(), Err(PlayerError::Engine(_))));
    assert_eq!(session.state(), PipelineState::Ready);

    factory.fail_set_state(false);
    session.play().unwrap();
    factory.fail_set_state(true);
    assert!(session.pause().is_err());
    assert_eq!(session.state(), PipelineState::Playing);
}

#[test]
fn test_failed_initialize_leaves_session_uninitialized() {
    let factory = FakeEngineFactory::new();
    factory.fail_initialize(true);
    let mut session = composited(&factory);
    assert!(matches!(
        session.initialize("file:///a.mp4"),
        Err(PlayerError::Engine(_))
    ));
    assert_eq!(session.state(), PipelineState::Uninitialized);

    factory.fail_initialize(false);
    session.initialize("file:///a.mp4").unwrap();
    assert_eq!(session.state(), PipelineState::Ready);
}

#[test]
fn test_hole_punch_never_wires_frames() {
    let factory = FakeEngineFactory::new();
    let mut session =
        PipelineSession::create(&factory, RenderMode::HolePunch, &SessionConfig::default())
            .unwrap();
    session.set_window(WindowRect::new(10, 20, 640, 480)).unwrap();
    session.initialize("file:///a.mp4").unwrap();
    session.play().unwrap();

    assert!(session.frames().is_none());
    assert!(!factory.has_producer());
    assert!(factory.push_frame(1).is_none());

    session.set_window(WindowRect::new(0, 0, 800, 600)).unwrap();
    assert_eq!(factory.windows(), vec![WindowRect::new(0, 0, 800, 600)]);
}

#[test]
fn test_composited_ignores_window_updates() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();
    session.set_window(WindowRect::new(0, 0, 320, 240)).unwrap();
    assert!(factory.windows().is_empty());
    assert_eq!(session.window(), Some(WindowRect::new(0, 0, 320, 240)));
}

#[test]
fn test_buffering_does_not_override_user_pause() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("http://example.invalid/live").unwrap();
    session.play().unwrap();
    session.pause().unwrap();

    factory.emit(BusEvent::Buffering(30));
    factory.emit(BusEvent::Buffering(100));
    assert_eq!(factory.reactions(), vec![EngineState::Paused]);
    assert_eq!(session.state(), PipelineState::Paused);
}

#[test]
fn test_stop_then_release() {
    let factory = FakeEngineFactory::new();
    let mut session = composited(&factory);
    session.initialize("file:///a.mp4").unwrap();
    session.play().unwrap();
    session.stop().unwrap();
    assert_eq!(session.state(), PipelineState::Stopped);
    assert!(matches!(session.play(), Err(PlayerError::Protocol(_))));

    session.release();
    assert_eq!(session.state(), PipelineState::Uninitialized);
    assert_eq!(factory.released(), 1);
    assert_eq!(
        factory.calls(),
        vec![
            "initialize file:///a.mp4".to_string(),
            "set_state Playing".to_string(),
            "release".to_string(),
        ]
    );
}
