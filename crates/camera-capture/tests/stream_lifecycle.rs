//! End-to-end lifecycle scenarios against the mock backend

use camera_capture::{
    CameraError, CameraProfile, CaptureApi, MockBackend, PixelFormat, StatsError, StreamOptions,
    StreamState, VideoFrame, VideoStream,
};
use std::thread;
use std::time::{Duration, Instant};

fn frame(sequence: u64) -> VideoFrame {
    VideoFrame::blank(2, 2, PixelFormat::Bgr24, sequence)
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn five_frames_then_failure() {
    let (script, backend) = MockBackend::scripted();
    let backend = backend.with_read_timeout(Duration::from_millis(10));
    let mut stream = VideoStream::new(&CameraProfile::default(), backend.clone());

    // F1 satisfies the synchronous first read in start()
    script.frame(frame(1));
    stream.start().unwrap();

    // Keep the producer exactly one frame ahead of the consumer
    for sequence in 1..=4 {
        script.frame(frame(sequence + 1));
        assert_eq!(stream.read().unwrap().sequence, sequence);
    }

    // F5 is captured but the failure lands before the fifth read
    script.fail();
    assert!(wait_for(|| stream.state() == StreamState::Failed));
    assert!(matches!(stream.read(), Err(CameraError::ConnectionLost)));
    assert!(matches!(stream.read(), Err(CameraError::ConnectionLost)));

    stream.stop();
    stream.stop();
    assert_eq!(backend.release_count(), 1);
    assert_eq!(stream.state(), StreamState::Failed);
    assert!(matches!(stream.read(), Err(CameraError::ConnectionLost)));
}

#[test]
fn failure_wakes_blocked_reader() {
    let (script, backend) = MockBackend::scripted();
    let backend = backend.with_read_timeout(Duration::from_millis(10));
    let mut stream = VideoStream::new(&CameraProfile::default(), backend);

    script.frame(frame(1));
    stream.start().unwrap();
    assert_eq!(stream.read().unwrap().sequence, 1);

    let failer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        script.fail();
    });

    // Buffer is empty; read must not block forever
    assert!(matches!(stream.read(), Err(CameraError::ConnectionLost)));
    failer.join().unwrap();
}

#[test]
fn failed_open_leaves_nothing_running() {
    let backend = MockBackend::synthetic(2, 2, 30.0).failing_open("not opened");
    let mut stream = VideoStream::new(&CameraProfile::default(), backend.clone());

    let err = stream.start().err().unwrap();
    assert!(matches!(err, CameraError::FailedToStart { api: CaptureApi::GStreamer, .. }));
    assert!(err.to_string().contains("Stream not open"));
    assert_eq!(stream.state(), StreamState::Failed);

    // No ticker was left behind by the failed start
    assert!(matches!(
        stream.release_fps_stats(),
        Err(CameraError::Stats(StatsError::NotRunning))
    ));

    // Nothing to join, so stop comes back at once
    let stopping = Instant::now();
    stream.stop();
    assert!(stopping.elapsed() < Duration::from_millis(100));

    assert_eq!(backend.open_count(), 0);
    assert_eq!(backend.release_count(), 0);
    assert_eq!(stream.state(), StreamState::Failed);
    assert!(matches!(stream.read(), Err(CameraError::InvalidState(StreamState::Failed))));
    assert!(matches!(stream.fps(), Err(CameraError::InvalidState(StreamState::Failed))));
}

#[test]
fn failed_first_frame_releases_once() {
    let backend = MockBackend::synthetic(2, 2, 30.0).fail_after(0);
    let mut stream = VideoStream::new(&CameraProfile::default(), backend.clone());

    let err = stream.start().err().unwrap();
    assert!(err.to_string().contains("Failed to grab frame"));
    assert!(matches!(
        stream.release_fps_stats(),
        Err(CameraError::Stats(StatsError::NotRunning))
    ));

    let stopping = Instant::now();
    stream.stop();
    assert!(stopping.elapsed() < Duration::from_millis(100));
    drop(stream);
    assert_eq!(backend.open_count(), 1);
    assert_eq!(backend.release_count(), 1);
}

#[test]
fn stats_track_read_and_displayed() {
    let backend = MockBackend::synthetic(2, 2, 200.0);
    let mut stream = VideoStream::new(&CameraProfile::default(), backend);
    stream
        .configure(StreamOptions {
            stats_interval: Duration::from_millis(100),
            ..Default::default()
        })
        .unwrap();

    stream.start().unwrap();
    stream.start_counting_fps().unwrap();

    let started = Instant::now();
    while started.elapsed() < Duration::from_millis(350) {
        stream.read().unwrap();
        stream.mark_displayed();
    }

    let last = stream.last_stats();
    assert!(last.frames_read > 0, "no frames counted: {last:?}");
    assert!(last.frames_displayed > 0, "no displays counted: {last:?}");
    assert!(last.frames_displayed <= last.frames_read + 2);

    stream.release_fps_stats().unwrap();
    stream.stop();
}

#[test]
fn slow_consumer_sees_bounded_staleness() {
    let backend = MockBackend::synthetic(2, 2, 500.0);
    let mut stream = VideoStream::new(&CameraProfile::default(), backend);
    stream.start().unwrap();

    thread::sleep(Duration::from_millis(100));
    let a = stream.read().unwrap();
    let b = stream.read().unwrap();

    assert!(stream.frames_dropped() > 0);
    assert!(b.sequence > a.sequence);
    stream.stop();
}
