//! Video stream façade
//!
//! Ties the pieces together: descriptor → device → capture thread → frame
//! buffer → consumer, with optional per-second statistics on the side.
//!
//! ```rust,ignore
//! use camera_capture::{CameraProfile, VideoStream};
//!
//! let mut stream = VideoStream::new(&CameraProfile::default(), backend);
//! stream.start()?;
//! loop {
//!     let frame = stream.read()?;
//!     // render frame ...
//!     stream.mark_displayed();
//! }
//! ```

use frame_buffer::{FrameBuffer, RecvError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::backend::{CaptureApi, CaptureBackend, CaptureDevice};
use crate::capture::{open_device, CaptureThread};
use crate::pipeline::{CaptureDescriptor, PipelineBuilder};
use crate::profile::CameraProfile;
use crate::stats::{FpsSnapshot, FrameCounters, StatsCollector, StatsError, DEFAULT_INTERVAL};
use crate::{CameraError, VideoFrame};

/// Lifecycle of a [`VideoStream`]
///
/// `Stopped` and `Failed` are terminal; retrying needs a new stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Running,
    Stopped,
    Failed,
}

/// Stream tuning knobs
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// How long `start` waits for the first frame
    pub start_timeout: Duration,
    /// FPS statistics interval
    pub stats_interval: Duration,
    /// Frames retained between capture and consumer
    pub buffer_depth: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(5),
            stats_interval: DEFAULT_INTERVAL,
            buffer_depth: frame_buffer::DEFAULT_DEPTH,
        }
    }
}

/// Continuously captured camera stream
///
/// [`read`](Self::read) hands out the older of the (at most two) retained
/// frames, so a delivered frame is at most one capture cycle stale under a
/// steady cadence.
pub struct VideoStream<B: CaptureBackend> {
    backend: B,
    descriptor: CaptureDescriptor,
    api: CaptureApi,
    options: StreamOptions,
    lifecycle: StreamState,
    buffer: Arc<FrameBuffer<VideoFrame>>,
    counters: Arc<FrameCounters>,
    stats: StatsCollector,
    capture: Option<CaptureThread<B::Device>>,
    reported_fps: Option<f64>,
}

impl<B: CaptureBackend> VideoStream<B> {
    /// CSI camera stream for `profile` through GStreamer
    pub fn new(profile: &CameraProfile, backend: B) -> Self {
        let descriptor = PipelineBuilder::new(profile).build();
        Self::from_descriptor(descriptor, CaptureApi::GStreamer, backend)
    }

    /// Stream over an arbitrary backend descriptor
    pub fn from_descriptor(
        descriptor: impl Into<CaptureDescriptor>,
        api: CaptureApi,
        backend: B,
    ) -> Self {
        let options = StreamOptions::default();
        let counters = Arc::new(FrameCounters::new());
        Self {
            backend,
            descriptor: descriptor.into(),
            api,
            buffer: Arc::new(FrameBuffer::new(options.buffer_depth)),
            stats: StatsCollector::with_interval(counters.clone(), options.stats_interval),
            counters,
            options,
            lifecycle: StreamState::Created,
            capture: None,
            reported_fps: None,
        }
    }

    /// Replace the default options
    ///
    /// Only allowed before `start` and while the statistics ticker is idle:
    /// the capture thread and the ticker hold the buffer and counters they
    /// were started with.
    pub fn configure(&mut self, options: StreamOptions) -> Result<&mut Self, CameraError> {
        if self.lifecycle != StreamState::Created {
            return Err(CameraError::InvalidState(self.lifecycle));
        }
        if self.stats.is_running() {
            return Err(StatsError::AlreadyRunning.into());
        }

        self.buffer = Arc::new(FrameBuffer::new(options.buffer_depth));
        self.stats = StatsCollector::with_interval(self.counters.clone(), options.stats_interval);
        self.options = options;
        Ok(self)
    }

    /// Open the device, grab the first frame and start the capture thread
    pub fn start(&mut self) -> Result<&mut Self, CameraError> {
        if self.lifecycle != StreamState::Created {
            return Err(CameraError::InvalidState(self.lifecycle));
        }

        info!("Starting camera stream ({}): {}", self.api, self.descriptor);
        let (device, first_frame) = match open_device(
            &self.backend,
            &self.descriptor,
            self.api,
            self.options.start_timeout,
        ) {
            Ok(opened) => opened,
            Err(e) => {
                error!("Camera failed to start: {}", e);
                self.lifecycle = StreamState::Failed;
                return Err(e);
            }
        };

        self.reported_fps = Some(device.reported_fps());
        self.counters.record_read();
        self.buffer.push(first_frame);

        match CaptureThread::spawn(device, self.buffer.clone(), self.counters.clone()) {
            Ok(capture) => self.capture = Some(capture),
            Err(e) => {
                error!("Camera failed to start: {}", e);
                self.lifecycle = StreamState::Failed;
                return Err(e);
            }
        }

        self.lifecycle = StreamState::Running;
        Ok(self)
    }

    /// Current lifecycle state
    ///
    /// Reports `Failed` as soon as the capture loop has hit a read error.
    pub fn state(&self) -> StreamState {
        match self.lifecycle {
            StreamState::Running if self.buffer.is_closed() => StreamState::Failed,
            state => state,
        }
    }

    /// Block until a frame is available
    ///
    /// A lost connection is reported even if frames are still buffered.
    pub fn read(&self) -> Result<VideoFrame, CameraError> {
        match self.lifecycle {
            StreamState::Created => Err(CameraError::NotStarted),
            StreamState::Running => self.buffer.recv().map_err(|e| match e {
                RecvError::Closed => CameraError::ConnectionLost,
                RecvError::Timeout => CameraError::Stream("frame wait timed out".into()),
            }),
            StreamState::Failed if self.buffer.is_closed() => Err(CameraError::ConnectionLost),
            state => Err(CameraError::InvalidState(state)),
        }
    }

    /// Like [`read`](Self::read) but returns `Ok(None)` after `timeout`
    pub fn read_timeout(&self, timeout: Duration) -> Result<Option<VideoFrame>, CameraError> {
        if self.lifecycle != StreamState::Running {
            return self.read().map(Some);
        }
        match self.buffer.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvError::Timeout) => Ok(None),
            Err(RecvError::Closed) => Err(CameraError::ConnectionLost),
        }
    }

    /// Capture rate reported by the backend at start
    ///
    /// Only answered while running; a stopped stream has released its device.
    pub fn fps(&self) -> Result<f64, CameraError> {
        let fps = match self.lifecycle {
            StreamState::Created => return Err(CameraError::NotStarted),
            StreamState::Running => self.reported_fps.ok_or(CameraError::NotStarted)?,
            state => return Err(CameraError::InvalidState(state)),
        };
        if !fps.is_finite() || fps <= 0.0 {
            return Err(CameraError::FpsUnavailable);
        }
        Ok(fps)
    }

    /// Consumer hook: one frame has been displayed
    pub fn mark_displayed(&self) {
        self.counters.record_displayed();
    }

    /// Live and last-interval counters
    pub fn counters(&self) -> &Arc<FrameCounters> {
        &self.counters
    }

    /// Frames read and displayed during the last completed interval
    pub fn last_stats(&self) -> FpsSnapshot {
        self.counters.last()
    }

    /// Frames evicted from the buffer before the consumer got to them
    pub fn frames_dropped(&self) -> u64 {
        self.buffer.total_dropped()
    }

    /// Begin the per-interval statistics ticker
    pub fn start_counting_fps(&mut self) -> Result<(), CameraError> {
        Ok(self.stats.start()?)
    }

    /// Stop the statistics ticker, waiting for any in-flight tick
    pub fn release_fps_stats(&mut self) -> Result<(), CameraError> {
        Ok(self.stats.stop()?)
    }

    pub fn descriptor(&self) -> &CaptureDescriptor {
        &self.descriptor
    }

    pub fn api(&self) -> CaptureApi {
        self.api
    }

    /// Stop capture and release the device
    ///
    /// Safe to call in any state; only the first call after a successful
    /// start does any work.
    pub fn stop(&mut self) {
        if let Some(capture) = self.capture.take() {
            info!("Stopping camera stream");
            capture.stop();
        }
        if self.stats.is_running() {
            let _ = self.stats.stop();
        }

        self.lifecycle = match self.lifecycle {
            StreamState::Running if self.buffer.is_closed() => StreamState::Failed,
            StreamState::Running => StreamState::Stopped,
            state => {
                debug!("stop() in {:?} state, nothing to do", state);
                state
            }
        };
    }

    /// Start, run `f`, and stop on every exit path
    ///
    /// If `f` panics the stream is stopped while unwinding.
    pub fn scoped<R>(mut self, f: impl FnOnce(&mut Self) -> R) -> Result<R, CameraError> {
        self.start()?;
        let result = f(&mut self);
        self.stop();
        Ok(result)
    }
}

impl<B: CaptureBackend> Drop for VideoStream<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
