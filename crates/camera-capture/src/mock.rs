//! In-process mock backend
//!
//! Two flavours: a synthetic source that paces blank frames at a fixed rate
//! (optionally failing after N frames), and a scripted source where the
//! test decides, frame by frame, what the device returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::backend::{CaptureApi, CaptureBackend, CaptureDevice, FPS_UNAVAILABLE};
use crate::frame::{PixelFormat, VideoFrame};
use crate::CameraError;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Scripted device behaviour for one read
#[derive(Debug, Clone)]
pub enum MockEvent {
    /// Deliver this frame
    Frame(VideoFrame),
    /// Fail the read as a lost connection would
    Fail,
}

/// Handle that feeds a scripted mock device
#[derive(Debug, Clone)]
pub struct MockScript {
    tx: Sender<MockEvent>,
}

impl MockScript {
    /// Queue a frame; returns false once the device is gone
    pub fn frame(&self, frame: VideoFrame) -> bool {
        self.tx.send(MockEvent::Frame(frame)).is_ok()
    }

    /// Queue a read failure
    pub fn fail(&self) -> bool {
        self.tx.send(MockEvent::Fail).is_ok()
    }
}

#[derive(Debug, Clone)]
enum Source {
    Synthetic {
        width: u32,
        height: u32,
        fps: f64,
        fail_after: Option<u64>,
    },
    Scripted(Arc<Mutex<Option<Receiver<MockEvent>>>>),
}

/// Mock capture backend for tests and hardware-free runs
#[derive(Debug, Clone)]
pub struct MockBackend {
    source: Source,
    open_error: Option<String>,
    reported_fps: Option<f64>,
    read_timeout: Duration,
    opens: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Blank BGR frames of the given size, paced at `fps`
    pub fn synthetic(width: u32, height: u32, fps: f64) -> Self {
        Self::with_source(Source::Synthetic {
            width,
            height,
            fps: if fps > 0.0 { fps } else { 30.0 },
            fail_after: None,
        })
    }

    /// A device driven by the returned script handle
    ///
    /// Only the first `open` gets the script; later opens fail.
    pub fn scripted() -> (MockScript, Self) {
        let (tx, rx) = mpsc::channel();
        let backend = Self::with_source(Source::Scripted(Arc::new(Mutex::new(Some(rx)))));
        (MockScript { tx }, backend)
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            open_error: None,
            reported_fps: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            opens: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Synthetic source fails its read after delivering `frames` frames
    pub fn fail_after(mut self, frames: u64) -> Self {
        if let Source::Synthetic { fail_after, .. } = &mut self.source {
            *fail_after = Some(frames);
        }
        self
    }

    /// Every open attempt fails with `reason`
    pub fn failing_open(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    /// Override the rate the device reports (use [`FPS_UNAVAILABLE`] for the sentinel)
    pub fn with_reported_fps(mut self, fps: f64) -> Self {
        self.reported_fps = Some(fps);
        self
    }

    /// How long a scripted read waits before reporting a timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of device releases
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for MockBackend {
    type Device = MockDevice;

    fn open(&self, descriptor: &str, api: CaptureApi) -> Result<MockDevice, CameraError> {
        if let Some(reason) = &self.open_error {
            return Err(CameraError::Open(reason.clone()));
        }

        let (feed, default_fps) = match &self.source {
            Source::Synthetic {
                width,
                height,
                fps,
                fail_after,
            } => (
                Feed::Synthetic {
                    width: *width,
                    height: *height,
                    interval: Duration::from_secs_f64(1.0 / fps),
                    fail_after: *fail_after,
                    next_at: Instant::now(),
                },
                *fps,
            ),
            Source::Scripted(slot) => {
                let rx = slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .ok_or_else(|| CameraError::Open("mock script already consumed".into()))?;
                (Feed::Scripted(rx), FPS_UNAVAILABLE)
            }
        };

        self.opens.fetch_add(1, Ordering::SeqCst);
        info!("Opened mock device for {:?} ({})", descriptor, api);

        Ok(MockDevice {
            feed,
            reported_fps: self.reported_fps.unwrap_or(default_fps),
            read_timeout: self.read_timeout,
            opened_at: Instant::now(),
            sequence: 0,
            released: false,
            releases: self.releases.clone(),
        })
    }
}

enum Feed {
    Synthetic {
        width: u32,
        height: u32,
        interval: Duration,
        fail_after: Option<u64>,
        next_at: Instant,
    },
    Scripted(Receiver<MockEvent>),
}

/// Device handed out by [`MockBackend`]
pub struct MockDevice {
    feed: Feed,
    reported_fps: f64,
    read_timeout: Duration,
    opened_at: Instant,
    sequence: u64,
    released: bool,
    releases: Arc<AtomicUsize>,
}

impl CaptureDevice for MockDevice {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.released {
            return Err(CameraError::Stream("read on released mock device".into()));
        }

        match &mut self.feed {
            Feed::Synthetic {
                width,
                height,
                interval,
                fail_after,
                next_at,
            } => {
                if fail_after.is_some_and(|limit| self.sequence >= limit) {
                    return Err(CameraError::Stream("mock device exhausted".into()));
                }

                let wait = next_at.saturating_duration_since(Instant::now());
                if wait > self.read_timeout {
                    std::thread::sleep(self.read_timeout);
                    return Ok(None);
                }
                std::thread::sleep(wait);
                *next_at += *interval;

                let mut frame = VideoFrame::blank(*width, *height, PixelFormat::Bgr24, self.sequence);
                frame.timestamp_ns = self.opened_at.elapsed().as_nanos() as u64;
                self.sequence += 1;
                Ok(Some(frame))
            }
            Feed::Scripted(rx) => match rx.recv_timeout(self.read_timeout) {
                Ok(MockEvent::Frame(frame)) => {
                    self.sequence += 1;
                    Ok(Some(frame))
                }
                Ok(MockEvent::Fail) => Err(CameraError::Stream("scripted read failure".into())),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    Err(CameraError::Stream("mock script dropped".into()))
                }
            },
        }
    }

    fn reported_fps(&self) -> f64 {
        self.reported_fps
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.releases.fetch_add(1, Ordering::SeqCst);
        debug!("Released mock device after {} frames", self.sequence);
    }
}
