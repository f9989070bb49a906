//! Background capture thread

use frame_buffer::FrameBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::backend::{CaptureApi, CaptureBackend, CaptureDevice};
use crate::pipeline::CaptureDescriptor;
use crate::stats::FrameCounters;
use crate::{CameraError, VideoFrame};

/// Open `descriptor` and grab the first frame synchronously
///
/// A device that opens but cannot deliver a frame before `start_timeout`
/// is released before the error is returned.
pub(crate) fn open_device<B: CaptureBackend>(
    backend: &B,
    descriptor: &CaptureDescriptor,
    api: CaptureApi,
    start_timeout: Duration,
) -> Result<(B::Device, VideoFrame), CameraError> {
    let failed = |reason: String| CameraError::FailedToStart {
        descriptor: descriptor.to_string(),
        api,
        reason,
    };

    let mut device = backend
        .open(descriptor.as_str(), api)
        .map_err(|e| failed(format!("Stream not open: {e}")))?;

    let deadline = Instant::now() + start_timeout;
    loop {
        match device.read_frame() {
            Ok(Some(frame)) => {
                debug!("First frame grabbed ({}x{})", frame.width, frame.height);
                return Ok((device, frame));
            }
            Ok(None) if Instant::now() < deadline => continue,
            Ok(None) => {
                device.release();
                return Err(failed(format!(
                    "Failed to grab frame: no frame within {start_timeout:?}"
                )));
            }
            Err(e) => {
                device.release();
                return Err(failed(format!("Failed to grab frame: {e}")));
            }
        }
    }
}

/// Owns the device while the stream runs
pub(crate) struct CaptureThread<D: CaptureDevice + 'static> {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<D>>,
}

impl<D: CaptureDevice + 'static> CaptureThread<D> {
    /// Move `device` onto a new thread that feeds `buffer`
    pub(crate) fn spawn(
        device: D,
        buffer: Arc<FrameBuffer<VideoFrame>>,
        counters: Arc<FrameCounters>,
    ) -> Result<Self, CameraError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || capture_loop(device, &buffer, &counters, &stop_flag))
            .map_err(|e| CameraError::Spawn(e.to_string()))?;

        info!("Capture thread started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Whether the loop has exited (stop or read failure)
    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Request stop, join, then release the device
    ///
    /// The loop notices the flag within one backend read timeout. The
    /// device is released only after the join, so no read can race it.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        match handle.join() {
            Ok(mut device) => {
                device.release();
                info!("Capture thread stopped, device released");
            }
            Err(_) => warn!("Capture thread panicked, device dropped without release"),
        }
    }
}

impl<D: CaptureDevice + 'static> Drop for CaptureThread<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Closes the buffer if the loop unwinds, so a blocked reader wakes up
struct CloseOnPanic<'a>(&'a FrameBuffer<VideoFrame>);

impl Drop for CloseOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
        }
    }
}

fn capture_loop<D: CaptureDevice>(
    mut device: D,
    buffer: &FrameBuffer<VideoFrame>,
    counters: &FrameCounters,
    stop: &AtomicBool,
) -> D {
    let _guard = CloseOnPanic(buffer);
    let mut frames: u64 = 0;

    while !stop.load(Ordering::Acquire) {
        match device.read_frame() {
            Ok(Some(frame)) => {
                frames += 1;
                counters.record_read();
                buffer.push(frame);
            }
            Ok(None) => continue,
            Err(e) => {
                error!("Camera read failed after {} frames: {}", frames, e);
                buffer.close();
                break;
            }
        }
    }

    debug!(
        "Capture loop exiting ({} frames, {} dropped by buffer)",
        frames,
        buffer.total_dropped()
    );
    device
}
