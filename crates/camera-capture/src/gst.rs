//! GStreamer appsink backend
//!
//! Opens a launch string that ends in an `appsink` and pulls BGR samples
//! from it. This is the path used on Jetson boards with the
//! `nvarguscamerasrc` pipelines from [`crate::pipeline`].

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::{VideoFormat, VideoInfo};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{CaptureApi, CaptureBackend, CaptureDevice, FPS_UNAVAILABLE};
use crate::frame::{PixelFormat, VideoFrame};
use crate::CameraError;

/// Default time a single pull waits for a sample
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// GStreamer capture backend
#[derive(Debug, Clone)]
pub struct GstBackend {
    read_timeout: Duration,
}

impl GstBackend {
    /// Initialize GStreamer
    pub fn new() -> Result<Self, CameraError> {
        gst::init().map_err(|e| CameraError::Open(format!("GStreamer init failed: {e}")))?;
        Ok(Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Upper bound on how long a stop request waits for the capture loop
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl CaptureBackend for GstBackend {
    type Device = GstDevice;

    fn open(&self, descriptor: &str, api: CaptureApi) -> Result<GstDevice, CameraError> {
        debug!("Launching {} pipeline: {}", api, descriptor);

        let pipeline = gst::parse::launch(descriptor)
            .map_err(|e| CameraError::Open(format!("Failed to create pipeline: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::Open("Descriptor did not produce a pipeline".into()))?;

        let sink = find_appsink(&pipeline)
            .ok_or_else(|| CameraError::Open("Pipeline has no appsink".into()))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CameraError::Open(format!("Failed to start pipeline: {e:?}")));
        }

        info!("GStreamer pipeline playing");
        Ok(GstDevice {
            pipeline,
            sink,
            read_timeout: self.read_timeout,
            fps: FPS_UNAVAILABLE,
            sequence: 0,
            released: false,
        })
    }
}

fn find_appsink(pipeline: &gst::Pipeline) -> Option<AppSink> {
    let mut sinks = pipeline.iterate_sinks();
    while let Ok(Some(element)) = sinks.next() {
        if let Ok(sink) = element.downcast::<AppSink>() {
            return Some(sink);
        }
    }
    None
}

/// Running GStreamer pipeline
pub struct GstDevice {
    pipeline: gst::Pipeline,
    sink: AppSink,
    read_timeout: Duration,
    /// Last framerate seen in negotiated caps
    fps: f64,
    sequence: u64,
    released: bool,
}

impl GstDevice {
    /// Surface pipeline errors and EOS posted on the bus
    fn check_bus(&self) -> Result<(), CameraError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };

        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
            match msg.view() {
                gst::MessageView::Error(err) => {
                    return Err(CameraError::Stream(format!(
                        "Pipeline error: {} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                gst::MessageView::Eos(_) => {
                    return Err(CameraError::Stream("End of stream".into()));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn sample_to_frame(&mut self, sample: &gst::Sample) -> Result<VideoFrame, CameraError> {
        let caps = sample
            .caps()
            .ok_or_else(|| CameraError::Stream("Sample without caps".into()))?;
        let info = VideoInfo::from_caps(caps)
            .map_err(|e| CameraError::Stream(format!("Unsupported caps: {e}")))?;

        let rate = info.fps();
        if rate.numer() > 0 && rate.denom() > 0 {
            self.fps = f64::from(rate.numer()) / f64::from(rate.denom());
        }

        let format = match info.format() {
            VideoFormat::Bgr => PixelFormat::Bgr24,
            VideoFormat::Rgb => PixelFormat::Rgb24,
            VideoFormat::Gray8 => PixelFormat::Gray8,
            other => {
                return Err(CameraError::Stream(format!(
                    "Unsupported pixel format {other:?}"
                )))
            }
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| CameraError::Stream("Sample without buffer".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| CameraError::Stream("Buffer not readable".into()))?;

        let width = info.width();
        let height = info.height();
        let row = width as usize * format.channels();
        let stride = info.stride().first().copied().unwrap_or(0) as usize;

        // Drop per-row padding so the frame is tightly packed
        let data = if stride == row || stride == 0 {
            map.as_slice().to_vec()
        } else {
            map.as_slice()
                .chunks(stride)
                .take(height as usize)
                .filter_map(|line| line.get(..row))
                .flatten()
                .copied()
                .collect()
        };

        let timestamp_ns = buffer.pts().map(|t| t.nseconds()).unwrap_or(0);
        // A short sample would otherwise come out as a silently truncated image
        let frame =
            VideoFrame::from_packed(data, width, height, format, timestamp_ns, self.sequence)?;
        self.sequence += 1;
        Ok(frame)
    }
}

impl CaptureDevice for GstDevice {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.released {
            return Err(CameraError::Stream("Pipeline already released".into()));
        }
        self.check_bus()?;

        let timeout = gst::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        match self.sink.try_pull_sample(timeout) {
            Some(sample) => self.sample_to_frame(&sample).map(Some),
            None if self.sink.is_eos() => Err(CameraError::Stream("End of stream".into())),
            None => Ok(None),
        }
    }

    fn reported_fps(&self) -> f64 {
        self.fps
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to stop pipeline: {:?}", e);
        }
        info!("GStreamer pipeline released after {} frames", self.sequence);
    }
}

impl Drop for GstDevice {
    fn drop(&mut self) {
        self.release();
    }
}
