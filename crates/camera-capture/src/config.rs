//! Stream configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::{CaptureApi, CaptureBackend};
use crate::pipeline::{CaptureDescriptor, PipelineBuilder, DEFAULT_MAX_BUFFERS};
use crate::profile::{CameraProfile, Rotation, SensorMode};
use crate::stream::{StreamOptions, VideoStream};
use crate::CameraError;

/// Stream configuration as loaded from file or environment
///
/// Rotation and sensor mode stay raw here so that bad values surface as
/// [`CameraError::Configuration`] when the profile is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// CSI port (`sensor-id`)
    pub sensor_id: u32,

    /// Rotation in degrees: 0, 90 or 180
    pub rotation: u16,

    /// Sensor mode name, e.g. `IMX219_1920x1080_30_2`
    pub sensor_mode: String,

    /// Output width after conversion
    pub display_width: u32,

    /// Output height after conversion
    pub display_height: u32,

    /// Custom backend descriptor; replaces the generated CSI pipeline
    pub pipeline: Option<String>,

    /// Backend selector
    pub api: CaptureApi,

    /// Appsink queue length for the generated pipeline
    pub max_buffers: u32,

    /// How long start waits for the first frame (milliseconds)
    pub start_timeout_ms: u64,

    /// FPS statistics interval (milliseconds)
    pub stats_interval_ms: u64,

    /// Frames retained between capture and consumer
    pub buffer_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        let options = StreamOptions::default();
        Self {
            sensor_id: 0,
            rotation: Rotation::None.degrees(),
            sensor_mode: SensorMode::default().name().to_string(),
            display_width: 640,
            display_height: 480,
            pipeline: None,
            api: CaptureApi::GStreamer,
            max_buffers: DEFAULT_MAX_BUFFERS,
            start_timeout_ms: options.start_timeout.as_millis() as u64,
            stats_interval_ms: options.stats_interval.as_millis() as u64,
            buffer_depth: options.buffer_depth,
        }
    }
}

impl StreamConfig {
    /// Validate into a camera profile
    pub fn profile(&self) -> Result<CameraProfile, CameraError> {
        CameraProfile::new(
            self.sensor_id,
            Rotation::try_from(self.rotation)?,
            self.sensor_mode.parse()?,
            self.display_width,
            self.display_height,
        )
    }

    /// Descriptor to open: the custom pipeline if set, else the CSI pipeline
    pub fn descriptor(&self) -> Result<CaptureDescriptor, CameraError> {
        match &self.pipeline {
            Some(pipeline) if !pipeline.trim().is_empty() => {
                Ok(CaptureDescriptor::new(pipeline.trim()))
            }
            _ => Ok(PipelineBuilder::new(&self.profile()?)
                .max_buffers(self.max_buffers)
                .build()),
        }
    }

    pub fn options(&self) -> StreamOptions {
        StreamOptions {
            start_timeout: Duration::from_millis(self.start_timeout_ms),
            stats_interval: Duration::from_millis(self.stats_interval_ms),
            buffer_depth: self.buffer_depth,
        }
    }

    /// Build a (not yet started) stream over `backend`
    pub fn build_stream<B: CaptureBackend>(&self, backend: B) -> Result<VideoStream<B>, CameraError> {
        let mut stream = VideoStream::from_descriptor(self.descriptor()?, self.api, backend);
        stream.configure(self.options())?;
        Ok(stream)
    }
}
