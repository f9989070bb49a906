//! Camera Capture Library for Embedded Vision
//!
//! Continuous frame acquisition from CSI ribbon cameras on Jetson boards.
//! Supports:
//! - Sony IMX219 and IMX477 sensor modes, resolved from a static table
//! - A background capture thread feeding a two-frame drop-oldest buffer
//! - Per-second frames-read / frames-displayed statistics
//! - Pluggable backends (GStreamer appsink, in-process mock)

pub mod backend;
mod capture;
pub mod config;
pub mod frame;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod mock;
pub mod overlay;
pub mod pipeline;
pub mod profile;
pub mod stats;
pub mod stream;

pub use backend::{CaptureApi, CaptureBackend, CaptureDevice, FPS_UNAVAILABLE};
pub use config::StreamConfig;
pub use frame::{PixelFormat, VideoFrame};
pub use mock::{MockBackend, MockEvent, MockScript};
pub use pipeline::{CaptureDescriptor, PipelineBuilder};
pub use profile::{CameraProfile, Rotation, SensorMode};
pub use stats::{FpsSnapshot, FrameCounters, StatsCollector, StatsError};
pub use stream::{StreamOptions, StreamState, VideoStream};

use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    /// Rotation, sensor mode or display size outside the supported table
    #[error("Invalid camera configuration: {0}")]
    Configuration(String),

    /// Device open or first frame grab failed
    #[error(
        "Failed to open video capture for {descriptor} using backend {api}. {reason}\n\
         Note: check that the camera is plugged in correctly. Common CSI installation \
         mistakes are inserting the ribbon backwards or using the wrong port."
    )]
    FailedToStart {
        descriptor: String,
        api: CaptureApi,
        reason: String,
    },

    /// Backend read failed after a successful start
    #[error("Failed to read a frame from video capture, connection to the camera has been lost")]
    ConnectionLost,

    /// Backend reported the FPS sentinel
    #[error("Failed to get camera FPS")]
    FpsUnavailable,

    /// Stream has not been started
    #[error("Camera stream not started")]
    NotStarted,

    /// Operation not allowed in the current lifecycle state
    #[error("Operation not allowed while stream is {0:?}")]
    InvalidState(StreamState),

    /// Backend could not open the descriptor
    #[error("Failed to open camera: {0}")]
    Open(String),

    /// Backend read error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Statistics collector misuse
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// Background thread could not be spawned
    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}
