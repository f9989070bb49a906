//! Capture backend abstraction
//!
//! The video-capture library is an external collaborator. The stream only
//! needs to open a descriptor, pull frames, ask for the reported rate and
//! release the device.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CameraError, VideoFrame};

/// Value returned by [`CaptureDevice::reported_fps`] when the rate is unknown
pub const FPS_UNAVAILABLE: f64 = -1.0;

/// Backend selector passed alongside the descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureApi {
    /// GStreamer launch string ending in an appsink
    #[default]
    GStreamer,
    /// Let the backend pick
    Any,
}

impl fmt::Display for CaptureApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureApi::GStreamer => f.write_str("gstreamer"),
            CaptureApi::Any => f.write_str("any"),
        }
    }
}

/// Opens capture devices from descriptors
pub trait CaptureBackend {
    type Device: CaptureDevice + 'static;

    /// Open the pipeline described by `descriptor`
    fn open(&self, descriptor: &str, api: CaptureApi) -> Result<Self::Device, CameraError>;
}

/// An opened capture device
///
/// Owned by exactly one thread at a time; the capture thread while running.
pub trait CaptureDevice: Send {
    /// Pull the next frame
    ///
    /// `Ok(None)` means the backend's read timeout elapsed with no frame and
    /// the caller may try again. `Err` is a read failure; the device should
    /// not be read again.
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Capture rate reported by the backend, or [`FPS_UNAVAILABLE`]
    fn reported_fps(&self) -> f64;

    /// Release the underlying hardware
    fn release(&mut self);
}
