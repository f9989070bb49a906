//! GStreamer pipeline descriptors for CSI capture

use std::fmt;

use crate::profile::CameraProfile;

/// Default appsink queue length
pub const DEFAULT_MAX_BUFFERS: u32 = 60;

/// Backend-specific capture descriptor
///
/// Produced once per stream and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureDescriptor(String);

impl CaptureDescriptor {
    /// Wrap an arbitrary descriptor (e.g. a `videotestsrc` pipeline)
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaptureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaptureDescriptor {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CaptureDescriptor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Builds the `nvarguscamerasrc` launch string for a profile
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    profile: CameraProfile,
    max_buffers: u32,
    drop_frames: bool,
}

impl PipelineBuilder {
    pub fn new(profile: &CameraProfile) -> Self {
        Self {
            profile: *profile,
            max_buffers: DEFAULT_MAX_BUFFERS,
            drop_frames: true,
        }
    }

    /// Appsink queue length before it starts dropping or blocking
    pub fn max_buffers(mut self, max_buffers: u32) -> Self {
        self.max_buffers = max_buffers.max(1);
        self
    }

    /// Let the appsink discard old buffers when its queue is full
    pub fn drop_frames(mut self, drop: bool) -> Self {
        self.drop_frames = drop;
        self
    }

    pub fn build(&self) -> CaptureDescriptor {
        let p = &self.profile;
        CaptureDescriptor(format!(
            "nvarguscamerasrc sensor-id={sensor} sensor-mode={mode} ! \
             video/x-raw(memory:NVMM), width=(int){cw}, height=(int){ch}, \
             format=(string)NV12, framerate=(fraction){fps}/1 ! \
             nvvidconv flip-method={flip} ! \
             video/x-raw, width=(int){dw}, height=(int){dh}, format=(string)BGRx ! \
             videoconvert ! \
             video/x-raw, format=(string)BGR ! \
             appsink wait-on-eos=false drop={drop} max-buffers={max}",
            sensor = p.sensor_id(),
            mode = p.mode_index(),
            cw = p.capture_width(),
            ch = p.capture_height(),
            fps = p.framerate(),
            flip = p.flip_code(),
            dw = p.display_width(),
            dh = p.display_height(),
            drop = self.drop_frames,
            max = self.max_buffers,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Rotation, SensorMode};

    #[test]
    fn test_default_profile_descriptor() {
        let descriptor = PipelineBuilder::new(&CameraProfile::default()).build();
        assert_eq!(
            descriptor.as_str(),
            "nvarguscamerasrc sensor-id=0 sensor-mode=2 ! \
             video/x-raw(memory:NVMM), width=(int)1920, height=(int)1080, \
             format=(string)NV12, framerate=(fraction)30/1 ! \
             nvvidconv flip-method=0 ! \
             video/x-raw, width=(int)640, height=(int)480, format=(string)BGRx ! \
             videoconvert ! \
             video/x-raw, format=(string)BGR ! \
             appsink wait-on-eos=false drop=true max-buffers=60"
        );
    }

    #[test]
    fn test_rotation_and_mode_flow_through() {
        let profile =
            CameraProfile::new(1, Rotation::Rotate180, SensorMode::Imx477_2560x1440_40, 1280, 720)
                .unwrap();
        let descriptor = PipelineBuilder::new(&profile)
            .max_buffers(4)
            .drop_frames(false)
            .build();
        let s = descriptor.to_string();

        assert!(s.starts_with("nvarguscamerasrc sensor-id=1 sensor-mode=3 !"));
        assert!(s.contains("width=(int)2560, height=(int)1440"));
        assert!(s.contains("framerate=(fraction)40/1"));
        assert!(s.contains("flip-method=2"));
        assert!(s.contains("width=(int)1280, height=(int)720"));
        assert!(s.ends_with("drop=false max-buffers=4"));
    }

    #[test]
    fn test_builder_is_deterministic() {
        let profile = CameraProfile::default();
        assert_eq!(
            PipelineBuilder::new(&profile).build(),
            PipelineBuilder::new(&profile).build()
        );
    }
}
