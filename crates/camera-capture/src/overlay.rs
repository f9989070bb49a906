//! FPS overlay labels
//!
//! Only the label text and placement live here; drawing them onto the
//! image is up to whatever renders the frame.

use std::time::Duration;

use crate::backend::CaptureBackend;
use crate::stats::FpsSnapshot;
use crate::stream::VideoStream;
use crate::{CameraError, VideoFrame};

/// Text to draw at a bottom-left anchor (pixels)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub text: String,
    pub position: (i32, i32),
}

/// Labels for the last completed statistics interval
pub fn fps_labels(stats: &FpsSnapshot) -> [Label; 2] {
    [
        Label {
            text: format!("Frames Displayed (PS): {}", stats.frames_displayed),
            position: (10, 20),
        },
        Label {
            text: format!("Frames Read (PS): {}", stats.frames_read),
            position: (10, 40),
        },
    ]
}

/// Wait up to `timeout` for a frame and, when `monitor_fps` is set, the
/// labels to draw on it
///
/// `Ok(None)` means no frame arrived in time.
pub fn read_with_labels<B: CaptureBackend>(
    stream: &VideoStream<B>,
    monitor_fps: bool,
    timeout: Duration,
) -> Result<Option<(VideoFrame, Vec<Label>)>, CameraError> {
    let Some(frame) = stream.read_timeout(timeout)? else {
        return Ok(None);
    };
    let labels = if monitor_fps {
        fps_labels(&stream.last_stats()).to_vec()
    } else {
        Vec::new()
    };
    Ok(Some((frame, labels)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use crate::profile::CameraProfile;

    #[test]
    fn test_label_text_and_position() {
        let [displayed, read] = fps_labels(&FpsSnapshot {
            frames_read: 30,
            frames_displayed: 28,
        });

        assert_eq!(displayed.text, "Frames Displayed (PS): 28");
        assert_eq!(displayed.position, (10, 20));
        assert_eq!(read.text, "Frames Read (PS): 30");
        assert_eq!(read.position, (10, 40));
    }

    #[test]
    fn test_labels_only_when_monitoring() {
        let mut stream =
            VideoStream::new(&CameraProfile::default(), MockBackend::synthetic(1, 1, 200.0));
        stream.start().unwrap();
        let wait = Duration::from_secs(2);

        let (_, labels) = read_with_labels(&stream, false, wait).unwrap().unwrap();
        assert!(labels.is_empty());

        let (_, labels) = read_with_labels(&stream, true, wait).unwrap().unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[1].text, "Frames Read (PS): 0");
    }

    #[test]
    fn test_no_frame_within_timeout() {
        let (script, backend) = MockBackend::scripted();
        let backend = backend.with_read_timeout(Duration::from_millis(10));
        let mut stream = VideoStream::new(&CameraProfile::default(), backend);

        script.frame(VideoFrame::blank(1, 1, crate::PixelFormat::Gray8, 1));
        stream.start().unwrap();
        assert_eq!(stream.read().unwrap().sequence, 1);

        assert!(read_with_labels(&stream, true, Duration::from_millis(30))
            .unwrap()
            .is_none());
    }
}
