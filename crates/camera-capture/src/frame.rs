//! Video frame types

use crate::CameraError;

/// Pixel layout of a captured buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit blue, green, red (the appsink output of the CSI pipeline)
    Bgr24,
    Rgb24,
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Bgr24 | PixelFormat::Rgb24 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// One captured image buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Packed pixel data (width * height * channels)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Capture timestamp (nanoseconds, backend clock)
    pub timestamp_ns: u64,
    /// Frame sequence number assigned by the backend
    pub sequence: u64,
}

impl VideoFrame {
    /// Wrap a tightly packed buffer, rejecting one that does not cover
    /// `width * height` pixels of `format`
    pub fn from_packed(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp_ns: u64,
        sequence: u64,
    ) -> Result<Self, CameraError> {
        let frame = Self {
            data,
            width,
            height,
            format,
            timestamp_ns,
            sequence,
        };
        if !frame.is_well_formed() {
            return Err(CameraError::Stream(format!(
                "Frame {} is {} bytes, expected {} for {}x{} {:?}",
                sequence,
                frame.data.len(),
                frame.expected_len(),
                width,
                height,
                format
            )));
        }
        Ok(frame)
    }

    /// Create a zero-filled frame of the given size and format
    pub fn blank(width: u32, height: u32, format: PixelFormat, sequence: u64) -> Self {
        let len = width as usize * height as usize * format.channels();
        Self {
            data: vec![0; len],
            width,
            height,
            format,
            timestamp_ns: 0,
            sequence,
        }
    }

    /// Byte length implied by the dimensions and format
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels()
    }

    /// Whether the buffer length matches the dimensions
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame_size() {
        let frame = VideoFrame::blank(4, 2, PixelFormat::Bgr24, 9);
        assert_eq!(frame.data.len(), 24);
        assert!(frame.is_well_formed());
        assert_eq!(frame.sequence, 9);
    }

    #[test]
    fn test_packed_frame_accepted() {
        let frame = VideoFrame::from_packed(vec![7; 12], 2, 2, PixelFormat::Bgr24, 40, 3).unwrap();
        assert_eq!(frame.timestamp_ns, 40);
        assert_eq!(frame.expected_len(), 12);
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let err = VideoFrame::from_packed(vec![0; 5], 2, 2, PixelFormat::Bgr24, 0, 1).unwrap_err();
        assert!(matches!(err, CameraError::Stream(_)));
        assert!(err.to_string().contains("expected 12"));

        // Gray frames need one byte per pixel
        assert!(VideoFrame::from_packed(vec![0; 4], 2, 2, PixelFormat::Gray8, 0, 2).is_ok());
    }
}
