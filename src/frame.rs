//! Frame container shared by ingestion, detection, and recording.
//!
//! Frames are packed RGB24: `width * height * 3` bytes, rows top to bottom.
//! Sources produce them, detector backends read them, and recording sinks
//! encode them. Nothing in the pipeline retains a frame beyond the tick that
//! captured it.

/// A single captured video frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Packed RGB24 pixel data.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Byte length expected of a packed RGB24 buffer with these dimensions.
    pub fn expected_rgb24_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}
