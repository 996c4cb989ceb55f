use anyhow::Result;

use crate::detect::result::DetectionResult;

/// Detection capabilities supported by backends.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    Motion,
    ObjectDetection,
}

/// Detector backend trait.
///
/// A backend turns one frame into zero or more detections. It is called once
/// per captured frame, in arrival order, and must not assume anything about
/// the wall-clock gap between calls.
///
/// Implementations must treat the pixel slice as read-only and ephemeral:
/// frames are not valid beyond the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier, used for selection in configuration.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a packed RGB24 frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult>;

    /// Optional warm-up hook, run once before the capture loop starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
