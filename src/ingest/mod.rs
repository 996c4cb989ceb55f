//! Frame ingestion sources.
//!
//! This module provides the sources the capture loop pulls frames from:
//! - Local camera devices (synthetic `stub://` backend always available,
//!   real V4L2 devices behind the `ingest-v4l2` feature)
//! - Local video files for replay (feature: ingest-file-ffmpeg)
//!
//! All sources yield packed RGB24 `Frame`s in arrival order. A source
//! signals a clean end of stream by returning `Ok(None)`; capture errors are
//! fatal for the run and surface as `Err`.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod v4l2;

pub use file::FileSource;
pub use v4l2::V4l2Source;

use anyhow::Result;
#[cfg(feature = "ingest-v4l2")]
use anyhow::Context;

use crate::config::CameraSettings;
use crate::frame::Frame;
use file::FileConfig;
use v4l2::V4l2Config;

/// A source of captured frames.
///
/// `next_frame` returns `Ok(None)` when the stream has cleanly ended (a
/// replayed file ran out of frames). Device sources never end cleanly; a
/// lost camera is an error.
pub trait FrameSource {
    /// Connect to the underlying device or file.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Build the frame source named by the camera settings.
///
/// - `auto`: probe `/dev/video0..N` and take the first usable camera
/// - `stub://...` or `/dev/...`: camera device source
/// - anything else: local video file replay
pub fn open_source(camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let device = camera.device.as_str();
    if device == "auto" {
        return open_probed(camera);
    }
    if device.starts_with("stub://") || device.starts_with("/dev/") {
        let source = V4l2Source::new(V4l2Config {
            device: device.to_string(),
            target_fps: camera.target_fps,
            width: camera.width,
            height: camera.height,
        })?;
        return Ok(Box::new(source));
    }
    let source = FileSource::new(FileConfig {
        path: device.to_string(),
        target_fps: camera.target_fps,
    })?;
    Ok(Box::new(source))
}

#[cfg(feature = "ingest-v4l2")]
fn open_probed(camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let probed = probe_cameras(camera.max_probe_index);
    let first = probed.first().with_context(|| {
        format!(
            "no usable camera found on /dev/video0..{}",
            camera.max_probe_index
        )
    })?;
    log::info!("camera auto-probe selected {}", first.device);
    let source = V4l2Source::new(V4l2Config {
        device: first.device.clone(),
        target_fps: camera.target_fps,
        width: camera.width,
        height: camera.height,
    })?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_probed(_camera: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("camera device 'auto' requires the ingest-v4l2 feature")
}

/// A camera device that opened successfully during probing.
#[cfg(feature = "ingest-v4l2")]
#[derive(Clone, Debug)]
pub struct ProbedCamera {
    pub index: u32,
    pub device: String,
    pub card: String,
}

/// Try device indices `0..=max_index` and report the ones that open.
#[cfg(feature = "ingest-v4l2")]
pub fn probe_cameras(max_index: u32) -> Vec<ProbedCamera> {
    (0..=max_index)
        .filter_map(|index| {
            let device = match v4l::Device::new(index as usize) {
                Ok(device) => device,
                Err(_) => return None,
            };
            let card = device
                .query_caps()
                .map(|caps| caps.card)
                .unwrap_or_else(|_| "unknown device".to_string());
            Some(ProbedCamera {
                index,
                device: format!("/dev/video{}", index),
                card,
            })
        })
        .collect()
}
