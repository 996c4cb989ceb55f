//! Local file frame source.
//!
//! `FileSource` replays a local video file through the recording pipeline,
//! which is how recorded footage gets re-run against a detector without a
//! camera. Paths starting with `stub://` select a synthetic backend that
//! plays a short fixed clip and then ends the stream; real decoding uses
//! FFmpeg behind the `ingest-file-ffmpeg` feature.
//!
//! Unlike camera devices, files end: `next_frame` returns `Ok(None)` when
//! the clip is exhausted, and the driver shuts the run down cleanly.

use anyhow::Result;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path (e.g. "/var/lib/sentry/clip.mp4").
    pub path: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            target_fps: 20,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow::anyhow!(
                "file replay only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow::anyhow!(
                    "file replay requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

/// Length of the synthetic clip in frames.
const SYNTHETIC_CLIP_FRAMES: u64 = 240;
const VISITOR_ENTERS_AT: u64 = 60;
const VISITOR_LEAVES_AT: u64 = 150;
const VISITOR_SIZE: u32 = 32;
const CLIP_WIDTH: u32 = 640;
const CLIP_HEIGHT: u32 = 480;

struct SyntheticFileSource {
    config: FileConfig,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("FileSource: connected to {} (synthetic)", self.config.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= SYNTHETIC_CLIP_FRAMES {
            return Ok(None);
        }
        let pixels = self.generate_synthetic_pixels();
        self.frame_count += 1;
        Ok(Some(Frame::new(pixels, CLIP_WIDTH, CLIP_HEIGHT)))
    }

    /// One visitor episode in the middle of the clip, quiet lead-in and
    /// lead-out around it.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let mut pixels = vec![0u8; (CLIP_WIDTH * CLIP_HEIGHT * 3) as usize];

        for y in 0..CLIP_HEIGHT {
            let shade = (30 + y * 50 / CLIP_HEIGHT) as u8;
            for x in 0..CLIP_WIDTH {
                let idx = ((y * CLIP_WIDTH + x) * 3) as usize;
                pixels[idx] = shade;
                pixels[idx + 1] = shade;
                pixels[idx + 2] = shade;
            }
        }

        let cycle = self.frame_count;
        if (VISITOR_ENTERS_AT..VISITOR_LEAVES_AT).contains(&cycle) {
            let visitor_x =
                ((cycle - VISITOR_ENTERS_AT) as u32 * 4) % (CLIP_WIDTH - VISITOR_SIZE);
            let top = CLIP_HEIGHT / 3;
            for y in top..top + VISITOR_SIZE {
                for x in visitor_x..visitor_x + VISITOR_SIZE {
                    let idx = ((y * CLIP_WIDTH + x) * 3) as usize;
                    pixels[idx] = 240;
                    pixels[idx + 1] = 230;
                    pixels[idx + 2] = 200;
                }
            }
        }

        pixels
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
