//! MJPEG-in-AVI recording sink.
//!
//! Each frame is JPEG-encoded and appended as a `00dc` chunk inside the
//! RIFF `movi` list. The header is written up front with placeholder counts
//! and patched on finalize, which also appends the `idx1` index; an
//! unfinalized file is therefore incomplete by design, and `finalize` is
//! what makes the artifact playable.

use std::fs::{self, File};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder};

use crate::frame::Frame;
use crate::record::sink::{Recorder, RecordingSink};

// Fixed header layout: RIFF(12) + LIST hdrl(200) + LIST movi header(12).
const HEADER_LEN: u64 = 224;
const RIFF_SIZE_POS: u64 = 4;
const AVIH_TOTAL_FRAMES_POS: u64 = 48;
const AVIH_SUGGESTED_BUFFER_POS: u64 = 60;
const STRH_LENGTH_POS: u64 = 140;
const STRH_SUGGESTED_BUFFER_POS: u64 = 144;
const MOVI_SIZE_POS: u64 = 216;

const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;

/// Writes one `.avi` file per session under `output_dir`.
pub struct MjpegAviRecorder {
    output_dir: PathBuf,
    jpeg_quality: u8,
}

impl MjpegAviRecorder {
    pub fn new<P: Into<PathBuf>>(output_dir: P, jpeg_quality: u8) -> Self {
        Self {
            output_dir: output_dir.into(),
            jpeg_quality,
        }
    }
}

impl Recorder for MjpegAviRecorder {
    fn open(
        &mut self,
        name: &str,
        frame_rate: f64,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn RecordingSink>> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create recording output directory {}",
                self.output_dir.display()
            )
        })?;
        let path = self.output_dir.join(format!("{}.avi", name));
        let sink = MjpegAviSink::create(&path, frame_rate, width, height, self.jpeg_quality)?;
        log::debug!("opened recording sink {}", path.display());
        Ok(Box::new(sink))
    }
}

pub(crate) struct MjpegAviSink {
    writer: BufWriter<File>,
    path: PathBuf,
    width: u32,
    height: u32,
    jpeg_quality: u8,
    /// (offset from the `movi` fourcc, unpadded chunk size) per frame.
    index: Vec<(u32, u32)>,
    movi_payload: u32,
    max_chunk: u32,
    finalized: bool,
}

impl MjpegAviSink {
    pub(crate) fn create(
        path: &Path,
        frame_rate: f64,
        width: u32,
        height: u32,
        jpeg_quality: u8,
    ) -> Result<Self> {
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            return Err(anyhow!("frame rate must be positive, got {}", frame_rate));
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("frame size {}x{} is empty", width, height));
        }

        let file = File::create(path)
            .with_context(|| format!("failed to create recording file {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let scale = 1000u32;
        let rate = (frame_rate * scale as f64).round() as u32;
        let micros_per_frame = (1_000_000.0 / frame_rate).round() as u32;
        writer
            .write_all(&build_header(width, height, scale, rate, micros_per_frame))
            .with_context(|| format!("failed to write AVI header to {}", path.display()))?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            width,
            height,
            jpeg_quality,
            index: Vec::new(),
            movi_payload: 0,
            max_chunk: 0,
            finalized: false,
        })
    }

    fn patch(&mut self, pos: u64, value: u32) -> Result<()> {
        self.writer.seek(SeekFrom::Start(pos))?;
        self.writer.write_all(&value.to_le_bytes())?;
        Ok(())
    }
}

impl RecordingSink for MjpegAviSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finalized {
            return Err(anyhow!(
                "recording file {} is already finalized",
                self.path.display()
            ));
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match recording size {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }
        let expected = Frame::expected_rgb24_len(frame.width, frame.height);
        if frame.byte_len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                frame.byte_len()
            ));
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.jpeg_quality)
            .write_image(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)
            .context("JPEG encoding failed")?;

        let size = jpeg.len() as u32;
        let offset = 4 + self.movi_payload;
        self.writer.write_all(b"00dc")?;
        self.writer.write_all(&size.to_le_bytes())?;
        self.writer.write_all(&jpeg)?;
        let mut padded = size;
        if size % 2 == 1 {
            // RIFF chunks are word-aligned.
            self.writer.write_all(&[0])?;
            padded += 1;
        }

        self.movi_payload += 8 + padded;
        self.max_chunk = self.max_chunk.max(size);
        self.index.push((offset, size));
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }

        self.writer.write_all(b"idx1")?;
        self.writer
            .write_all(&(self.index.len() as u32 * 16).to_le_bytes())?;
        for &(offset, size) in &self.index {
            self.writer.write_all(b"00dc")?;
            self.writer.write_all(&AVIIF_KEYFRAME.to_le_bytes())?;
            self.writer.write_all(&offset.to_le_bytes())?;
            self.writer.write_all(&size.to_le_bytes())?;
        }

        let file_len = HEADER_LEN + self.movi_payload as u64 + 8 + self.index.len() as u64 * 16;
        let frames = self.index.len() as u32;
        self.patch(RIFF_SIZE_POS, (file_len - 8) as u32)?;
        self.patch(AVIH_TOTAL_FRAMES_POS, frames)?;
        self.patch(AVIH_SUGGESTED_BUFFER_POS, self.max_chunk)?;
        self.patch(STRH_LENGTH_POS, frames)?;
        self.patch(STRH_SUGGESTED_BUFFER_POS, self.max_chunk)?;
        self.patch(MOVI_SIZE_POS, 4 + self.movi_payload)?;
        self.writer
            .flush()
            .with_context(|| format!("failed to flush recording file {}", self.path.display()))?;

        self.finalized = true;
        log::debug!(
            "finalized recording file {} ({} frames)",
            self.path.display(),
            frames
        );
        Ok(())
    }
}

fn build_header(width: u32, height: u32, scale: u32, rate: u32, micros_per_frame: u32) -> Vec<u8> {
    let mut h = Vec::with_capacity(HEADER_LEN as usize);

    // RIFF container; total size patched on finalize.
    h.extend_from_slice(b"RIFF");
    put_u32(&mut h, 0);
    h.extend_from_slice(b"AVI ");

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, 192);
    h.extend_from_slice(b"hdrl");

    h.extend_from_slice(b"avih");
    put_u32(&mut h, 56);
    put_u32(&mut h, micros_per_frame);
    put_u32(&mut h, 0); // dwMaxBytesPerSec
    put_u32(&mut h, 0); // dwPaddingGranularity
    put_u32(&mut h, AVIF_HASINDEX);
    put_u32(&mut h, 0); // dwTotalFrames, patched on finalize
    put_u32(&mut h, 0); // dwInitialFrames
    put_u32(&mut h, 1); // dwStreams
    put_u32(&mut h, 0); // dwSuggestedBufferSize, patched on finalize
    put_u32(&mut h, width);
    put_u32(&mut h, height);
    put_u32(&mut h, 0);
    put_u32(&mut h, 0);
    put_u32(&mut h, 0);
    put_u32(&mut h, 0);

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, 116);
    h.extend_from_slice(b"strl");

    h.extend_from_slice(b"strh");
    put_u32(&mut h, 56);
    h.extend_from_slice(b"vids");
    h.extend_from_slice(b"MJPG");
    put_u32(&mut h, 0); // dwFlags
    put_u32(&mut h, 0); // wPriority, wLanguage
    put_u32(&mut h, 0); // dwInitialFrames
    put_u32(&mut h, scale);
    put_u32(&mut h, rate);
    put_u32(&mut h, 0); // dwStart
    put_u32(&mut h, 0); // dwLength, patched on finalize
    put_u32(&mut h, 0); // dwSuggestedBufferSize, patched on finalize
    put_u32(&mut h, u32::MAX); // dwQuality: driver default
    put_u32(&mut h, 0); // dwSampleSize
    put_u16(&mut h, 0); // rcFrame
    put_u16(&mut h, 0);
    put_u16(&mut h, width as u16);
    put_u16(&mut h, height as u16);

    // strf: BITMAPINFOHEADER
    h.extend_from_slice(b"strf");
    put_u32(&mut h, 40);
    put_u32(&mut h, 40); // biSize
    put_u32(&mut h, width);
    put_u32(&mut h, height);
    put_u16(&mut h, 1); // biPlanes
    put_u16(&mut h, 24); // biBitCount
    h.extend_from_slice(b"MJPG");
    put_u32(&mut h, width * height * 3); // biSizeImage
    put_u32(&mut h, 0);
    put_u32(&mut h, 0);
    put_u32(&mut h, 0);
    put_u32(&mut h, 0);

    h.extend_from_slice(b"LIST");
    put_u32(&mut h, 0); // movi size, patched on finalize
    h.extend_from_slice(b"movi");

    debug_assert_eq!(h.len() as u64, HEADER_LEN);
    h
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![128u8; (width * height * 3) as usize], width, height)
    }

    #[test]
    fn writes_a_valid_avi_and_counts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = MjpegAviRecorder::new(dir.path(), 85);
        let mut sink = recorder.open("05-03-2024-14-09-22", 20.0, 64, 48).unwrap();

        let frame = gray_frame(64, 48);
        for _ in 0..3 {
            sink.write_frame(&frame).unwrap();
        }
        sink.finalize().unwrap();

        let bytes = fs::read(dir.path().join("05-03-2024-14-09-22.avi")).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        assert_eq!(&bytes[220..224], b"movi");

        let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(riff_size as usize + 8, bytes.len());

        let total_frames = u32::from_le_bytes(bytes[48..52].try_into().unwrap());
        assert_eq!(total_frames, 3);
    }

    #[test]
    fn finalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.avi");
        let mut sink = MjpegAviSink::create(&path, 20.0, 64, 48, 85).unwrap();
        sink.write_frame(&gray_frame(64, 48)).unwrap();

        sink.finalize().unwrap();
        let len_after_first = fs::metadata(&path).unwrap().len();
        sink.finalize().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), len_after_first);
    }

    #[test]
    fn rejects_frames_of_the_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.avi");
        let mut sink = MjpegAviSink::create(&path, 20.0, 64, 48, 85).unwrap();
        assert!(sink.write_frame(&gray_frame(32, 32)).is_err());
    }

    #[test]
    fn open_fails_when_output_dir_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("recordings");
        fs::write(&blocker, b"not a directory").unwrap();

        let mut recorder = MjpegAviRecorder::new(&blocker, 85);
        assert!(recorder.open("clip", 20.0, 64, 48).is_err());
    }

    #[test]
    fn rejects_nonpositive_frame_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.avi");
        assert!(MjpegAviSink::create(&path, 0.0, 64, 48, 85).is_err());
    }
}
