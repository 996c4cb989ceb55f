use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult, ObjectClass};

const BLOCK_SIZE: u32 = 16;
const DEFAULT_THRESHOLD: f32 = 12.0;

/// CPU backend: block-level frame differencing.
///
/// The frame is reduced to a grid of mean-luma blocks; a block whose luma
/// moved by more than the threshold since the previous frame counts as
/// changed, and the bounding box of all changed blocks becomes the detection.
/// The first frame after startup (or after a resolution change) never
/// reports presence because there is nothing to diff against.
pub struct CpuBackend {
    threshold: f32,
    last_grid: Option<LumaGrid>,
}

struct LumaGrid {
    width: u32,
    height: u32,
    blocks_x: u32,
    blocks_y: u32,
    values: Vec<f32>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            last_grid: None,
        }
    }

    /// Override the default luma-change threshold (0..255 scale).
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    fn grid_for(pixels: &[u8], width: u32, height: u32) -> LumaGrid {
        let blocks_x = width.div_ceil(BLOCK_SIZE);
        let blocks_y = height.div_ceil(BLOCK_SIZE);
        let mut values = vec![0.0f32; (blocks_x * blocks_y) as usize];
        let mut counts = vec![0u32; values.len()];

        for y in 0..height {
            let block_row = y / BLOCK_SIZE;
            for x in 0..width {
                let idx = ((y * width + x) * 3) as usize;
                let luma = 0.299 * pixels[idx] as f32
                    + 0.587 * pixels[idx + 1] as f32
                    + 0.114 * pixels[idx + 2] as f32;
                let block = (block_row * blocks_x + x / BLOCK_SIZE) as usize;
                values[block] += luma;
                counts[block] += 1;
            }
        }

        for (value, count) in values.iter_mut().zip(&counts) {
            if *count > 0 {
                *value /= *count as f32;
            }
        }

        LumaGrid {
            width,
            height,
            blocks_x,
            blocks_y,
            values,
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::Motion)
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{} frame, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }

        let grid = Self::grid_for(pixels, width, height);
        let result = match &self.last_grid {
            Some(prev) if prev.width == width && prev.height == height => {
                Self::diff(prev, &grid, self.threshold)
            }
            // First frame, or resolution changed: nothing to diff against.
            _ => DetectionResult::default(),
        };
        self.last_grid = Some(grid);
        Ok(result)
    }
}

impl CpuBackend {
    fn diff(previous: &LumaGrid, current: &LumaGrid, threshold: f32) -> DetectionResult {
        let mut min_bx = u32::MAX;
        let mut min_by = u32::MAX;
        let mut max_bx = 0u32;
        let mut max_by = 0u32;
        let mut changed = false;

        for by in 0..current.blocks_y {
            for bx in 0..current.blocks_x {
                let idx = (by * current.blocks_x + bx) as usize;
                if (current.values[idx] - previous.values[idx]).abs() > threshold {
                    changed = true;
                    min_bx = min_bx.min(bx);
                    min_by = min_by.min(by);
                    max_bx = max_bx.max(bx);
                    max_by = max_by.max(by);
                }
            }
        }

        if !changed {
            return DetectionResult::default();
        }

        let width = current.width;
        let height = current.height;
        let x = (min_bx * BLOCK_SIZE) as f32 / width as f32;
        let y = (min_by * BLOCK_SIZE) as f32 / height as f32;
        let w = (((max_bx + 1) * BLOCK_SIZE).min(width) - min_bx * BLOCK_SIZE) as f32 / width as f32;
        let h = (((max_by + 1) * BLOCK_SIZE).min(height) - min_by * BLOCK_SIZE) as f32
            / height as f32;

        DetectionResult {
            detections: vec![Detection {
                x,
                y,
                w,
                h,
                confidence: 0.85,
                class: ObjectClass::Unknown,
            }],
            confidence: 0.85,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(width: u32, height: u32, value: u8) -> Vec<u8> {
        vec![value; (width * height * 3) as usize]
    }

    fn frame_with_block(width: u32, height: u32, background: u8) -> Vec<u8> {
        let mut pixels = flat_frame(width, height, background);
        // Bright 16x16 square in the upper-left quadrant.
        for y in 16..32u32 {
            for x in 16..32u32 {
                let idx = ((y * width + x) * 3) as usize;
                pixels[idx] = 255;
                pixels[idx + 1] = 255;
                pixels[idx + 2] = 255;
            }
        }
        pixels
    }

    #[test]
    fn first_frame_is_absent() {
        let mut backend = CpuBackend::new();
        let result = backend.detect(&flat_frame(64, 64, 20), 64, 64).unwrap();
        assert!(!result.presence());
    }

    #[test]
    fn static_scene_stays_absent() {
        let mut backend = CpuBackend::new();
        backend.detect(&flat_frame(64, 64, 20), 64, 64).unwrap();
        let result = backend.detect(&flat_frame(64, 64, 20), 64, 64).unwrap();
        assert!(!result.presence());
    }

    #[test]
    fn appearing_object_is_detected_with_local_box() {
        let mut backend = CpuBackend::new();
        backend.detect(&flat_frame(64, 64, 20), 64, 64).unwrap();
        let result = backend
            .detect(&frame_with_block(64, 64, 20), 64, 64)
            .unwrap();

        assert!(result.presence());
        let detection = &result.detections[0];
        assert!(detection.x >= 0.2 && detection.x <= 0.3);
        assert!(detection.y >= 0.2 && detection.y <= 0.3);
        assert!(detection.w <= 0.5);
    }

    #[test]
    fn resolution_change_resets_the_diff() {
        let mut backend = CpuBackend::new();
        backend.detect(&flat_frame(64, 64, 20), 64, 64).unwrap();
        let result = backend.detect(&flat_frame(32, 32, 250), 32, 32).unwrap();
        assert!(!result.presence());
    }

    #[test]
    fn rejects_short_pixel_buffer() {
        let mut backend = CpuBackend::new();
        assert!(backend.detect(&[0u8; 16], 64, 64).is_err());
    }
}
