use std::collections::VecDeque;

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult, ObjectClass};

/// Stub backend for tests and dry runs.
///
/// By default it reports presence whenever the pixel content changes between
/// consecutive frames. A scripted variant replays a fixed presence sequence,
/// which is what the controller tests use to drive exact start/stop timing.
pub struct StubBackend {
    script: Option<VecDeque<bool>>,
    last_hash: Option<[u8; 32]>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: None,
            last_hash: None,
        }
    }

    /// Replay a fixed presence sequence, one entry per frame. Once the
    /// script is exhausted every frame reads as absent.
    pub fn with_script<I: IntoIterator<Item = bool>>(script: I) -> Self {
        Self {
            script: Some(script.into_iter().collect()),
            last_hash: None,
        }
    }

    fn full_frame_detection() -> Detection {
        Detection {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
            confidence: 0.9,
            class: ObjectClass::Unknown,
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::Motion | DetectionCapability::ObjectDetection
        )
    }

    fn detect(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionResult> {
        let presence = match &mut self.script {
            Some(script) => script.pop_front().unwrap_or(false),
            None => {
                let current_hash: [u8; 32] = Sha256::digest(pixels).into();
                let changed = self.last_hash.is_some_and(|prev| prev != current_hash);
                self.last_hash = Some(current_hash);
                changed
            }
        };

        if presence {
            Ok(DetectionResult {
                detections: vec![Self::full_frame_detection()],
                confidence: 0.9,
            })
        } else {
            Ok(DetectionResult::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_mode_reports_presence_on_change() {
        let mut backend = StubBackend::new();

        let r1 = backend.detect(b"frame1", 10, 10).unwrap();
        assert!(!r1.presence());

        let r2 = backend.detect(b"frame2", 10, 10).unwrap();
        assert!(r2.presence());

        let r3 = backend.detect(b"frame2", 10, 10).unwrap();
        assert!(!r3.presence());
    }

    #[test]
    fn scripted_mode_replays_sequence_then_goes_absent() {
        let mut backend = StubBackend::with_script([false, true, true]);

        let signals: Vec<bool> = (0..5)
            .map(|_| backend.detect(b"frame", 10, 10).unwrap().presence())
            .collect();
        assert_eq!(signals, vec![false, true, true, false, false]);
    }
}
