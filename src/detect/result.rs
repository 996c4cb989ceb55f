/// Result of running detection on a frame.
#[derive(Clone, Debug, Default)]
pub struct DetectionResult {
    /// Bounding boxes (normalized 0..1 coordinates), zero or more per frame.
    pub detections: Vec<Detection>,
    /// Confidence of primary detection.
    pub confidence: f32,
}

impl DetectionResult {
    /// Presence signal for the recording controller: at least one object of
    /// interest in the frame.
    pub fn presence(&self) -> bool {
        !self.detections.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class: ObjectClass,
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Face,
    Body,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_requires_at_least_one_detection() {
        assert!(!DetectionResult::default().presence());

        let result = DetectionResult {
            detections: vec![Detection {
                x: 0.1,
                y: 0.1,
                w: 0.5,
                h: 0.5,
                confidence: 0.9,
                class: ObjectClass::Unknown,
            }],
            confidence: 0.9,
        };
        assert!(result.presence());
    }
}
