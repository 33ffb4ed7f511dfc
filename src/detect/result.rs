/// One detection produced for a frame.
///
/// Box coordinates are pixels in the resized (detector-input) frame,
/// `(x1, y1)` top-left inclusive, `(x2, y2)` bottom-right exclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    /// Confidence in 0..=1. Detectors only emit detections at or above the
    /// requested threshold.
    pub confidence: f32,
    pub bbox: (i32, i32, i32, i32),
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: (i32, i32, i32, i32)) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}
