use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector failure. `Unavailable` means the backing engine cannot run at
/// all; `Inference` is a per-frame failure. Both degrade a single tick, never
/// the session.
#[derive(Clone, Debug)]
pub enum DetectorError {
    Unavailable(String),
    Inference(String),
}

impl std::fmt::Display for DetectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorError::Unavailable(msg) => write!(f, "detector unavailable: {}", msg),
            DetectorError::Inference(msg) => write!(f, "inference failed: {}", msg),
        }
    }
}

impl std::error::Error for DetectorError {}

/// Object detector backend.
///
/// The frame handed to `detect` is already resized to `input_size`; box
/// coordinates in the result are pixels in that frame. Implementations
/// filter by `confidence_threshold` themselves; callers do not re-filter.
pub trait Detector: Send {
    /// Backend identifier, for logs.
    fn name(&self) -> &'static str;

    /// Run detection on a resized frame.
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        input_size: (u32, u32),
    ) -> Result<Vec<Detection>, DetectorError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }
}
