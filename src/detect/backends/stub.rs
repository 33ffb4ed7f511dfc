use crate::detect::backend::{Detector, DetectorError};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub detector for tests and demos.
///
/// By default it returns a fixed set of detections on every call, filtered by
/// the requested threshold. A script of per-call outcomes can be pushed for
/// failure-injection tests; scripted outcomes are consumed first, then the
/// detector falls back to the fixed set.
pub struct StubDetector {
    fixed: Vec<Detection>,
    script: std::collections::VecDeque<Result<Vec<Detection>, DetectorError>>,
    warm_up_error: Option<DetectorError>,
    calls: u64,
}

impl StubDetector {
    pub fn new() -> Self {
        Self {
            fixed: Vec::new(),
            script: std::collections::VecDeque::new(),
            warm_up_error: None,
            calls: 0,
        }
    }

    /// Detector that reports `detections` on every frame.
    pub fn fixed(detections: Vec<Detection>) -> Self {
        Self {
            fixed: detections,
            script: std::collections::VecDeque::new(),
            warm_up_error: None,
            calls: 0,
        }
    }

    /// Queue an outcome for the next call. Outcomes are consumed in order.
    pub fn push_outcome(&mut self, outcome: Result<Vec<Detection>, DetectorError>) {
        self.script.push_back(outcome);
    }

    /// Make `warm_up` report this error.
    pub fn with_warm_up_error(mut self, error: DetectorError) -> Self {
        self.warm_up_error = Some(error);
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn warm_up(&mut self) -> Result<(), DetectorError> {
        match &self.warm_up_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn detect(
        &mut self,
        _frame: &Frame,
        confidence_threshold: f32,
        _input_size: (u32, u32),
    ) -> Result<Vec<Detection>, DetectorError> {
        self.calls += 1;
        if let Some(outcome) = self.script.pop_front() {
            return outcome.map(|detections| {
                detections
                    .into_iter()
                    .filter(|d| d.confidence >= confidence_threshold)
                    .collect()
            });
        }
        Ok(self
            .fixed
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .cloned()
            .collect())
    }
}
