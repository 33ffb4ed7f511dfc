//! Synthetic `stub://` camera source.
//!
//! Produces deterministic moving-pattern frames without any device or
//! network dependency. Query parameters make failure modes scriptable for
//! tests:
//!
//! - `frames=N`       stream ends (EndOfStream) after N successful reads
//! - `fail_read_at=K` the K-th read reports a read error (stream survives)
//! - `fail_from=K`    every read from the K-th onward reports a read error
//! - `width=W` / `height=H` frame dimensions (default 640x480)
//!
//! Example: `stub://bench?frames=30&fail_read_at=3&width=64&height=48`

use crate::camera::{AcquireError, CameraBackend, CameraError};
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Debug)]
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_budget: Option<u64>,
    fail_read_at: Option<u64>,
    fail_from: Option<u64>,
    reads: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn open(url: &str) -> Result<Self, AcquireError> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| AcquireError::Invalid(format!("not a stub url: {}", url)))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };
        if name.is_empty() {
            return Err(AcquireError::Invalid(
                "stub source needs a name, e.g. stub://bench".to_string(),
            ));
        }
        // "missing" is the conventional always-absent source for tests.
        if name == "missing" {
            return Err(AcquireError::NotFound(format!("stub source '{}'", name)));
        }

        let mut source = Self {
            name: name.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_budget: None,
            fail_read_at: None,
            fail_from: None,
            reads: 0,
            scene_state: 0,
        };
        if let Some(query) = query {
            for pair in query.split('&') {
                let Some((key, value)) = pair.split_once('=') else {
                    continue;
                };
                match key {
                    "frames" => source.frame_budget = Some(parse_param(key, value)?),
                    "fail_read_at" => source.fail_read_at = Some(parse_param(key, value)?),
                    "fail_from" => source.fail_from = Some(parse_param(key, value)?),
                    "width" => source.width = parse_param(key, value)?,
                    "height" => source.height = parse_param(key, value)?,
                    other => {
                        return Err(AcquireError::Invalid(format!(
                            "unknown stub parameter '{}'",
                            other
                        )))
                    }
                }
            }
        }
        if source.width == 0 || source.height == 0 {
            return Err(AcquireError::Invalid(
                "stub dimensions must be non-zero".to_string(),
            ));
        }
        log::info!("camera opened: stub://{} (synthetic)", source.name);
        Ok(source)
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        // Shift the scene every 50 frames so motion-style detectors see change.
        if self.reads % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let pixel_count = (self.width * self.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.reads + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AcquireError> {
    value.parse().map_err(|_| {
        AcquireError::Invalid(format!(
            "stub parameter {}={} is out of range or not a number",
            key, value
        ))
    })
}

impl CameraBackend for SyntheticSource {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        if let Some(budget) = self.frame_budget {
            if self.reads >= budget {
                return Err(CameraError::EndOfStream);
            }
        }
        self.reads += 1;
        if self.fail_read_at == Some(self.reads)
            || self.fail_from.is_some_and(|from| self.reads >= from)
        {
            return Err(CameraError::Read(format!(
                "injected read failure on frame {}",
                self.reads
            )));
        }
        let pixels = self.generate_pixels();
        Ok(Frame {
            data: pixels,
            width: self.width,
            height: self.height,
        })
    }

    fn close(&mut self) {
        log::debug!("camera closed: stub://{}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_budget_becomes_end_of_stream() {
        let mut source = SyntheticSource::open("stub://bench?frames=2").unwrap();
        assert!(source.read_frame().is_ok());
        assert!(source.read_frame().is_ok());
        assert_eq!(source.read_frame().unwrap_err(), CameraError::EndOfStream);
        assert_eq!(source.read_frame().unwrap_err(), CameraError::EndOfStream);
    }

    #[test]
    fn injected_failure_hits_exactly_one_read() {
        let mut source = SyntheticSource::open("stub://bench?fail_read_at=2").unwrap();
        assert!(source.read_frame().is_ok());
        assert!(matches!(
            source.read_frame().unwrap_err(),
            CameraError::Read(_)
        ));
        assert!(source.read_frame().is_ok());
    }

    #[test]
    fn fail_from_makes_every_later_read_fail() {
        let mut source = SyntheticSource::open("stub://bench?fail_from=2").unwrap();
        assert!(source.read_frame().is_ok());
        for _ in 0..3 {
            assert!(matches!(
                source.read_frame().unwrap_err(),
                CameraError::Read(_)
            ));
        }
    }

    #[test]
    fn missing_stub_source_fails_acquire() {
        assert!(matches!(
            SyntheticSource::open("stub://missing").unwrap_err(),
            AcquireError::NotFound(_)
        ));
    }

    #[test]
    fn oversized_dimension_is_rejected_not_truncated() {
        assert!(matches!(
            SyntheticSource::open("stub://bench?width=4294967297").unwrap_err(),
            AcquireError::Invalid(_)
        ));
    }

    #[test]
    fn custom_dimensions_apply() {
        let mut source = SyntheticSource::open("stub://bench?width=32&height=16").unwrap();
        let frame = source.read_frame().unwrap();
        assert_eq!((frame.width, frame.height), (32, 16));
        assert_eq!(frame.data.len(), 32 * 16 * 3);
    }
}
