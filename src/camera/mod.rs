//! Camera acquisition and the exclusive frame-read handle.
//!
//! This module provides the different sources a session can read from:
//! - `stub://` synthetic sources (tests, demos, benches)
//! - HTTP MJPEG/JPEG endpoints (feature: camera-http)
//!
//! A `CameraHandle` owns exclusive access to one source. It is created by
//! `CameraHandle::acquire`, read one frame at a time, and released exactly
//! once, whether by explicit `release()`, by drop, or on a fatal read error.
//! The session controller is the sole owner of a live handle.

#[cfg(feature = "camera-http")]
pub mod http;
pub mod synthetic;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::frame::Frame;

pub use synthetic::SyntheticSource;

/// Camera source identifier: a device index, a stub source, or a URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Local device index ("0", "1", ...). Requires a device backend.
    Index(u32),
    /// Synthetic source, e.g. "stub://bench?frames=30".
    Stub(String),
    /// HTTP MJPEG/JPEG endpoint (feature: camera-http).
    Url(String),
}

impl SourceSpec {
    pub fn parse(raw: &str) -> Result<Self, AcquireError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AcquireError::Invalid("empty camera source".to_string()));
        }
        if let Ok(index) = raw.parse::<u32>() {
            return Ok(SourceSpec::Index(index));
        }
        if raw.starts_with("stub://") {
            return Ok(SourceSpec::Stub(raw.to_string()));
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(SourceSpec::Url(raw.to_string()));
        }
        Err(AcquireError::Invalid(format!(
            "unsupported camera source '{}'; expected an index, stub://, or http(s)://",
            raw
        )))
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Index(index) => write!(f, "{}", index),
            SourceSpec::Stub(url) | SourceSpec::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Camera could not be opened. Surfaced as HTTP 404 on the feed path.
#[derive(Clone, Debug)]
pub enum AcquireError {
    /// The source does not exist or no backend can serve it.
    NotFound(String),
    /// The source string itself is malformed.
    Invalid(String),
    /// A backend exists but failed to connect.
    Backend(String),
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireError::NotFound(msg) => write!(f, "source not found: {}", msg),
            AcquireError::Invalid(msg) => write!(f, "invalid source: {}", msg),
            AcquireError::Backend(msg) => write!(f, "source open failed: {}", msg),
        }
    }
}

impl std::error::Error for AcquireError {}

/// Per-read failure. `EndOfStream` is exhaustion, not an error condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CameraError {
    EndOfStream,
    Read(String),
}

impl std::fmt::Display for CameraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraError::EndOfStream => write!(f, "camera stream exhausted"),
            CameraError::Read(msg) => write!(f, "frame read failed: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

/// Backend capable of producing frames for an acquired source.
pub trait CameraBackend: Send {
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Backend-specific teardown. Called at most once.
    fn close(&mut self) {}
}

/// Counters observable from tests: acquire/read/release totals for every
/// handle the probe is attached to.
#[derive(Debug, Default)]
pub struct CameraProbe {
    pub acquires: AtomicUsize,
    pub reads: AtomicUsize,
    pub releases: AtomicUsize,
}

impl CameraProbe {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquire_count(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Exclusive handle over one open camera source.
///
/// Invariant: between `acquire` and `release` this handle is the only reader
/// of the source. `release` is idempotent and also runs on drop, so the
/// source is freed on every exit path exactly once.
pub struct CameraHandle {
    spec: SourceSpec,
    backend: Option<Box<dyn CameraBackend>>,
    probe: Option<Arc<CameraProbe>>,
}

impl std::fmt::Debug for CameraHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraHandle")
            .field("spec", &self.spec)
            .field("open", &self.backend.is_some())
            .finish()
    }
}

impl CameraHandle {
    pub fn acquire(spec: &SourceSpec) -> Result<Self, AcquireError> {
        Self::acquire_inner(spec, None)
    }

    /// Acquire with attached counters. Test-facing, but harmless in
    /// production: the probe only counts.
    pub fn acquire_with_probe(
        spec: &SourceSpec,
        probe: Arc<CameraProbe>,
    ) -> Result<Self, AcquireError> {
        Self::acquire_inner(spec, Some(probe))
    }

    fn acquire_inner(
        spec: &SourceSpec,
        probe: Option<Arc<CameraProbe>>,
    ) -> Result<Self, AcquireError> {
        let backend: Box<dyn CameraBackend> = match spec {
            SourceSpec::Stub(url) => Box::new(SyntheticSource::open(url)?),
            SourceSpec::Url(url) => Self::open_url(url)?,
            SourceSpec::Index(index) => {
                // No local device backend is compiled into this build.
                return Err(AcquireError::NotFound(format!(
                    "camera index {} (no device backend available)",
                    index
                )));
            }
        };
        if let Some(probe) = &probe {
            probe.acquires.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Self {
            spec: spec.clone(),
            backend: Some(backend),
            probe,
        })
    }

    #[cfg(feature = "camera-http")]
    fn open_url(url: &str) -> Result<Box<dyn CameraBackend>, AcquireError> {
        Ok(Box::new(http::HttpSource::open(url)?))
    }

    #[cfg(not(feature = "camera-http"))]
    fn open_url(url: &str) -> Result<Box<dyn CameraBackend>, AcquireError> {
        Err(AcquireError::NotFound(format!(
            "{} (http sources require the camera-http feature)",
            url
        )))
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Read one frame. Blocking; may fail per-read without invalidating the
    /// handle. Reading a released handle is a caller bug and reports as a
    /// read failure rather than a panic.
    pub fn read(&mut self) -> Result<Frame, CameraError> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| CameraError::Read("handle already released".to_string()))?;
        if let Some(probe) = &self.probe {
            probe.reads.fetch_add(1, Ordering::SeqCst);
        }
        backend.read_frame()
    }

    /// Release the source. Idempotent: only the first call closes the
    /// backend and bumps the probe counter.
    pub fn release(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.close();
            if let Some(probe) = &self.probe {
                probe.releases.fetch_add(1, Ordering::SeqCst);
            }
            log::debug!("camera released: {}", self.spec);
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_index_stub_and_url() {
        assert_eq!(SourceSpec::parse("2").unwrap(), SourceSpec::Index(2));
        assert_eq!(
            SourceSpec::parse("stub://bench").unwrap(),
            SourceSpec::Stub("stub://bench".to_string())
        );
        assert_eq!(
            SourceSpec::parse("http://cam.local/stream").unwrap(),
            SourceSpec::Url("http://cam.local/stream".to_string())
        );
        assert!(SourceSpec::parse("").is_err());
        assert!(SourceSpec::parse("rtsp://nope").is_err());
    }

    #[test]
    fn index_without_device_backend_is_not_found() {
        let err = CameraHandle::acquire(&SourceSpec::Index(99)).unwrap_err();
        assert!(matches!(err, AcquireError::NotFound(_)));
    }

    #[test]
    fn release_is_idempotent_and_runs_on_drop() {
        let probe = CameraProbe::shared();
        let spec = SourceSpec::parse("stub://bench").unwrap();
        let mut handle = CameraHandle::acquire_with_probe(&spec, probe.clone()).unwrap();
        assert!(handle.is_open());
        handle.read().unwrap();
        handle.release();
        handle.release();
        assert!(!handle.is_open());
        assert_eq!(probe.release_count(), 1);
        assert!(handle.read().is_err());
        drop(handle);
        assert_eq!(probe.release_count(), 1);
        assert_eq!(probe.read_count(), 1);
    }
}
