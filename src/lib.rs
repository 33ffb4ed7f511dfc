//! detection-session: a live object-detection session kernel.
//!
//! The crate wires four pieces together:
//! - [`camera`]: exclusive frame-read handles over device, stub, and HTTP
//!   sources.
//! - [`pipeline`]: resize, detect, and annotate a single frame.
//! - [`session`]: the controller state machine that owns the camera handle
//!   and reacts to control events.
//! - [`mjpeg`] and [`http`]: the multipart streaming transport and the feed
//!   server built on it.
//!
//! Two binaries ship with the crate: `detectd` runs an interactive session
//! driven by stdin key commands, and `feedd` serves MJPEG streams over HTTP.

pub mod camera;
pub mod config;
pub mod detect;
pub mod frame;
pub mod http;
pub mod mjpeg;
pub mod pipeline;
pub mod session;
pub mod snapshot;

pub use camera::{AcquireError, CameraError, CameraHandle, CameraProbe, SourceSpec};
pub use config::DetectdConfig;
pub use detect::{Detection, Detector, DetectorError, StubDetector, StyleMap};
pub use frame::Frame;
pub use http::{FeedConfig, FeedHandle, FeedServer};
pub use mjpeg::MjpegStream;
pub use pipeline::{AnnotatedFrame, Pipeline};
pub use session::{ControlEvent, SessionConfig, SessionController, SessionState};
pub use snapshot::{DirSnapshotWriter, FrameWriter};
