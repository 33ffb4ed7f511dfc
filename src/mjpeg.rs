//! MJPEG multipart streaming transport.
//!
//! Each streamed element is a JPEG wrapped in a multipart boundary segment:
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n\r\n
//! <jpeg bytes>\r\n
//! ```
//!
//! under a `multipart/x-mixed-replace; boundary=frame` response. The
//! sequence is infinite and not restartable; a reconnecting client gets a
//! fresh sequence. `MjpegStream` wraps a session controller as a lazy,
//! cancellable iterator whose drop path guarantees the camera release runs
//! on every exit: completion, error, or cancellation.

use anyhow::Result;

use crate::camera::AcquireError;
use crate::session::{ControlEvent, SessionController, SessionState};

/// Multipart boundary token, also declared in the HTTP Content-Type header.
pub const BOUNDARY: &str = "frame";

/// Value for the HTTP `Content-Type` response header.
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Wrap one encoded JPEG in its boundary segment.
pub fn encode_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Lazy sequence of multipart chunks over a running detection session.
///
/// `open` acquires the camera up front, so no chunk is ever emitted for a
/// source that cannot be opened. Iteration ends when the camera reports
/// exhaustion or exhausts its read retries; dropping the stream mid-flight
/// (client disconnect, server shutdown) releases the camera just the same.
pub struct MjpegStream {
    controller: SessionController,
    finished: bool,
}

impl MjpegStream {
    /// Start streaming from a prepared controller. Fails before any chunk
    /// if the camera cannot be acquired.
    pub fn open(mut controller: SessionController) -> Result<Self, AcquireError> {
        if let Err(err) = controller.apply(ControlEvent::Start) {
            return Err(match err.downcast::<AcquireError>() {
                Ok(acquire) => acquire,
                Err(other) => AcquireError::Backend(other.to_string()),
            });
        }
        Ok(Self {
            controller,
            finished: false,
        })
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            let _ = self.controller.apply(ControlEvent::Shutdown);
        }
    }
}

impl Iterator for MjpegStream {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let annotated = match self.controller.tick() {
            Ok(Some(annotated)) => annotated,
            Ok(None) => {
                // Camera exhausted or session force-stopped.
                self.finish();
                return None;
            }
            Err(err) => {
                self.finish();
                return Some(Err(err));
            }
        };
        match annotated.frame.encode_jpeg() {
            Ok(jpeg) => Some(Ok(encode_part(&jpeg))),
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl Drop for MjpegStream {
    fn drop(&mut self) {
        // Cancellation path: release must fire even if the consumer never
        // drained the iterator.
        self.finish();
        debug_assert!(!self.controller.state().holds_camera());
        debug_assert!(matches!(self.controller.state(), SessionState::Terminal));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_framing_matches_wire_format() {
        let part = encode_part(b"JPEGDATA");
        let expected_prefix = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(part.starts_with(expected_prefix));
        assert!(part.ends_with(b"JPEGDATA\r\n"));
    }

    #[test]
    fn content_type_declares_the_boundary() {
        assert_eq!(CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame");
    }
}
