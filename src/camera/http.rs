//! HTTP camera source (feature: camera-http).
//!
//! Consumes IP cameras that publish MJPEG multipart streams or single-JPEG
//! snapshot endpoints over HTTP. The content type of the first response
//! decides the mode: `multipart/*` is read as a continuous MJPEG stream,
//! anything else is re-fetched per frame as a snapshot.

use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use crate::camera::{AcquireError, CameraBackend, CameraError};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_TARGET_FPS: u32 = 10;

pub struct HttpSource {
    url: String,
    mode: HttpMode,
    target_fps: u32,
    last_frame_at: Option<Instant>,
    frame_count: u64,
}

enum HttpMode {
    Mjpeg(MjpegReader),
    SingleJpeg,
}

impl HttpSource {
    pub fn open(raw_url: &str) -> Result<Self, AcquireError> {
        let url =
            Url::parse(raw_url).map_err(|e| AcquireError::Invalid(format!("{}: {}", raw_url, e)))?;
        let target_fps = url
            .query_pairs()
            .find(|(key, _)| key == "fps")
            .and_then(|(_, value)| value.parse().ok())
            .unwrap_or(DEFAULT_TARGET_FPS);

        let response = ureq::get(raw_url)
            .call()
            .map_err(|e| AcquireError::NotFound(format!("{}: {}", raw_url, e)))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        let mode = if content_type.contains("multipart") {
            HttpMode::Mjpeg(MjpegReader::new(Box::new(response.into_reader())))
        } else {
            HttpMode::SingleJpeg
        };
        log::info!("camera opened: {} (http)", raw_url);
        Ok(Self {
            url: raw_url.to_string(),
            mode,
            target_fps,
            last_frame_at: None,
            frame_count: 0,
        })
    }
}

impl CameraBackend for HttpSource {
    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let min_interval = frame_interval(self.target_fps);
        loop {
            let jpeg_bytes = match &mut self.mode {
                HttpMode::Mjpeg(reader) => reader.read_next_jpeg()?,
                HttpMode::SingleJpeg => fetch_single_jpeg(&self.url)?,
            };

            // Decimate to the target rate; extra frames are discarded.
            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let image = image::load_from_memory(&jpeg_bytes)
                .map_err(|e| CameraError::Read(format!("jpeg decode: {}", e)))?;
            self.frame_count += 1;
            self.last_frame_at = Some(now);
            return Ok(Frame::from_image(image.into_rgb8()));
        }
    }

    fn close(&mut self) {
        log::debug!(
            "camera closed: {} after {} frames",
            self.url,
            self.frame_count
        );
    }
}

/// Incremental MJPEG part scanner over a byte stream. Frames are located by
/// their SOI/EOI markers rather than the multipart boundary, which tolerates
/// the boundary token variations seen across camera firmwares.
struct MjpegReader {
    reader: Box<dyn Read + Send + Sync + 'static>,
    buffer: Vec<u8>,
}

impl MjpegReader {
    fn new(reader: Box<dyn Read + Send + Sync + 'static>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>, CameraError> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self
                .reader
                .read(&mut chunk)
                .map_err(|e| CameraError::Read(format!("mjpeg read: {}", e)))?;
            if read == 0 {
                return Err(CameraError::EndOfStream);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>, CameraError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| CameraError::Read(format!("snapshot fetch {}: {}", url, e)))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| CameraError::Read(format!("snapshot read: {}", e)))?;
    if bytes.is_empty() {
        return Err(CameraError::Read("empty jpeg snapshot".to_string()));
    }
    Ok(bytes)
}

fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_bounds_found_across_boundary_noise() {
        let mut buffer = b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        buffer.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        buffer.extend_from_slice(b"\r\n--boundary");
        let (start, end) = find_jpeg_bounds(&buffer).unwrap();
        assert_eq!(&buffer[start..start + 2], &[0xFF, 0xD8]);
        assert_eq!(&buffer[end - 2..end], &[0xFF, 0xD9]);
    }

    #[test]
    fn incomplete_jpeg_yields_nothing() {
        assert!(find_jpeg_bounds(&[0xFF, 0xD8, 1, 2, 3]).is_none());
    }
}
