//! Frame buffer type shared by camera sources, the pipeline, and consumers.
//!
//! A `Frame` is a packed RGB8 buffer plus dimensions. Camera backends produce
//! frames; the pipeline resizes and annotates them; the MJPEG transport and
//! snapshot writer encode them as JPEG.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Packed RGB8 frame. `data.len() == width * height * 3`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer size mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Solid-color frame, used by synthetic sources and tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&rgb);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn into_image(self) -> Result<RgbImage> {
        let (width, height) = (self.width, self.height);
        RgbImage::from_raw(width, height, self.data)
            .ok_or_else(|| anyhow!("frame buffer too small for {}x{}", width, height))
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    /// Encode as JPEG for streaming or snapshot persistence.
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let image = self.clone().into_image()?;
        let mut out = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .map_err(|e| anyhow!("jpeg encode failed: {}", e))?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        assert!(Frame::new(vec![0u8; 10], 4, 4).is_err());
    }

    #[test]
    fn filled_frame_round_trips_through_image() {
        let frame = Frame::filled(8, 6, [10, 20, 30]);
        let image = frame.clone().into_image().unwrap();
        assert_eq!(image.dimensions(), (8, 6));
        assert_eq!(Frame::from_image(image), frame);
    }

    #[test]
    fn jpeg_encode_produces_soi_marker() {
        let jpeg = Frame::filled(16, 16, [0, 0, 0]).encode_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
