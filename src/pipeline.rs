//! Frame processing pipeline: resize, detect, annotate.
//!
//! `Pipeline::process` is one detection cycle: the raw frame is resized to
//! the detector's fixed input size (aspect ratio is not preserved), the
//! detector runs at the configured confidence threshold, and each detection
//! is drawn onto a copy of the resized frame as a class-colored rectangle
//! with a `"<name>: <confidence>"` label just above its top-left corner.
//!
//! Detector errors propagate to the caller; `resize_only` is the degraded
//! path the session controller falls back to for that tick.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detect::{Detection, Detector, DetectorError, StyleMap};
use crate::frame::Frame;

/// Pixel gap between a box's top edge and its label.
const LABEL_GAP: i32 = 2;
/// Rectangle stroke width, matching the original overlay thickness.
const BOX_STROKE: i32 = 2;

pub const GLYPH_WIDTH: i32 = 6;
pub const GLYPH_HEIGHT: i32 = 7;

/// Label rendered onto a frame: the exact text and its top-left anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawnLabel {
    pub text: String,
    pub anchor: (i32, i32),
}

/// One annotated detection cycle's output. Transient: consumed by whichever
/// sinks are active, then discarded.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub labels: Vec<DrawnLabel>,
}

impl AnnotatedFrame {
    /// Unannotated output for a tick whose detection failed.
    pub fn unannotated(frame: Frame) -> Self {
        Self {
            frame,
            detections: Vec::new(),
            labels: Vec::new(),
        }
    }
}

pub struct Pipeline {
    detector: Box<dyn Detector>,
    styles: StyleMap,
}

impl Pipeline {
    pub fn new(detector: Box<dyn Detector>, styles: StyleMap) -> Self {
        Self { detector, styles }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Give the backend a chance to initialize before the first frame.
    pub fn warm_up(&mut self) -> Result<(), DetectorError> {
        self.detector.warm_up()
    }

    /// Resize to the detector input contract. No aspect preservation.
    pub fn resize_only(frame: &Frame, target: (u32, u32)) -> Frame {
        if (frame.width, frame.height) == target {
            return frame.clone();
        }
        let image = frame
            .clone()
            .into_image()
            .expect("frame buffer validated at construction");
        let resized = image::imageops::resize(
            &image,
            target.0,
            target.1,
            image::imageops::FilterType::Triangle,
        );
        Frame::from_image(resized)
    }

    /// One full cycle: resize, detect, annotate. Detector failures propagate
    /// so the caller can degrade the tick.
    pub fn process(
        &mut self,
        frame: &Frame,
        target: (u32, u32),
        confidence_threshold: f32,
    ) -> Result<AnnotatedFrame, DetectorError> {
        let resized = Self::resize_only(frame, target);
        let detections = self
            .detector
            .detect(&resized, confidence_threshold, target)?;

        let mut image = resized
            .into_image()
            .expect("resized buffer matches target dimensions");
        let mut labels = Vec::with_capacity(detections.len());
        for detection in &detections {
            let style = self.styles.resolve(detection.class_id);
            draw_box(&mut image, detection.bbox, style.color);
            let text = format!("{}: {:.2}", style.name, detection.confidence);
            let anchor = label_anchor(&text, detection.bbox, target);
            draw_label(&mut image, &text, anchor, style.color);
            labels.push(DrawnLabel { text, anchor });
        }

        Ok(AnnotatedFrame {
            frame: Frame::from_image(image),
            detections,
            labels,
        })
    }
}

fn draw_box(image: &mut RgbImage, bbox: (i32, i32, i32, i32), color: [u8; 3]) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let (x1, y1, x2, y2) = bbox;
    let x1 = x1.clamp(0, width - 1);
    let y1 = y1.clamp(0, height - 1);
    let x2 = x2.clamp(0, width);
    let y2 = y2.clamp(0, height);
    if x2 <= x1 + 1 || y2 <= y1 + 1 {
        return;
    }
    for inset in 0..BOX_STROKE {
        let w = (x2 - x1) - 2 * inset;
        let h = (y2 - y1) - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, Rgb(color));
    }
}

/// Label top-left: just above the box's top-left corner, clamped inside the
/// frame on both axes.
fn label_anchor(text: &str, bbox: (i32, i32, i32, i32), target: (u32, u32)) -> (i32, i32) {
    let text_width = text.chars().count() as i32 * GLYPH_WIDTH;
    let max_x = (target.0 as i32 - text_width).max(0);
    let max_y = (target.1 as i32 - GLYPH_HEIGHT).max(0);
    let x = bbox.0.clamp(0, max_x);
    let y = (bbox.1 - GLYPH_HEIGHT - LABEL_GAP).clamp(0, max_y);
    (x, y)
}

fn draw_label(image: &mut RgbImage, text: &str, anchor: (i32, i32), color: [u8; 3]) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let mut x = anchor.0;
    for ch in text.chars() {
        let glyph = glyph_rows(ch);
        for (row, bits) in glyph.iter().enumerate() {
            let py = anchor.1 + row as i32;
            if py < 0 || py >= height {
                continue;
            }
            for col in 0..5 {
                if (bits >> (4 - col)) & 1 == 1 {
                    let px = x + col;
                    if px >= 0 && px < width {
                        image.put_pixel(px as u32, py as u32, Rgb(color));
                    }
                }
            }
        }
        x += GLYPH_WIDTH;
        if x >= width {
            break;
        }
    }
}

/// 5x7 bitmap glyphs. Lowercase renders with the uppercase shape; characters
/// without a glyph advance without drawing.
fn glyph_rows(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0E],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        ':' => [0x00, 0x04, 0x00, 0x00, 0x00, 0x04, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        _ => [0; 7],
    }
}
