//! Class display styles: per-class colors and names.
//!
//! Classes 0..=4 use the fixed palette the annotation UI has always shipped
//! with. Unmapped class ids get a deterministic color derived from a hash of
//! the id, so a given class renders the same across runs and processes.

use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Fixed palette for the five known classes (RGB): green, blue, red,
/// yellow, cyan.
const PALETTE: [[u8; 3]; 5] = [
    [0, 255, 0],
    [0, 0, 255],
    [255, 0, 0],
    [255, 255, 0],
    [0, 255, 255],
];

/// Display style resolved for one class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassStyle {
    pub name: String,
    pub color: [u8; 3],
}

/// Resolves class ids to display names and colors.
#[derive(Clone, Debug)]
pub struct StyleMap {
    names: HashMap<u32, String>,
}

impl StyleMap {
    /// Build from an ordered class-name list; index is the class id.
    pub fn new(class_names: &[String]) -> Self {
        let names = class_names
            .iter()
            .enumerate()
            .map(|(id, name)| (id as u32, name.clone()))
            .collect();
        Self { names }
    }

    pub fn resolve(&self, class_id: u32) -> ClassStyle {
        let name = self
            .names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", class_id));
        let color = PALETTE
            .get(class_id as usize)
            .copied()
            .unwrap_or_else(|| fallback_color(class_id));
        ClassStyle { name, color }
    }
}

impl Default for StyleMap {
    fn default() -> Self {
        Self::new(&[
            "Object1".to_string(),
            "Object2".to_string(),
            "Object3".to_string(),
            "Object4".to_string(),
            "Object5".to_string(),
        ])
    }
}

/// Deterministic color for class ids outside the palette. Hash-based so the
/// same id maps to the same color in every run.
fn fallback_color(class_id: u32) -> [u8; 3] {
    let digest = Sha256::digest(class_id.to_le_bytes());
    [digest[0], digest[1], digest[2]]
}
