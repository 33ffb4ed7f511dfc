//! Snapshot persistence.
//!
//! The session kernel never touches the filesystem directly; frames go
//! through a `FrameWriter`. The shipped implementation writes JPEGs into a
//! directory with timestamped names (`image_YYYYmmdd_HHMMSS.jpg`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::frame::Frame;

pub trait FrameWriter: Send {
    /// Persist one frame; returns a human-readable location for logging.
    fn write(&mut self, frame: &Frame) -> Result<String>;
}

/// Writes `image_<timestamp>.jpg` files into a directory, creating it on
/// first use. A counter suffix keeps same-second snapshots distinct.
pub struct DirSnapshotWriter {
    dir: PathBuf,
    written: u64,
}

impl DirSnapshotWriter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            written: 0,
        }
    }

    fn next_path(&mut self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let name = if self.written == 0 {
            format!("image_{}.jpg", stamp)
        } else {
            format!("image_{}_{}.jpg", stamp, self.written)
        };
        self.dir.join(name)
    }
}

impl FrameWriter for DirSnapshotWriter {
    fn write(&mut self, frame: &Frame) -> Result<String> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create snapshot dir {}", self.dir.display()))?;
        let path = self.next_path();
        let jpeg = frame.encode_jpeg()?;
        std::fs::write(&path, jpeg)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        self.written += 1;
        Ok(path.display().to_string())
    }
}
