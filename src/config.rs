use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_SOURCE: &str = "0";
const DEFAULT_FEED_ADDR: &str = "127.0.0.1:8990";
const DEFAULT_CONF_THRESHOLD: f32 = 0.11;
const DEFAULT_INPUT_WIDTH: u32 = 640;
const DEFAULT_INPUT_HEIGHT: u32 = 640;
const DEFAULT_TARGET_FPS: u32 = 10;
const DEFAULT_SNAPSHOT_DIR: &str = "captured_images";

#[derive(Debug, Deserialize, Default)]
struct DetectdConfigFile {
    source: Option<String>,
    snapshot_dir: Option<PathBuf>,
    feed: Option<FeedConfigFile>,
    detect: Option<DetectConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct FeedConfigFile {
    addr: Option<String>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    confidence_threshold: Option<f32>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    class_names: Option<Vec<String>>,
    read_retries: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DetectdConfig {
    pub source: String,
    pub snapshot_dir: PathBuf,
    pub feed_addr: String,
    pub target_fps: u32,
    pub detect: DetectSettings,
}

#[derive(Debug, Clone)]
pub struct DetectSettings {
    pub confidence_threshold: f32,
    pub input_size: (u32, u32),
    pub class_names: Vec<String>,
    pub read_retries: u32,
}

impl DetectdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectdConfigFile) -> Self {
        let source = file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let snapshot_dir = file
            .snapshot_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_DIR));
        let feed_addr = file
            .feed
            .as_ref()
            .and_then(|feed| feed.addr.clone())
            .unwrap_or_else(|| DEFAULT_FEED_ADDR.to_string());
        let target_fps = file
            .feed
            .as_ref()
            .and_then(|feed| feed.target_fps)
            .unwrap_or(DEFAULT_TARGET_FPS);
        let detect = DetectSettings {
            confidence_threshold: file
                .detect
                .as_ref()
                .and_then(|detect| detect.confidence_threshold)
                .unwrap_or(DEFAULT_CONF_THRESHOLD),
            input_size: (
                file.detect
                    .as_ref()
                    .and_then(|detect| detect.input_width)
                    .unwrap_or(DEFAULT_INPUT_WIDTH),
                file.detect
                    .as_ref()
                    .and_then(|detect| detect.input_height)
                    .unwrap_or(DEFAULT_INPUT_HEIGHT),
            ),
            class_names: file
                .detect
                .as_ref()
                .and_then(|detect| detect.class_names.clone())
                .unwrap_or_default(),
            read_retries: file
                .detect
                .and_then(|detect| detect.read_retries)
                .unwrap_or(crate::session::DEFAULT_READ_RETRIES),
        };
        Self {
            source,
            snapshot_dir,
            feed_addr,
            target_fps,
            detect,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("DETECT_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(addr) = std::env::var("DETECT_FEED_ADDR") {
            if !addr.trim().is_empty() {
                self.feed_addr = addr;
            }
        }
        if let Ok(threshold) = std::env::var("DETECT_CONF_THRESHOLD") {
            let threshold: f32 = threshold
                .parse()
                .map_err(|_| anyhow!("DETECT_CONF_THRESHOLD must be a number"))?;
            self.detect.confidence_threshold = threshold;
        }
        if let Ok(names) = std::env::var("DETECT_CLASS_NAMES") {
            let parsed = split_csv(&names);
            if !parsed.is_empty() {
                self.detect.class_names = parsed;
            }
        }
        if let Ok(fps) = std::env::var("DETECT_TARGET_FPS") {
            let fps: u32 = fps
                .parse()
                .map_err(|_| anyhow!("DETECT_TARGET_FPS must be an integer"))?;
            self.target_fps = fps;
        }
        if let Ok(retries) = std::env::var("DETECT_READ_RETRIES") {
            let retries: u32 = retries
                .parse()
                .map_err(|_| anyhow!("DETECT_READ_RETRIES must be an integer"))?;
            self.detect.read_retries = retries;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        crate::camera::SourceSpec::parse(&self.source)?;
        if !(0.0..=1.0).contains(&self.detect.confidence_threshold) {
            return Err(anyhow!("confidence threshold must be within [0, 1]"));
        }
        if self.detect.input_size.0 == 0 || self.detect.input_size.1 == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        if self.target_fps == 0 {
            return Err(anyhow!("target fps must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DetectdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
