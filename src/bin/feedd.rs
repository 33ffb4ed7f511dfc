//! feedd - MJPEG detection feed server.
//!
//! Serves `GET /video_feed?source=<spec>` as a multipart JPEG stream with
//! detection annotations, plus a static viewer page at `/`. Runs until
//! Ctrl-C.

use anyhow::Result;
use clap::Parser;
use std::sync::mpsc;
use std::sync::Arc;

use detection_session::{
    Detection, DetectdConfig, FeedConfig, FeedServer, StubDetector,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "HTTP MJPEG detection feed server")]
struct Args {
    /// Listen address, e.g. 127.0.0.1:8990.
    #[arg(long, env = "DETECT_FEED_ADDR")]
    addr: Option<String>,

    /// Source used when a request carries no `source` parameter.
    #[arg(long, env = "DETECT_SOURCE")]
    source: Option<String>,

    /// Install a fixed synthetic detection so annotation is exercised
    /// without a real inference backend.
    #[arg(long)]
    demo_detections: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = DetectdConfig::load()?;

    let feed_cfg = FeedConfig {
        addr: args.addr.unwrap_or(cfg.feed_addr),
        default_source: args.source.unwrap_or(cfg.source),
        input_size: cfg.detect.input_size,
        confidence_threshold: cfg.detect.confidence_threshold,
        class_names: cfg.detect.class_names,
        read_retries: cfg.detect.read_retries,
        target_fps: cfg.target_fps,
    };

    let demo = args.demo_detections;
    let detectors: detection_session::http::DetectorFactory =
        Arc::new(move || -> Box<dyn detection_session::Detector> {
            if demo {
                Box::new(StubDetector::fixed(vec![Detection::new(
                    0,
                    0.91,
                    (40, 40, 200, 200),
                )]))
            } else {
                Box::new(StubDetector::new())
            }
        });

    let handle = FeedServer::new(feed_cfg, detectors).spawn()?;
    log::info!("feed server listening on http://{}", handle.addr);

    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;
    let _ = stop_rx.recv();

    log::info!("shutting down feed server");
    handle.stop()?;
    Ok(())
}
