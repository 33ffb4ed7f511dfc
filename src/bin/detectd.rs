//! detectd - interactive detection session daemon.
//!
//! Runs one detection session driven by single-character commands on stdin:
//! `e` start, `r` stop, `w` toggle display, `s` snapshot, `q` quit.
//! Ctrl-C is equivalent to `q`.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use detection_session::{
    session::LogDisplaySink, ControlEvent, Detection, DetectdConfig, Pipeline, SessionConfig,
    SessionController, SessionState, SourceSpec, StubDetector, StyleMap,
};
use detection_session::snapshot::DirSnapshotWriter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive live object-detection session")]
struct Args {
    /// Camera source: a device index, stub://name, or an http(s) URL.
    #[arg(long, env = "DETECT_SOURCE")]
    source: Option<String>,

    /// Directory snapshots are written to.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Start the session immediately instead of waiting for `e`.
    #[arg(long)]
    autostart: bool,

    /// Install a fixed synthetic detection so annotation is exercised
    /// without a real inference backend.
    #[arg(long)]
    demo_detections: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = DetectdConfig::load()?;
    if let Some(source) = args.source {
        cfg.source = source;
    }
    if let Some(dir) = args.snapshot_dir {
        cfg.snapshot_dir = dir;
    }

    let spec = SourceSpec::parse(&cfg.source)?;
    let mut session_cfg = SessionConfig::new(spec);
    session_cfg.input_size = cfg.detect.input_size;
    session_cfg.confidence_threshold = cfg.detect.confidence_threshold;
    session_cfg.read_retries = cfg.detect.read_retries;

    let detector = if args.demo_detections {
        StubDetector::fixed(vec![Detection::new(0, 0.91, (40, 40, 200, 200))])
    } else {
        StubDetector::new()
    };
    let pipeline = Pipeline::new(Box::new(detector), StyleMap::new(&cfg.detect.class_names));
    let writer = DirSnapshotWriter::new(&cfg.snapshot_dir);
    let mut controller =
        SessionController::new(session_cfg, pipeline, Box::new(LogDisplaySink)).with_writer(Box::new(writer));

    let (event_tx, event_rx) = mpsc::channel::<ControlEvent>();

    let ctrlc_tx = event_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(ControlEvent::Shutdown);
    })?;

    std::thread::spawn(move || read_key_commands(event_tx));

    log::info!("detectd running. source={}", cfg.source);
    log::info!("commands: e=start r=stop w=toggle-display s=snapshot q=quit");

    if args.autostart {
        apply_logged(&mut controller, ControlEvent::Start);
    }

    let pace = Duration::from_millis((1000 / cfg.target_fps.max(1)) as u64);
    loop {
        // Single mutator: all control events and ticks happen on this thread.
        while let Ok(event) = event_rx.try_recv() {
            apply_logged(&mut controller, event);
        }
        if controller.state() == SessionState::Terminal {
            break;
        }
        if let Err(err) = controller.tick() {
            log::error!("tick failed: {}", err);
        }
        std::thread::sleep(pace);
    }

    log::info!("detectd shut down");
    Ok(())
}

fn apply_logged(controller: &mut SessionController, event: ControlEvent) {
    match controller.apply(event) {
        Ok(()) => log::info!("{:?} -> {:?}", event, controller.state()),
        Err(err) => log::warn!("{:?} rejected: {}", event, err),
    }
}

fn read_key_commands(tx: mpsc::Sender<ControlEvent>) {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }
        let event = match line.trim() {
            "e" => ControlEvent::Start,
            "r" => ControlEvent::Stop,
            "w" => ControlEvent::ToggleDisplay,
            "s" => ControlEvent::Snapshot,
            "q" => ControlEvent::Shutdown,
            "" => continue,
            other => {
                log::warn!("unknown command: {}", other);
                continue;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
}
