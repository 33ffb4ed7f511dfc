//! HTTP surface for the MJPEG feed.
//!
//! `GET /video_feed?source=<spec>` streams multipart JPEG frames; the camera
//! is acquired before the response status is written, so a bad source gets a
//! clean 404 with zero multipart chunks. `GET /` serves a static viewer
//! page. Each feed connection runs on its own thread with its own camera
//! handle and detection session; client disconnect tears both down.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::camera::SourceSpec;
use crate::detect::{Detector, StyleMap};
use crate::mjpeg::{MjpegStream, CONTENT_TYPE};
use crate::pipeline::Pipeline;
use crate::session::{LogDisplaySink, SessionConfig, SessionController};

const MAX_REQUEST_BYTES: usize = 8192;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head><title>Live Detection Feed</title></head>
  <body>
    <h1>Live Detection Feed</h1>
    <img src="/video_feed" alt="video feed">
  </body>
</html>
"#;

/// Builds one detector per feed connection.
pub type DetectorFactory = Arc<dyn Fn() -> Box<dyn Detector> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct FeedConfig {
    pub addr: String,
    /// Source used when the request carries no `source` parameter.
    pub default_source: String,
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    pub class_names: Vec<String>,
    pub read_retries: u32,
    /// Streaming pace; chunks are spaced to roughly this rate.
    pub target_fps: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8990".to_string(),
            default_source: "0".to_string(),
            input_size: (640, 640),
            confidence_threshold: 0.11,
            class_names: Vec::new(),
            read_retries: crate::session::DEFAULT_READ_RETRIES,
            target_fps: 10,
        }
    }
}

#[derive(Debug)]
pub struct FeedHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("feed server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct FeedServer {
    cfg: FeedConfig,
    detectors: DetectorFactory,
}

impl FeedServer {
    pub fn new(cfg: FeedConfig, detectors: DetectorFactory) -> Self {
        Self { cfg, detectors }
    }

    pub fn spawn(self) -> Result<FeedHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg.clone();
        let detectors = self.detectors.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_server(listener, cfg, detectors, shutdown_thread) {
                log::error!("feed server stopped: {}", err);
            }
        });

        Ok(FeedHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(
    listener: TcpListener,
    cfg: FeedConfig,
    detectors: DetectorFactory,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let cfg = cfg.clone();
                let detectors = detectors.clone();
                let shutdown = shutdown.clone();
                // One thread per connection; feed streams are long-lived and
                // must not block the accept loop.
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &cfg, &detectors, &shutdown) {
                        log::warn!("feed request from {} failed: {}", peer, err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &FeedConfig,
    detectors: &DetectorFactory,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }
    if request.path == "/" {
        write_response(&mut stream, 200, "text/html", INDEX_HTML.as_bytes())
    } else if request.path == "/video_feed" {
        serve_video_feed(stream, request, cfg, detectors, shutdown)
    } else {
        write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)
    }
}

fn serve_video_feed(
    mut stream: TcpStream,
    request: HttpRequest,
    cfg: &FeedConfig,
    detectors: &DetectorFactory,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    let raw_source = request
        .source_param()
        .unwrap_or_else(|| cfg.default_source.clone());

    let spec = match SourceSpec::parse(&raw_source) {
        Ok(spec) => spec,
        Err(err) => {
            log::warn!("feed rejected: {}", err);
            return write_json_response(&mut stream, 404, r#"{"error":"source_not_found"}"#);
        }
    };

    let mut session_cfg = SessionConfig::new(spec);
    session_cfg.input_size = cfg.input_size;
    session_cfg.confidence_threshold = cfg.confidence_threshold;
    session_cfg.read_retries = cfg.read_retries;
    let pipeline = Pipeline::new((detectors)(), StyleMap::new(&cfg.class_names));
    let controller = SessionController::new(session_cfg, pipeline, Box::new(LogDisplaySink));

    // Acquire before committing to a status line: a bad source must produce
    // a 404 and zero multipart chunks.
    let feed = match MjpegStream::open(controller) {
        Ok(feed) => feed,
        Err(err) => {
            log::warn!("feed rejected: {}", err);
            return write_json_response(&mut stream, 404, r#"{"error":"source_not_found"}"#);
        }
    };

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        CONTENT_TYPE
    );
    stream.write_all(header.as_bytes())?;

    log::info!("feed stream opened: source={}", raw_source);
    let pace = frame_interval(cfg.target_fps);
    for chunk in feed {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                log::warn!("feed stream error: {}", err);
                break;
            }
        };
        if stream.write_all(&chunk).is_err() {
            // Client gone: normal cancellation. Dropping the stream below
            // releases the camera.
            log::info!("feed client disconnected");
            break;
        }
        std::thread::sleep(pace);
    }
    log::info!("feed stream closed: source={}", raw_source);
    Ok(())
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(raw_path)
        .to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        raw_path: raw_path.to_string(),
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    raw_path: String,
}

impl HttpRequest {
    /// Value of the `source` query parameter. It is the only parameter the
    /// feed accepts, so the whole query after `source=` is the value; stub
    /// sources may themselves contain `?` and `&`.
    fn source_param(&self) -> Option<String> {
        let query = self.raw_path.split_once('?').map(|(_, query)| query)?;
        query.strip_prefix("source=").map(|value| value.to_string())
    }
}

fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}
