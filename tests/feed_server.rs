//! Feed server surface: routing, the 404-before-any-chunk guarantee, and
//! the multipart response for a good source.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use detection_session::http::DetectorFactory;
use detection_session::{Detection, Detector, FeedConfig, FeedHandle, FeedServer, StubDetector};

fn spawn_server() -> FeedHandle {
    let cfg = FeedConfig {
        addr: "127.0.0.1:0".to_string(),
        default_source: "stub://bench?frames=2&width=48&height=48".to_string(),
        input_size: (64, 64),
        target_fps: 200,
        ..FeedConfig::default()
    };
    let detectors: DetectorFactory = Arc::new(|| {
        Box::new(StubDetector::fixed(vec![Detection::new(0, 0.9, (4, 4, 30, 30))]))
            as Box<dyn Detector>
    });
    FeedServer::new(cfg, detectors).spawn().expect("spawn feed server")
}

fn request(handle: &FeedHandle, raw: &str) -> String {
    let mut stream = TcpStream::connect(handle.addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    stream.write_all(raw.as_bytes()).expect("send request");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).expect("read response");
    String::from_utf8_lossy(&response).into_owned()
}

#[test]
fn routes_index_feed_and_errors() {
    let handle = spawn_server();

    let index = request(&handle, "GET / HTTP/1.1\r\nHost: t\r\n\r\n");
    assert!(index.starts_with("HTTP/1.1 200 OK"));
    assert!(index.contains("text/html"));
    assert!(index.contains("/video_feed"));

    let missing = request(&handle, "GET /nope HTTP/1.1\r\nHost: t\r\n\r\n");
    assert!(missing.starts_with("HTTP/1.1 404 Not Found"));
    assert!(missing.contains(r#"{"error":"not_found"}"#));

    let post = request(&handle, "POST / HTTP/1.1\r\nHost: t\r\n\r\n");
    assert!(post.starts_with("HTTP/1.1 405 Method Not Allowed"));

    handle.stop().expect("stop server");
}

#[test]
fn unknown_source_gets_404_with_zero_multipart_chunks() {
    let handle = spawn_server();

    let response = request(
        &handle,
        "GET /video_feed?source=stub://missing HTTP/1.1\r\nHost: t\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    assert!(response.contains(r#"{"error":"source_not_found"}"#));
    assert!(!response.contains("--frame"));

    // A device index with no backend behaves the same as a missing source.
    let response = request(
        &handle,
        "GET /video_feed?source=99 HTTP/1.1\r\nHost: t\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    assert!(!response.contains("--frame"));

    handle.stop().expect("stop server");
}

#[test]
fn good_source_streams_multipart_jpeg_parts() {
    let handle = spawn_server();

    let response = request(
        &handle,
        "GET /video_feed?source=stub://cam?frames=2&width=48&height=48 HTTP/1.1\r\nHost: t\r\n\r\n",
    );
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("multipart/x-mixed-replace; boundary=frame"));
    assert_eq!(response.matches("--frame\r\n").count(), 2);
    assert!(response.contains("Content-Type: image/jpeg"));

    handle.stop().expect("stop server");
}

#[test]
fn default_source_is_used_without_a_query() {
    let handle = spawn_server();

    let response = request(&handle, "GET /video_feed HTTP/1.1\r\nHost: t\r\n\r\n");
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("--frame\r\n"));

    handle.stop().expect("stop server");
}
