//! Session controller lifecycle conformance.
//!
//! Exercises every (state, event) pair observable through the public API and
//! checks the state/handle invariant after each step: a handle exists exactly
//! in the camera-holding states.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use detection_session::camera::CameraProbe;
use detection_session::detect::DetectorError;
use detection_session::session::{DisplaySink, LogDisplaySink};
use detection_session::{
    AnnotatedFrame, ControlEvent, Detection, Pipeline, SessionConfig, SessionController,
    SessionState, SourceSpec, StubDetector, StyleMap,
};

const SOURCE: &str = "stub://bench?width=32&height=32";

fn build(source: &str, detector: StubDetector) -> (SessionController, Arc<CameraProbe>) {
    let probe = CameraProbe::shared();
    let config = SessionConfig::new(SourceSpec::parse(source).expect("source spec"));
    let pipeline = Pipeline::new(Box::new(detector), StyleMap::default());
    let controller = SessionController::new(config, pipeline, Box::new(LogDisplaySink))
        .with_probe(probe.clone());
    (controller, probe)
}

fn running(source: &str) -> (SessionController, Arc<CameraProbe>) {
    let detector = StubDetector::fixed(vec![Detection::new(0, 0.9, (5, 5, 20, 20))]);
    let (mut controller, probe) = build(source, detector);
    controller.apply(ControlEvent::Start).expect("start");
    (controller, probe)
}

fn assert_invariant(controller: &SessionController) {
    assert_eq!(
        controller.handle_exists(),
        controller.state().holds_camera(),
        "handle existence must track state {:?}",
        controller.state()
    );
}

#[test]
fn stopped_ignores_stop_toggle_and_snapshot() {
    let (mut c, probe) = build(SOURCE, StubDetector::new());
    for event in [
        ControlEvent::Stop,
        ControlEvent::ToggleDisplay,
        ControlEvent::Snapshot,
    ] {
        c.apply(event).expect("no-op event");
        assert_eq!(c.state(), SessionState::Stopped);
        assert_invariant(&c);
    }
    assert_eq!(probe.acquire_count(), 0);
}

#[test]
fn start_from_stopped_enters_running_hidden() {
    let (mut c, probe) = build(SOURCE, StubDetector::new());
    c.apply(ControlEvent::Start).expect("start");
    assert_eq!(c.state(), SessionState::RunningHidden);
    assert_eq!(probe.acquire_count(), 1);
    assert_invariant(&c);
}

#[test]
fn visible_on_start_enters_running_visible() {
    let probe = CameraProbe::shared();
    let mut config = SessionConfig::new(SourceSpec::parse(SOURCE).expect("source spec"));
    config.visible_on_start = true;
    let pipeline = Pipeline::new(Box::new(StubDetector::new()), StyleMap::default());
    let mut c = SessionController::new(config, pipeline, Box::new(LogDisplaySink))
        .with_probe(probe.clone());
    c.apply(ControlEvent::Start).expect("start");
    assert_eq!(c.state(), SessionState::RunningVisible);
    assert_invariant(&c);
}

#[test]
fn start_while_running_does_not_reacquire() {
    let (mut c, probe) = running(SOURCE);
    c.apply(ControlEvent::Start).expect("redundant start");
    assert_eq!(c.state(), SessionState::RunningHidden);
    assert_eq!(probe.acquire_count(), 1);
    assert_invariant(&c);
}

#[test]
fn toggle_display_flips_between_running_states() {
    let (mut c, _probe) = running(SOURCE);
    c.apply(ControlEvent::ToggleDisplay).expect("toggle on");
    assert_eq!(c.state(), SessionState::RunningVisible);
    c.apply(ControlEvent::ToggleDisplay).expect("toggle off");
    assert_eq!(c.state(), SessionState::RunningHidden);
    assert_invariant(&c);
}

struct CountingSink {
    shown: Arc<AtomicUsize>,
    teardowns: Arc<AtomicUsize>,
}

impl DisplaySink for CountingSink {
    fn show(&mut self, _frame: &AnnotatedFrame) -> anyhow::Result<()> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn teardown(&mut self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn stop_from_visible_tears_down_the_display() {
    let shown = Arc::new(AtomicUsize::new(0));
    let teardowns = Arc::new(AtomicUsize::new(0));
    let sink = CountingSink {
        shown: shown.clone(),
        teardowns: teardowns.clone(),
    };

    let mut config = SessionConfig::new(SourceSpec::parse(SOURCE).expect("source spec"));
    config.visible_on_start = true;
    let pipeline = Pipeline::new(Box::new(StubDetector::new()), StyleMap::default());
    let mut c = SessionController::new(config, pipeline, Box::new(sink));

    c.apply(ControlEvent::Start).expect("start");
    c.tick().expect("tick").expect("frame");
    assert_eq!(shown.load(Ordering::SeqCst), 1);

    c.apply(ControlEvent::Stop).expect("stop");
    assert_eq!(c.state(), SessionState::Stopped);
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    // A second stop must not tear down again.
    c.apply(ControlEvent::Stop).expect("second stop");
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
}

#[test]
fn toggling_display_off_tears_down_and_stops_showing() {
    let shown = Arc::new(AtomicUsize::new(0));
    let teardowns = Arc::new(AtomicUsize::new(0));
    let sink = CountingSink {
        shown: shown.clone(),
        teardowns: teardowns.clone(),
    };

    let config = SessionConfig::new(SourceSpec::parse(SOURCE).expect("source spec"));
    let pipeline = Pipeline::new(Box::new(StubDetector::new()), StyleMap::default());
    let mut c = SessionController::new(config, pipeline, Box::new(sink));

    c.apply(ControlEvent::Start).expect("start");
    c.tick().expect("tick").expect("frame");
    assert_eq!(shown.load(Ordering::SeqCst), 0);

    c.apply(ControlEvent::ToggleDisplay).expect("toggle on");
    c.tick().expect("tick").expect("frame");
    assert_eq!(shown.load(Ordering::SeqCst), 1);

    c.apply(ControlEvent::ToggleDisplay).expect("toggle off");
    assert_eq!(teardowns.load(Ordering::SeqCst), 1);
    c.tick().expect("tick").expect("frame");
    assert_eq!(shown.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_releases_exactly_once_and_is_idempotent() {
    let (mut c, probe) = running(SOURCE);
    c.apply(ControlEvent::Stop).expect("stop");
    c.apply(ControlEvent::Stop).expect("second stop");
    c.apply(ControlEvent::Stop).expect("third stop");
    assert_eq!(c.state(), SessionState::Stopped);
    assert_eq!(probe.release_count(), 1);
    assert_invariant(&c);
}

#[test]
fn session_can_restart_after_stop() {
    let (mut c, probe) = running(SOURCE);
    c.apply(ControlEvent::Stop).expect("stop");
    c.apply(ControlEvent::Start).expect("restart");
    assert_eq!(c.state(), SessionState::RunningHidden);
    assert_eq!(probe.acquire_count(), 2);
    assert_eq!(probe.release_count(), 1);
    assert_invariant(&c);
}

#[test]
fn shutdown_from_running_releases_and_terminates() {
    let (mut c, probe) = running(SOURCE);
    c.apply(ControlEvent::Shutdown).expect("shutdown");
    assert_eq!(c.state(), SessionState::Terminal);
    assert_eq!(probe.release_count(), 1);
    assert_invariant(&c);
}

#[test]
fn shutdown_from_stopped_terminates_without_release() {
    let (mut c, probe) = build(SOURCE, StubDetector::new());
    c.apply(ControlEvent::Shutdown).expect("shutdown");
    assert_eq!(c.state(), SessionState::Terminal);
    assert_eq!(probe.acquire_count(), 0);
    assert_eq!(probe.release_count(), 0);
    assert_invariant(&c);
}

#[test]
fn terminal_ignores_every_event() {
    let (mut c, probe) = running(SOURCE);
    c.apply(ControlEvent::Shutdown).expect("shutdown");
    for event in [
        ControlEvent::Start,
        ControlEvent::Stop,
        ControlEvent::ToggleDisplay,
        ControlEvent::Snapshot,
        ControlEvent::Shutdown,
    ] {
        c.apply(event).expect("terminal no-op");
        assert_eq!(c.state(), SessionState::Terminal);
        assert_invariant(&c);
    }
    assert_eq!(probe.acquire_count(), 1);
    assert_eq!(probe.release_count(), 1);
    assert!(c.tick().expect("tick after shutdown").is_none());
    assert_eq!(probe.read_count(), 0);
}

#[test]
fn failed_start_leaves_session_restartable() {
    let (mut c, probe) = build("stub://missing", StubDetector::new());
    assert!(c.apply(ControlEvent::Start).is_err());
    assert_eq!(c.state(), SessionState::Stopped);
    assert_eq!(probe.release_count(), 0);
    assert_invariant(&c);
    // A later start against the same controller is a fresh attempt.
    assert!(c.apply(ControlEvent::Start).is_err());
    assert_eq!(c.state(), SessionState::Stopped);
}

#[test]
fn detector_failure_degrades_one_tick_not_the_session() {
    let mut detector = StubDetector::fixed(vec![Detection::new(0, 0.9, (5, 5, 20, 20))]);
    detector.push_outcome(Err(DetectorError::Inference("backend hiccup".into())));
    let (mut c, _probe) = build(SOURCE, detector);
    c.apply(ControlEvent::Start).expect("start");

    let degraded = c.tick().expect("tick").expect("frame");
    assert!(degraded.detections.is_empty());
    assert!(degraded.labels.is_empty());
    assert!(c.state().is_running());

    let recovered = c.tick().expect("tick").expect("frame");
    assert_eq!(recovered.detections.len(), 1);
    assert!(c.state().is_running());
}

#[test]
fn read_retry_exhaustion_forces_stop_with_single_release() {
    // Every read fails from the first one onward.
    let source = "stub://bench?fail_from=1&width=32&height=32";
    let (mut c, probe) = running(source);
    assert!(c.tick().expect("tick").is_none());
    assert_eq!(c.state(), SessionState::Stopped);
    assert_eq!(probe.release_count(), 1);
    assert_invariant(&c);
}

#[test]
fn dropping_a_running_controller_releases_the_camera() {
    let probe = {
        let (c, probe) = running(SOURCE);
        drop(c);
        probe
    };
    assert_eq!(probe.release_count(), 1);
}
