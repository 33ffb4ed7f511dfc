//! Detection session controller.
//!
//! The controller is the explicit owner of the camera lifecycle: it holds
//! zero-or-one `CameraHandle`, mutates `SessionState` in response to control
//! events, and drives the read / process / emit tick while a session runs.
//! All mutation happens through `apply` and `tick` on one thread; control
//! events from other threads go through an event queue consumed by that
//! thread, so a `stop` can never interleave with an in-flight read on the
//! handle it is about to release.
//!
//! State/handle invariant, checked after every event and tick:
//! `handle_exists() == state ∈ {Acquiring, RunningHidden, RunningVisible}`.

use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::camera::{CameraError, CameraHandle, CameraProbe, SourceSpec};
use crate::pipeline::{AnnotatedFrame, Pipeline};
use crate::snapshot::FrameWriter;

/// Default bound on consecutive failed reads before the session force-stops.
pub const DEFAULT_READ_RETRIES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Stopped,
    /// Camera acquisition in progress. Collapses to a running state within
    /// the same `start` call; exists so a stop observed mid-acquire wins.
    Acquiring,
    RunningHidden,
    RunningVisible,
    /// Post-shutdown. Every further event is a no-op.
    Terminal,
}

impl SessionState {
    pub fn is_running(self) -> bool {
        matches!(self, SessionState::RunningHidden | SessionState::RunningVisible)
    }

    /// True in every state that owns a camera handle.
    pub fn holds_camera(self) -> bool {
        matches!(
            self,
            SessionState::Acquiring | SessionState::RunningHidden | SessionState::RunningVisible
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlEvent {
    Start,
    Stop,
    ToggleDisplay,
    Snapshot,
    Shutdown,
}

/// Local rendering surface. A real window is an external collaborator; the
/// kernel only needs show/teardown at the boundary.
pub trait DisplaySink: Send {
    fn show(&mut self, frame: &AnnotatedFrame) -> Result<()>;

    /// Called when display is toggled off, on stop, and on shutdown.
    fn teardown(&mut self) {}
}

/// Display sink that logs instead of rendering. Default for headless runs.
pub struct LogDisplaySink;

impl DisplaySink for LogDisplaySink {
    fn show(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        log::debug!(
            "display: {}x{} frame, {} detections",
            frame.frame.width,
            frame.frame.height,
            frame.detections.len()
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub source: SourceSpec,
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    /// Consecutive read failures tolerated before a forced stop.
    pub read_retries: u32,
    /// Whether `start` lands in RunningVisible instead of RunningHidden.
    pub visible_on_start: bool,
}

impl SessionConfig {
    pub fn new(source: SourceSpec) -> Self {
        Self {
            source,
            input_size: (640, 640),
            confidence_threshold: 0.11,
            read_retries: DEFAULT_READ_RETRIES,
            visible_on_start: false,
        }
    }
}

pub struct SessionController {
    config: SessionConfig,
    state: SessionState,
    handle: Option<CameraHandle>,
    pipeline: Pipeline,
    display: Box<dyn DisplaySink>,
    writer: Option<Box<dyn FrameWriter>>,
    last_annotated: Option<AnnotatedFrame>,
    probe: Option<Arc<CameraProbe>>,
}

impl SessionController {
    pub fn new(config: SessionConfig, pipeline: Pipeline, display: Box<dyn DisplaySink>) -> Self {
        Self {
            config,
            state: SessionState::Stopped,
            handle: None,
            pipeline,
            display,
            writer: None,
            last_annotated: None,
            probe: None,
        }
    }

    /// Attach camera counters (tests).
    pub fn with_probe(mut self, probe: Arc<CameraProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Attach a snapshot writer. Without one, `Snapshot` events log and skip.
    pub fn with_writer(mut self, writer: Box<dyn FrameWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn handle_exists(&self) -> bool {
        self.handle.is_some()
    }

    /// Apply one control event. Transitions follow the session table; every
    /// path out of a camera-holding state releases the handle exactly once.
    pub fn apply(&mut self, event: ControlEvent) -> Result<()> {
        if self.state == SessionState::Terminal {
            log::debug!("session terminal; ignoring {:?}", event);
            return Ok(());
        }
        match event {
            ControlEvent::Start => self.start(),
            ControlEvent::Stop => {
                self.stop();
                Ok(())
            }
            ControlEvent::ToggleDisplay => {
                self.toggle_display();
                Ok(())
            }
            ControlEvent::Snapshot => self.snapshot(),
            ControlEvent::Shutdown => {
                self.stop();
                self.state = SessionState::Terminal;
                log::info!("session shut down");
                Ok(())
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Stopped {
            log::debug!("start ignored in {:?}", self.state);
            return Ok(());
        }
        self.state = SessionState::Acquiring;
        let acquired = match &self.probe {
            Some(probe) => CameraHandle::acquire_with_probe(&self.config.source, probe.clone()),
            None => CameraHandle::acquire(&self.config.source),
        };
        match acquired {
            Ok(handle) => {
                self.handle = Some(handle);
                // Warm-up failures degrade later ticks; they do not block
                // the session from starting.
                if let Err(err) = self.pipeline.warm_up() {
                    log::warn!("detector warm-up failed: {}", err);
                }
                self.state = if self.config.visible_on_start {
                    SessionState::RunningVisible
                } else {
                    SessionState::RunningHidden
                };
                log::info!(
                    "session started: source={} detector={} state={:?}",
                    self.config.source,
                    self.pipeline.detector_name(),
                    self.state
                );
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Stopped;
                log::error!("camera acquire failed: {}", err);
                Err(anyhow!(err))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
        if self.state == SessionState::RunningVisible {
            self.display.teardown();
        }
        if self.state != SessionState::Stopped {
            log::info!("session stopped");
        }
        self.state = SessionState::Stopped;
        self.last_annotated = None;
    }

    fn toggle_display(&mut self) {
        match self.state {
            SessionState::RunningHidden => {
                self.state = SessionState::RunningVisible;
                log::info!("display on");
            }
            SessionState::RunningVisible => {
                self.display.teardown();
                self.state = SessionState::RunningHidden;
                log::info!("display off");
            }
            _ => log::debug!("toggle_display ignored in {:?}", self.state),
        }
    }

    fn snapshot(&mut self) -> Result<()> {
        if !self.state.is_running() {
            log::debug!("snapshot ignored in {:?}", self.state);
            return Ok(());
        }
        let Some(annotated) = &self.last_annotated else {
            log::warn!("snapshot skipped: no frame processed yet");
            return Ok(());
        };
        let Some(writer) = &mut self.writer else {
            log::warn!("snapshot skipped: no frame writer configured");
            return Ok(());
        };
        let path = writer.write(&annotated.frame)?;
        log::info!("snapshot saved: {}", path);
        Ok(())
    }

    /// One read / process / emit cycle. No-op unless running. Read failures
    /// are retried up to the configured bound, then force a stop; detector
    /// failures degrade the tick to an unannotated frame.
    pub fn tick(&mut self) -> Result<Option<AnnotatedFrame>> {
        if !self.state.is_running() {
            return Ok(None);
        }

        let frame = match self.read_with_retries() {
            Some(frame) => frame,
            None => {
                // Exhausted or end of stream; the handle was released and the
                // session is back in Stopped.
                return Ok(None);
            }
        };

        let annotated = match self.pipeline.process(
            &frame,
            self.config.input_size,
            self.config.confidence_threshold,
        ) {
            Ok(annotated) => annotated,
            Err(err) => {
                log::warn!("detection failed this tick, emitting unannotated frame: {}", err);
                AnnotatedFrame::unannotated(Pipeline::resize_only(&frame, self.config.input_size))
            }
        };

        if self.state == SessionState::RunningVisible {
            if let Err(err) = self.display.show(&annotated) {
                log::warn!("display sink error: {}", err);
            }
        }

        self.last_annotated = Some(annotated.clone());
        Ok(Some(annotated))
    }

    /// Read one frame with bounded retries. Returns None after forcing a
    /// stop (end of stream or retries exhausted); the state/handle invariant
    /// holds either way.
    fn read_with_retries(&mut self) -> Option<crate::frame::Frame> {
        let mut attempts = 0u32;
        loop {
            let handle = self.handle.as_mut()?;
            match handle.read() {
                Ok(frame) => return Some(frame),
                Err(CameraError::EndOfStream) => {
                    log::info!("camera stream ended");
                    self.stop();
                    return None;
                }
                Err(CameraError::Read(msg)) => {
                    attempts += 1;
                    log::warn!(
                        "frame read failed (attempt {}/{}): {}",
                        attempts,
                        self.config.read_retries,
                        msg
                    );
                    if attempts >= self.config.read_retries {
                        log::error!("read retries exhausted; stopping session");
                        self.stop();
                        return None;
                    }
                }
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        // Process shutdown path: never leak a handle.
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, DetectorError, StubDetector, StyleMap};

    fn controller(source: &str) -> SessionController {
        let config = SessionConfig::new(SourceSpec::parse(source).unwrap());
        let pipeline = Pipeline::new(
            Box::new(StubDetector::fixed(vec![Detection::new(0, 0.9, (5, 5, 20, 20))])),
            StyleMap::default(),
        );
        SessionController::new(config, pipeline, Box::new(LogDisplaySink))
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
    fn start_failure_stays_stopped() {
        let mut c = controller("stub://missing");
        assert!(c.apply(ControlEvent::Start).is_err());
        assert_eq!(c.state(), SessionState::Stopped);
        assert_invariant(&c);
    }

    #[test]
    fn tick_is_noop_when_stopped() {
        let mut c = controller("stub://bench?width=32&height=32");
        assert!(c.tick().unwrap().is_none());
        assert_eq!(c.state(), SessionState::Stopped);
    }

    #[test]
    fn end_of_stream_forces_stop_and_release() {
        let probe = CameraProbe::shared();
        let mut c = controller("stub://bench?frames=1&width=32&height=32")
            .with_probe(probe.clone());
        c.apply(ControlEvent::Start).unwrap();
        assert!(c.tick().unwrap().is_some());
        assert!(c.tick().unwrap().is_none());
        assert_eq!(c.state(), SessionState::Stopped);
        assert_eq!(probe.release_count(), 1);
        assert_invariant(&c);
    }

    #[test]
    fn warm_up_failure_does_not_block_start() {
        let config =
            SessionConfig::new(SourceSpec::parse("stub://bench?width=32&height=32").unwrap());
        let detector = StubDetector::fixed(vec![Detection::new(0, 0.9, (5, 5, 20, 20))])
            .with_warm_up_error(DetectorError::Unavailable("engine offline".to_string()));
        let pipeline = Pipeline::new(Box::new(detector), StyleMap::default());
        let mut c = SessionController::new(config, pipeline, Box::new(LogDisplaySink));
        c.apply(ControlEvent::Start).unwrap();
        assert!(c.state().is_running());
        assert!(c.tick().unwrap().is_some());
    }

    #[test]
    fn single_read_failure_is_retried_within_one_tick() {
        let mut c = controller("stub://bench?fail_read_at=1&width=32&height=32");
        c.apply(ControlEvent::Start).unwrap();
        // First read fails, retry succeeds inside the same tick.
        assert!(c.tick().unwrap().is_some());
        assert!(c.state().is_running());
    }
}
