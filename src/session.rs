//! Recording session
//!
//! Coordinates one capture: the caller's thread waits on the trigger while a
//! dedicated capture thread performs blocking reads until the stop signal is
//! raised. The stream stays owned by the session for its whole open interval;
//! the capture thread only borrows its reading half, inside a thread scope, so
//! the thread is always joined before the stream is closed and the frames are
//! serialized.

use crate::audio::{self, AudioHost, CaptureStream, CapturedChunk, FrameSource, StreamConfig};
use crate::error::{AudioError, SessionError};
use crate::state::SessionState;
use crate::trigger::Trigger;
use crate::wav::{self, WaveformHeader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Cooperative stop flag shared between the coordinator and the capture thread
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Captured audio, one chunk per hardware read, in capture order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBuffer {
    chunks: Vec<Vec<u8>>,
    overruns: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: CapturedChunk) {
        if chunk.overrun {
            self.overruns += 1;
        }
        self.chunks.push(chunk.data);
    }

    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total payload size in bytes
    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Number of chunks read after the driver dropped samples
    pub fn overruns(&self) -> usize {
        self.overruns
    }

    pub fn into_chunks(self) -> Vec<Vec<u8>> {
        self.chunks
    }
}

/// What the capture thread hands back when it finishes
#[derive(Debug)]
pub struct CaptureOutcome {
    pub frames: FrameBuffer,
    /// The read error that ended the capture early, if any
    pub error: Option<AudioError>,
}

/// Read `frames_per_buffer`-frame chunks from `source` until `stop` is raised,
/// the source ends, or a read fails.
///
/// Stop is checked between reads, so it takes effect within one buffer.
pub fn capture_loop(
    source: &mut dyn FrameSource,
    frames_per_buffer: usize,
    stop: &StopSignal,
) -> CaptureOutcome {
    let mut frames = FrameBuffer::new();

    while !stop.is_raised() {
        match source.read(frames_per_buffer) {
            Ok(Some(chunk)) => {
                if chunk.overrun {
                    tracing::warn!(
                        "Input overflow: samples were dropped before chunk {}",
                        frames.len()
                    );
                }
                frames.push(chunk);
            }
            Ok(None) => {
                tracing::info!("Audio source ended after {} chunk(s)", frames.len());
                break;
            }
            Err(e) => {
                tracing::error!("Capture read failed after {} chunk(s): {}", frames.len(), e);
                return CaptureOutcome {
                    frames,
                    error: Some(e),
                };
            }
        }
    }

    CaptureOutcome {
        frames,
        error: None,
    }
}

/// One capture from arm to save
pub struct RecordingSession {
    config: StreamConfig,
    state: SessionState,
    history: Vec<SessionState>,
    stream: Option<CaptureStream>,
    stop: StopSignal,
    frames: Option<FrameBuffer>,
}

impl RecordingSession {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
            stream: None,
            stop: StopSignal::new(),
            frames: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Captured frames, once stopped and until saved
    pub fn frames(&self) -> Option<&FrameBuffer> {
        match self.state {
            SessionState::Stopped => self.frames.as_ref(),
            _ => None,
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.enter(next);
        Ok(())
    }

    /// Enter a state known to follow the current one
    fn enter(&mut self, next: SessionState) {
        debug_assert!(self.state.can_transition_to(next));
        tracing::debug!("Session state: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn require(&self, state: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    /// Open the capture stream. On failure the session stays idle.
    pub fn arm(&mut self, host: &dyn AudioHost, device: Option<usize>) -> Result<(), SessionError> {
        self.require(SessionState::Idle, "arm")?;
        let stream = audio::open_capture(host, &self.config, device)?;
        self.stream = Some(stream);
        self.stop = StopSignal::new();
        self.transition(SessionState::Armed)
    }

    /// Close the stream and fall back to idle
    fn abort(&mut self, stream: CaptureStream) {
        if let Err(e) = stream.close() {
            tracing::warn!("Failed to close capture stream: {}", e);
        }
        self.enter(SessionState::Idle);
    }

    /// Capture from the start trigger to the stop trigger.
    ///
    /// On return the capture thread has been joined and the stream closed.
    /// Trigger failures, read errors and a panicked capture thread are reported
    /// only after that; frames read before a failure are kept for `save`.
    pub fn run(&mut self, trigger: &mut dyn Trigger) -> Result<(), SessionError> {
        self.require(SessionState::Armed, "run")?;
        let mut stream = self.stream.take().ok_or(SessionError::InvalidState {
            state: self.state,
            operation: "run",
        })?;

        if let Err(e) = trigger.wait_for_start() {
            self.abort(stream);
            return Err(e.into());
        }
        // Audio queued while armed predates the start gesture
        if let Err(e) = stream.reader().discard_pending() {
            self.abort(stream);
            return Err(e.into());
        }

        let frames_per_buffer = self.config.frames_per_buffer as usize;
        let stop = self.stop.clone();

        let scoped = thread::scope(|scope| -> Result<_, SessionError> {
            let reader = stream.reader();
            let worker = thread::Builder::new()
                .name("voxrec-capture".to_string())
                .spawn_scoped(scope, move || capture_loop(reader, frames_per_buffer, &stop))
                .map_err(SessionError::Spawn)?;

            self.enter(SessionState::Capturing);
            tracing::info!("Recording...");

            // The stop signal must be raised on every path past this point,
            // or the join below never returns.
            let stopped = trigger.wait_for_stop();
            self.stop.raise();
            self.enter(SessionState::Draining);

            Ok((worker.join(), stopped))
        });

        let (joined, stopped) = match scoped {
            Ok(result) => result,
            Err(e) => {
                self.abort(stream);
                return Err(e);
            }
        };

        if let Err(e) = stream.close() {
            tracing::warn!("Failed to close capture stream: {}", e);
        }
        self.enter(SessionState::Stopped);

        let (frames, capture_error) = match joined {
            Ok(outcome) => (outcome.frames, outcome.error.map(SessionError::from)),
            Err(_) => (FrameBuffer::new(), Some(SessionError::WorkerPanicked)),
        };

        tracing::info!(
            "Captured {} chunk(s), {:.2}s of audio ({} overrun(s))",
            frames.len(),
            self.config.duration_of(frames.byte_len()).as_secs_f64(),
            frames.overruns()
        );
        self.frames = Some(frames);

        stopped?;
        match capture_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Write the captured frames to `path`. Frames can be saved once.
    pub fn save(&mut self, path: &Path) -> Result<WaveformHeader, SessionError> {
        self.require(SessionState::Stopped, "save")?;
        let frames = self.frames.take().ok_or(SessionError::FramesConsumed)?;

        match wav::write(path, frames.chunks(), &self.config) {
            Ok(header) => {
                tracing::info!(
                    "Saved {:.2}s recording to {:?}",
                    header.duration().as_secs_f64(),
                    path
                );
                Ok(header)
            }
            Err(e) => {
                self.frames = Some(frames);
                Err(e.into())
            }
        }
    }
}

/// Arm, run and save a recording in one call.
///
/// If the capture ends with an error, whatever was captured before it is
/// still written to `path` before the error is returned.
pub fn record_to_file(
    host: &dyn AudioHost,
    config: StreamConfig,
    device: Option<usize>,
    trigger: &mut dyn Trigger,
    path: &Path,
) -> Result<WaveformHeader, SessionError> {
    let mut session = RecordingSession::new(config);
    session.arm(host, device)?;

    if let Err(e) = session.run(trigger) {
        if session.frames().is_some_and(|f| !f.is_empty()) {
            match session.save(path) {
                Ok(header) => tracing::warn!(
                    "Saved {} frame(s) captured before the failure to {:?}",
                    header.frame_count,
                    path
                ),
                Err(save_err) => tracing::warn!("Could not save partial recording: {}", save_err),
            }
        }
        return Err(e);
    }

    session.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::memory::MemoryHost;
    use crate::audio::Device;
    use crate::error::TriggerError;
    use crate::trigger::{ChannelTrigger, TriggerEvent};
    use tempfile::TempDir;

    struct ScriptedSource {
        chunks: Vec<Result<CapturedChunk, AudioError>>,
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self, _frames: usize) -> Result<Option<CapturedChunk>, AudioError> {
            if self.chunks.is_empty() {
                return Ok(None);
            }
            self.chunks.remove(0).map(Some)
        }
    }

    fn chunk(byte: u8, overrun: bool) -> CapturedChunk {
        CapturedChunk {
            data: vec![byte; 4],
            overrun,
        }
    }

    fn host() -> MemoryHost {
        MemoryHost::new(vec![Device {
            id: 0,
            name: "mic".to_string(),
            max_input_channels: 1,
            max_output_channels: 0,
        }])
        .with_default_input(0)
    }

    fn small_config() -> StreamConfig {
        StreamConfig::capture(16000, 1, 2)
    }

    #[test]
    fn test_stop_signal() {
        let stop = StopSignal::new();
        let shared = stop.clone();
        assert!(!shared.is_raised());
        stop.raise();
        assert!(shared.is_raised());
    }

    #[test]
    fn test_capture_loop_keeps_overrun_chunks() {
        let mut source = ScriptedSource {
            chunks: vec![Ok(chunk(1, false)), Ok(chunk(2, true)), Ok(chunk(3, false))],
        };
        let outcome = capture_loop(&mut source, 2, &StopSignal::new());
        assert!(outcome.error.is_none());
        assert_eq!(outcome.frames.len(), 3);
        assert_eq!(outcome.frames.overruns(), 1);
        assert_eq!(outcome.frames.chunks()[1], vec![2; 4]);
        assert_eq!(outcome.frames.byte_len(), 12);
    }

    #[test]
    fn test_capture_loop_read_error_keeps_earlier_frames() {
        let mut source = ScriptedSource {
            chunks: vec![
                Ok(chunk(1, false)),
                Err(AudioError::Stream("device unplugged".to_string())),
                Ok(chunk(3, false)),
            ],
        };
        let outcome = capture_loop(&mut source, 2, &StopSignal::new());
        assert!(matches!(outcome.error, Some(AudioError::Stream(_))));
        assert_eq!(outcome.frames.into_chunks(), vec![vec![1; 4]]);
    }

    #[test]
    fn test_capture_loop_honours_raised_stop() {
        let mut source = ScriptedSource {
            chunks: vec![Ok(chunk(1, false))],
        };
        let stop = StopSignal::new();
        stop.raise();
        let outcome = capture_loop(&mut source, 2, &stop);
        assert!(outcome.frames.is_empty());
    }

    #[test]
    fn test_arm_failure_stays_idle() {
        let host = host().unavailable("no server");
        let mut session = RecordingSession::new(small_config());
        let result = session.arm(&host, None);
        assert!(matches!(
            result,
            Err(SessionError::Audio(AudioError::Subsystem(_)))
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.history(), &[SessionState::Idle]);
    }

    #[test]
    fn test_run_requires_armed() {
        let mut session = RecordingSession::new(small_config());
        let (_tx, mut trigger) = ChannelTrigger::pair();
        assert!(matches!(
            session.run(&mut trigger),
            Err(SessionError::InvalidState {
                state: SessionState::Idle,
                operation: "run"
            })
        ));
    }

    #[test]
    fn test_failed_start_trigger_releases_device() {
        let host = host();
        let mut session = RecordingSession::new(small_config());
        session.arm(&host, None).unwrap();
        assert!(host.is_claimed(0));

        let (tx, mut trigger) = ChannelTrigger::pair();
        drop(tx);
        let result = session.run(&mut trigger);
        assert!(matches!(
            result,
            Err(SessionError::Trigger(TriggerError::Closed("start")))
        ));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            session.history(),
            &[SessionState::Idle, SessionState::Armed, SessionState::Idle]
        );
        assert!(!host.is_claimed(0));
    }

    #[test]
    fn test_save_once() {
        let dir = TempDir::new().unwrap();
        let (tx, mut trigger) = ChannelTrigger::pair();
        let host = host()
            .with_capture([vec![0u8; 4], vec![1u8; 4]])
            .stop_at_end_of_input(tx.clone());
        tx.send(TriggerEvent::Start).unwrap();

        let mut session = RecordingSession::new(small_config());
        session.arm(&host, None).unwrap();
        assert!(matches!(
            session.save(&dir.path().join("early.wav")),
            Err(SessionError::InvalidState { .. })
        ));

        session.run(&mut trigger).unwrap();
        assert_eq!(session.frames().map(FrameBuffer::len), Some(2));

        let header = session.save(&dir.path().join("take.wav")).unwrap();
        assert_eq!(header.frame_count, 4);
        assert!(matches!(
            session.save(&dir.path().join("again.wav")),
            Err(SessionError::FramesConsumed)
        ));
    }

    #[test]
    fn test_failed_save_keeps_frames() {
        let dir = TempDir::new().unwrap();
        let (tx, mut trigger) = ChannelTrigger::pair();
        let host = host()
            .with_capture([vec![0u8; 4]])
            .stop_at_end_of_input(tx.clone());
        tx.send(TriggerEvent::Start).unwrap();

        let mut session = RecordingSession::new(small_config());
        session.arm(&host, None).unwrap();
        session.run(&mut trigger).unwrap();

        let missing_dir = dir.path().join("missing").join("take.wav");
        assert!(session.save(&missing_dir).is_err());
        assert!(session.frames().is_some());
        assert!(session.save(&dir.path().join("take.wav")).is_ok());
    }

    /// Host whose capture thread dies on its first read
    struct PanickingHost {
        released: Arc<AtomicBool>,
    }

    struct PanickingSource;

    impl FrameSource for PanickingSource {
        fn read(&mut self, _frames: usize) -> Result<Option<CapturedChunk>, AudioError> {
            panic!("driver bug");
        }
    }

    struct FlagControl(Arc<AtomicBool>);

    impl crate::audio::StreamControl for FlagControl {
        fn stop(&mut self) -> Result<(), AudioError> {
            Ok(())
        }
    }

    impl Drop for FlagControl {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    impl AudioHost for PanickingHost {
        fn name(&self) -> String {
            "panicking".to_string()
        }

        fn devices(&self) -> Result<Vec<Device>, AudioError> {
            Ok(vec![Device {
                id: 0,
                name: "mic".to_string(),
                max_input_channels: 1,
                max_output_channels: 0,
            }])
        }

        fn default_device(
            &self,
            _direction: crate::audio::Direction,
        ) -> Result<Option<usize>, AudioError> {
            Ok(Some(0))
        }

        fn open_capture(
            &self,
            _device: usize,
            _config: &StreamConfig,
        ) -> Result<crate::audio::OpenedStream<Box<dyn FrameSource>>, AudioError> {
            Ok(crate::audio::OpenedStream {
                io: Box::new(PanickingSource),
                control: Box::new(FlagControl(self.released.clone())),
            })
        }

        fn open_playback(
            &self,
            device: usize,
            _config: &StreamConfig,
        ) -> Result<crate::audio::OpenedStream<Box<dyn crate::audio::FrameSink>>, AudioError>
        {
            Err(AudioError::DeviceUnavailable {
                index: device,
                reason: "capture only".to_string(),
            })
        }
    }

    #[test]
    fn test_worker_panic_is_reported_and_stream_closed() {
        let released = Arc::new(AtomicBool::new(false));
        let host = PanickingHost {
            released: released.clone(),
        };
        let (tx, mut trigger) = ChannelTrigger::pair();
        tx.send(TriggerEvent::Start).unwrap();
        tx.send(TriggerEvent::Stop).unwrap();

        let mut session = RecordingSession::new(small_config());
        session.arm(&host, None).unwrap();
        assert!(!released.load(Ordering::SeqCst));

        let result = session.run(&mut trigger);
        assert!(matches!(result, Err(SessionError::WorkerPanicked)));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(session.frames().map(FrameBuffer::len), Some(0));
    }

    #[test]
    fn test_audio_queued_while_armed_is_discarded() {
        let (tx, mut trigger) = ChannelTrigger::pair();
        let host = host()
            .with_pending_capture([vec![9u8; 4], vec![9u8; 4]])
            .with_capture([vec![1u8; 4]])
            .stop_at_end_of_input(tx.clone());
        tx.send(TriggerEvent::Start).unwrap();

        let mut session = RecordingSession::new(small_config());
        session.arm(&host, None).unwrap();
        session.run(&mut trigger).unwrap();

        let frames = session.frames().unwrap();
        assert_eq!(frames.chunks(), &[vec![1u8; 4]]);
        assert_eq!(frames.overruns(), 0);
    }
}
