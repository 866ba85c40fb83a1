//! In-memory audio host
//!
//! A scripted stand-in for the OS audio layer. Capture streams replay a
//! queue of chunks and then either end or repeat one chunk until stopped;
//! playback streams record every byte written.
//! Device claims are tracked so that double-opens and leaked handles show up
//! in tests.

use super::{
    AudioHost, CapturedChunk, Device, Direction, FrameSink, FrameSource, OpenedStream,
    StreamConfig, StreamControl,
};
use crate::error::AudioError;
use crate::trigger::TriggerEvent;
use std::collections::{HashSet, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Pause between reads of an endless capture, standing in for a device period
const ENDLESS_READ_INTERVAL: Duration = Duration::from_millis(2);

/// Scripted audio host
pub struct MemoryHost {
    devices: Vec<Device>,
    default_input: Option<usize>,
    default_output: Option<usize>,
    unavailable: Option<String>,
    fail_write_at: Option<usize>,
    fail_read_at: Option<usize>,
    endless: Option<Vec<u8>>,
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    claims: Mutex<HashSet<usize>>,
    pending: Mutex<VecDeque<CapturedChunk>>,
    script: Mutex<VecDeque<CapturedChunk>>,
    end_of_input: Mutex<Option<Sender<TriggerEvent>>>,
    played: Mutex<Vec<u8>>,
    writes: Mutex<Vec<usize>>,
}

/// Lock a mutex, recovering the data if a panicking test poisoned it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryHost {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            default_input: None,
            default_output: None,
            unavailable: None,
            fail_write_at: None,
            fail_read_at: None,
            endless: None,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn with_default_input(mut self, id: usize) -> Self {
        self.default_input = Some(id);
        self
    }

    pub fn with_default_output(mut self, id: usize) -> Self {
        self.default_output = Some(id);
        self
    }

    /// Make every host call fail as if the audio subsystem were down
    pub fn unavailable(mut self, reason: &str) -> Self {
        self.unavailable = Some(reason.to_string());
        self
    }

    /// Queue chunks to be returned by capture reads, in order
    pub fn with_capture<I>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        lock(&self.shared.script).extend(chunks.into_iter().map(|data| CapturedChunk {
            data,
            overrun: false,
        }));
        self
    }

    /// Queue one chunk that the "driver" flags as an overrun
    pub fn with_overrun_chunk(self, data: Vec<u8>) -> Self {
        lock(&self.shared.script).push_back(CapturedChunk {
            data,
            overrun: true,
        });
        self
    }

    /// Queue chunks that arrive while the stream is armed, before capture
    /// starts. They are returned by reads unless the source discards them.
    pub fn with_pending_capture<I>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        lock(&self.shared.pending).extend(chunks.into_iter().map(|data| CapturedChunk {
            data,
            overrun: false,
        }));
        self
    }

    /// Keep returning `chunk` after the script runs out, until the reader stops
    pub fn with_endless_capture(mut self, chunk: Vec<u8>) -> Self {
        self.endless = Some(chunk);
        self
    }

    /// Fail the capture read with index `n` (0-based)
    pub fn fail_read_at(mut self, n: usize) -> Self {
        self.fail_read_at = Some(n);
        self
    }

    /// Send `TriggerEvent::Stop` on `tx` once capture input ends, either
    /// because the script ran out or because a read failed
    pub fn stop_at_end_of_input(self, tx: Sender<TriggerEvent>) -> Self {
        *lock(&self.shared.end_of_input) = Some(tx);
        self
    }

    /// Fail the playback write with index `n` (0-based)
    pub fn fail_write_at(mut self, n: usize) -> Self {
        self.fail_write_at = Some(n);
        self
    }

    pub fn is_claimed(&self, id: usize) -> bool {
        lock(&self.shared.claims).contains(&id)
    }

    /// Every byte written to playback streams so far
    pub fn played(&self) -> Vec<u8> {
        lock(&self.shared.played).clone()
    }

    /// Size of each successful playback write, in order
    pub fn write_sizes(&self) -> Vec<usize> {
        lock(&self.shared.writes).clone()
    }

    fn check_available(&self) -> Result<(), AudioError> {
        match &self.unavailable {
            Some(reason) => Err(AudioError::Subsystem(reason.clone())),
            None => Ok(()),
        }
    }

    fn claim(&self, device: usize, direction: Direction) -> Result<MemoryControl, AudioError> {
        self.check_available()?;
        if !self
            .devices
            .iter()
            .any(|d| d.id == device && d.supports(direction))
        {
            return Err(AudioError::DeviceUnavailable {
                index: device,
                reason: format!("no {} device with this index", direction),
            });
        }
        if !lock(&self.shared.claims).insert(device) {
            return Err(AudioError::DeviceBusy {
                index: device,
                reason: "already claimed by another stream".to_string(),
            });
        }
        Ok(MemoryControl {
            shared: self.shared.clone(),
            device,
        })
    }
}

impl AudioHost for MemoryHost {
    fn name(&self) -> String {
        "memory".to_string()
    }

    fn devices(&self) -> Result<Vec<Device>, AudioError> {
        self.check_available()?;
        Ok(self.devices.clone())
    }

    fn default_device(&self, direction: Direction) -> Result<Option<usize>, AudioError> {
        self.check_available()?;
        Ok(match direction {
            Direction::Capture => self.default_input,
            Direction::Playback => self.default_output,
        })
    }

    fn open_capture(
        &self,
        device: usize,
        _config: &StreamConfig,
    ) -> Result<OpenedStream<Box<dyn FrameSource>>, AudioError> {
        let control = self.claim(device, Direction::Capture)?;
        Ok(OpenedStream {
            io: Box::new(MemorySource {
                shared: self.shared.clone(),
                endless: self.endless.clone(),
                fail_read_at: self.fail_read_at,
                reads: 0,
            }),
            control: Box::new(control),
        })
    }

    fn open_playback(
        &self,
        device: usize,
        _config: &StreamConfig,
    ) -> Result<OpenedStream<Box<dyn FrameSink>>, AudioError> {
        let control = self.claim(device, Direction::Playback)?;
        Ok(OpenedStream {
            io: Box::new(MemorySink {
                shared: self.shared.clone(),
                fail_write_at: self.fail_write_at,
                writes: 0,
            }),
            control: Box::new(control),
        })
    }
}

/// Releases the device claim when dropped
struct MemoryControl {
    shared: Arc<Shared>,
    device: usize,
}

impl StreamControl for MemoryControl {
    fn stop(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

impl Drop for MemoryControl {
    fn drop(&mut self) {
        lock(&self.shared.claims).remove(&self.device);
    }
}

struct MemorySource {
    shared: Arc<Shared>,
    endless: Option<Vec<u8>>,
    fail_read_at: Option<usize>,
    reads: usize,
}

impl MemorySource {
    fn end_of_input(&self) {
        if let Some(tx) = lock(&self.shared.end_of_input).take() {
            let _ = tx.send(TriggerEvent::Stop);
        }
    }
}

impl FrameSource for MemorySource {
    fn read(&mut self, _frames: usize) -> Result<Option<CapturedChunk>, AudioError> {
        let index = self.reads;
        self.reads += 1;
        if self.fail_read_at == Some(index) {
            self.end_of_input();
            return Err(AudioError::Stream(format!("scripted failure on read {}", index)));
        }
        if let Some(chunk) = lock(&self.shared.pending).pop_front() {
            return Ok(Some(chunk));
        }
        if let Some(chunk) = lock(&self.shared.script).pop_front() {
            return Ok(Some(chunk));
        }
        if let Some(data) = &self.endless {
            std::thread::sleep(ENDLESS_READ_INTERVAL);
            return Ok(Some(CapturedChunk {
                data: data.clone(),
                overrun: false,
            }));
        }
        self.end_of_input();
        Ok(None)
    }

    fn discard_pending(&mut self) -> Result<(), AudioError> {
        lock(&self.shared.pending).clear();
        Ok(())
    }
}

struct MemorySink {
    shared: Arc<Shared>,
    fail_write_at: Option<usize>,
    writes: usize,
}

impl FrameSink for MemorySink {
    fn write(&mut self, data: &[u8]) -> Result<(), AudioError> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_write_at == Some(index) {
            return Err(AudioError::Stream(format!("scripted failure on write {}", index)));
        }
        lock(&self.shared.played).extend_from_slice(data);
        lock(&self.shared.writes).push(data.len());
        Ok(())
    }

    fn drain(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}
