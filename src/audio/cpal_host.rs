//! cpal-based audio host
//!
//! Uses the cpal crate for cross-platform audio input and output.
//! Works with PipeWire, PulseAudio, ALSA and JACK on Linux.
//!
//! cpal is callback driven, so each stream is paired with a bounded sample
//! queue: the device callback fills (capture) or empties (playback) the queue
//! and the blocking `read`/`write` calls wait on it. cpal::Stream is not Send;
//! it stays inside the stream control on the thread that opened it, and only
//! the queue side crosses into the capture thread.

use super::{
    AudioHost, CapturedChunk, Device, Direction, FrameSink, FrameSource, OpenedStream,
    StreamConfig, StreamControl,
};
use crate::error::AudioError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Capture queue capacity, in buffers, before the oldest samples are dropped
const CAPTURE_QUEUE_BUFFERS: usize = 8;

/// Playback queue depth, in buffers, before `write` blocks
const PLAYBACK_QUEUE_BUFFERS: usize = 2;

/// Extra time `drain` allows beyond the queued audio
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Host backed by cpal
pub struct CpalHost {
    /// `None` selects cpal's default host
    host_id: Option<cpal::HostId>,
}

impl CpalHost {
    /// Select a host by name ("alsa", "jack", ...) or "default"
    pub fn new(name: &str) -> Result<Self, AudioError> {
        if name.eq_ignore_ascii_case("default") {
            return Ok(Self { host_id: None });
        }

        let available = cpal::available_hosts();
        available
            .iter()
            .find(|id| id.name().eq_ignore_ascii_case(name))
            .map(|id| Self { host_id: Some(*id) })
            .ok_or_else(|| {
                let names: Vec<&str> = available.iter().map(|id| id.name()).collect();
                AudioError::Subsystem(format!(
                    "Unknown audio host '{}'. Available hosts: {}",
                    name,
                    names.join(", ")
                ))
            })
    }

    /// Open a transient handle to the host audio layer
    fn host(&self) -> Result<cpal::Host, AudioError> {
        match self.host_id {
            None => Ok(cpal::default_host()),
            Some(id) => cpal::host_from_id(id).map_err(|e| AudioError::Subsystem(e.to_string())),
        }
    }

    fn device_at(&self, host: &cpal::Host, index: usize) -> Result<cpal::Device, AudioError> {
        host.devices()
            .map_err(|e| AudioError::Subsystem(e.to_string()))?
            .nth(index)
            .ok_or_else(|| AudioError::DeviceUnavailable {
                index,
                reason: "no such device".to_string(),
            })
    }
}

/// Highest channel count over a device's supported configurations
fn max_channels<I>(configs: Result<I, cpal::SupportedStreamConfigsError>) -> u16
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    configs
        .map(|ranges| ranges.map(|r| r.channels()).max().unwrap_or(0))
        .unwrap_or(0)
}

/// Preference order for device sample formats; `None` means unsupported
fn format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::I16 => Some(0),
        cpal::SampleFormat::F32 => Some(1),
        cpal::SampleFormat::I32 => Some(2),
        cpal::SampleFormat::U16 => Some(3),
        cpal::SampleFormat::U8 => Some(4),
        _ => None,
    }
}

/// Pick a supported device configuration matching channels and rate exactly.
/// There is no resampling or channel mixing.
fn negotiate<I>(ranges: I, config: &StreamConfig) -> Option<(cpal::StreamConfig, cpal::SampleFormat)>
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    let rate = cpal::SampleRate(config.sample_rate);
    let best = ranges
        .filter(|r| r.channels() == config.channels)
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter_map(|r| format_rank(r.sample_format()).map(|rank| (rank, r)))
        .min_by_key(|(rank, _)| *rank)?
        .1
        .with_sample_rate(rate);

    let buffer_size = match best.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max }
            if (*min..=*max).contains(&config.frames_per_buffer) =>
        {
            cpal::BufferSize::Fixed(config.frames_per_buffer)
        }
        _ => cpal::BufferSize::Default,
    };

    let stream_config = cpal::StreamConfig {
        channels: best.channels(),
        sample_rate: best.sample_rate(),
        buffer_size,
    };
    Some((stream_config, best.sample_format()))
}

fn build_error(index: usize, e: cpal::BuildStreamError) -> AudioError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => AudioError::DeviceUnavailable {
            index,
            reason: "device is no longer available".to_string(),
        },
        cpal::BuildStreamError::StreamConfigNotSupported
        | cpal::BuildStreamError::InvalidArgument => AudioError::DeviceUnavailable {
            index,
            reason: e.to_string(),
        },
        other => AudioError::DeviceBusy {
            index,
            reason: other.to_string(),
        },
    }
}

fn unsupported(index: usize, direction: Direction, config: &StreamConfig) -> AudioError {
    AudioError::DeviceUnavailable {
        index,
        reason: format!(
            "no {} configuration with {} channel(s) at {} Hz",
            direction, config.channels, config.sample_rate
        ),
    }
}

impl AudioHost for CpalHost {
    fn name(&self) -> String {
        match self.host_id {
            Some(id) => id.name().to_string(),
            None => cpal::default_host().id().name().to_string(),
        }
    }

    fn devices(&self) -> Result<Vec<Device>, AudioError> {
        let host = self.host()?;
        let devices = host
            .devices()
            .map_err(|e| AudioError::Subsystem(e.to_string()))?;

        Ok(devices
            .enumerate()
            .map(|(id, device)| Device {
                id,
                name: device.name().unwrap_or_else(|_| "unknown".to_string()),
                max_input_channels: max_channels(device.supported_input_configs()),
                max_output_channels: max_channels(device.supported_output_configs()),
            })
            .collect())
    }

    fn default_device(&self, direction: Direction) -> Result<Option<usize>, AudioError> {
        let host = self.host()?;
        let default = match direction {
            Direction::Capture => host.default_input_device(),
            Direction::Playback => host.default_output_device(),
        };
        let Some(name) = default.and_then(|d| d.name().ok()) else {
            return Ok(None);
        };

        let position = host
            .devices()
            .map_err(|e| AudioError::Subsystem(e.to_string()))?
            .position(|d| d.name().map(|n| n == name).unwrap_or(false));
        tracing::debug!("Default {} device: {} ({:?})", direction, name, position);
        Ok(position)
    }

    fn open_capture(
        &self,
        index: usize,
        config: &StreamConfig,
    ) -> Result<OpenedStream<Box<dyn FrameSource>>, AudioError> {
        let host = self.host()?;
        let device = self.device_at(&host, index)?;

        let ranges = device
            .supported_input_configs()
            .map_err(|e| AudioError::DeviceBusy {
                index,
                reason: e.to_string(),
            })?;
        let (stream_config, sample_format) =
            negotiate(ranges, config).ok_or_else(|| unsupported(index, Direction::Capture, config))?;

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}, buffer: {:?}",
            stream_config.sample_rate.0,
            stream_config.channels,
            sample_format,
            stream_config.buffer_size
        );

        let buffer_samples = config.buffer_samples();
        let queue = Arc::new(SampleQueue::new(buffer_samples * CAPTURE_QUEUE_BUFFERS));

        let stream = match sample_format {
            cpal::SampleFormat::I16 => build_input::<i16>(&device, &stream_config, queue.clone()),
            cpal::SampleFormat::F32 => build_input::<f32>(&device, &stream_config, queue.clone()),
            cpal::SampleFormat::I32 => build_input::<i32>(&device, &stream_config, queue.clone()),
            cpal::SampleFormat::U16 => build_input::<u16>(&device, &stream_config, queue.clone()),
            cpal::SampleFormat::U8 => build_input::<u8>(&device, &stream_config, queue.clone()),
            _ => return Err(unsupported(index, Direction::Capture, config)),
        }
        .map_err(|e| build_error(index, e))?;

        stream.play().map_err(|e| AudioError::DeviceBusy {
            index,
            reason: e.to_string(),
        })?;

        Ok(OpenedStream {
            io: Box::new(CpalSource {
                queue,
                channels: config.channels as usize,
            }),
            control: Box::new(CpalControl { stream }),
        })
    }

    fn open_playback(
        &self,
        index: usize,
        config: &StreamConfig,
    ) -> Result<OpenedStream<Box<dyn FrameSink>>, AudioError> {
        let host = self.host()?;
        let device = self.device_at(&host, index)?;

        let ranges = device
            .supported_output_configs()
            .map_err(|e| AudioError::DeviceBusy {
                index,
                reason: e.to_string(),
            })?;
        let (stream_config, sample_format) = negotiate(ranges, config)
            .ok_or_else(|| unsupported(index, Direction::Playback, config))?;

        tracing::debug!(
            "Device config: {} Hz, {} channel(s), format: {:?}, buffer: {:?}",
            stream_config.sample_rate.0,
            stream_config.channels,
            sample_format,
            stream_config.buffer_size
        );

        let queue = Arc::new(SampleQueue::new(
            config.buffer_samples() * PLAYBACK_QUEUE_BUFFERS,
        ));

        let stream = match sample_format {
            cpal::SampleFormat::I16 => build_output::<i16>(&device, &stream_config, queue.clone()),
            cpal::SampleFormat::F32 => build_output::<f32>(&device, &stream_config, queue.clone()),
            cpal::SampleFormat::I32 => build_output::<i32>(&device, &stream_config, queue.clone()),
            cpal::SampleFormat::U16 => build_output::<u16>(&device, &stream_config, queue.clone()),
            cpal::SampleFormat::U8 => build_output::<u8>(&device, &stream_config, queue.clone()),
            _ => return Err(unsupported(index, Direction::Playback, config)),
        }
        .map_err(|e| build_error(index, e))?;

        stream.play().map_err(|e| AudioError::DeviceBusy {
            index,
            reason: e.to_string(),
        })?;

        Ok(OpenedStream {
            io: Box::new(CpalSink {
                queue,
                config: *config,
                scratch: Vec::new(),
            }),
            control: Box::new(CpalControl { stream }),
        })
    }
}

/// Build an input stream for a specific device sample type
fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<SampleQueue<i16>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + Send + 'static,
    i16: cpal::FromSample<T>,
{
    let err_queue = queue.clone();
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            queue.push_overwriting(
                data.iter()
                    .map(|&s| <i16 as cpal::FromSample<T>>::from_sample_(s)),
            );
        },
        move |err| err_queue.report(err),
        None,
    )
}

/// Build an output stream for a specific device sample type
fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<SampleQueue<f32>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let err_queue = queue.clone();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            queue.pop_into(data);
        },
        move |err| err_queue.report(err),
        None,
    )
}

/// Owns the cpal stream; dropping it releases the device
struct CpalControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalControl {
    fn stop(&mut self) -> Result<(), AudioError> {
        // Some backends cannot pause; the device is released on drop regardless
        if let Err(e) = self.stream.pause() {
            tracing::debug!("Stream pause not supported: {}", e);
        }
        Ok(())
    }
}

struct QueueState<T> {
    samples: VecDeque<T>,
    /// Samples discarded since the last read
    dropped: usize,
    /// Fatal stream error reported by the device callback
    error: Option<String>,
}

/// Bounded sample queue shared between a cpal callback and a blocking caller
struct SampleQueue<T> {
    state: Mutex<QueueState<T>>,
    changed: Condvar,
    capacity: usize,
}

impl<T: Copy> SampleQueue<T> {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                samples: VecDeque::with_capacity(capacity),
                dropped: 0,
                error: None,
            }),
            changed: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState<T>>, AudioError> {
        self.state
            .lock()
            .map_err(|_| AudioError::Stream("audio queue poisoned".to_string()))
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, QueueState<T>>,
    ) -> Result<MutexGuard<'a, QueueState<T>>, AudioError> {
        self.changed
            .wait(guard)
            .map_err(|_| AudioError::Stream("audio queue poisoned".to_string()))
    }

    /// Append samples, discarding the oldest ones when full
    fn push_overwriting(&self, samples: impl Iterator<Item = T>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        for sample in samples {
            if state.samples.len() == self.capacity {
                state.samples.pop_front();
                state.dropped += 1;
            }
            state.samples.push_back(sample);
        }
        drop(state);
        self.changed.notify_all();
    }

    /// Handle an error reported by the cpal error callback
    fn report(&self, err: cpal::StreamError) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match err {
            cpal::StreamError::DeviceNotAvailable => {
                tracing::error!("Audio device disconnected");
                state.error = Some("audio device disconnected".to_string());
            }
            other => {
                // xruns and similar glitches degrade quality but are not fatal
                tracing::warn!("Audio stream error: {}", other);
                state.dropped += 1;
            }
        }
        drop(state);
        self.changed.notify_all();
    }
}

impl SampleQueue<f32> {
    /// Fill a device buffer from the queue, with silence on underrun
    fn pop_into<T: cpal::FromSample<f32> + Copy>(&self, out: &mut [T]) {
        let silence = <T as cpal::FromSample<f32>>::from_sample_(0.0);
        let Ok(mut state) = self.state.lock() else {
            out.iter_mut().for_each(|s| *s = silence);
            return;
        };
        for slot in out.iter_mut() {
            *slot = match state.samples.pop_front() {
                Some(sample) => <T as cpal::FromSample<f32>>::from_sample_(sample),
                None => silence,
            };
        }
        drop(state);
        self.changed.notify_all();
    }
}

/// Reading half of a cpal capture stream
struct CpalSource {
    queue: Arc<SampleQueue<i16>>,
    channels: usize,
}

impl FrameSource for CpalSource {
    fn read(&mut self, frames: usize) -> Result<Option<CapturedChunk>, AudioError> {
        let needed = frames * self.channels;
        let mut state = self.queue.lock()?;
        loop {
            if let Some(error) = state.error.take() {
                return Err(AudioError::Stream(error));
            }
            if state.samples.len() >= needed {
                break;
            }
            state = self.queue.wait(state)?;
        }

        let overrun = state.dropped > 0;
        state.dropped = 0;
        let data = state
            .samples
            .drain(..needed)
            .flat_map(i16::to_le_bytes)
            .collect();
        Ok(Some(CapturedChunk { data, overrun }))
    }

    fn discard_pending(&mut self) -> Result<(), AudioError> {
        let mut state = self.queue.lock()?;
        if !state.samples.is_empty() {
            tracing::debug!(
                "Discarding {} samples captured before start",
                state.samples.len()
            );
        }
        state.samples.clear();
        state.dropped = 0;
        Ok(())
    }
}

/// Writing half of a cpal playback stream
struct CpalSink {
    queue: Arc<SampleQueue<f32>>,
    config: StreamConfig,
    scratch: Vec<f32>,
}

impl FrameSink for CpalSink {
    fn write(&mut self, data: &[u8]) -> Result<(), AudioError> {
        self.scratch.clear();
        self.config.sample_format.decode_f32(data, &mut self.scratch);

        let mut state = self.queue.lock()?;
        loop {
            if let Some(error) = state.error.take() {
                return Err(AudioError::Stream(error));
            }
            if state.samples.len() < self.queue.capacity {
                break;
            }
            state = self.queue.wait(state)?;
        }
        state.samples.extend(self.scratch.iter().copied());
        Ok(())
    }

    fn drain(&mut self) -> Result<(), AudioError> {
        let mut state = self.queue.lock()?;
        let queued = state.samples.len() / self.config.channels.max(1) as usize;
        let deadline = Instant::now()
            + Duration::from_secs_f64(queued as f64 / self.config.sample_rate.max(1) as f64)
            + DRAIN_GRACE;

        while !state.samples.is_empty() {
            if let Some(error) = state.error.take() {
                return Err(AudioError::Stream(error));
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    "Output device stopped consuming audio, {} samples left unplayed",
                    state.samples.len()
                );
                return Ok(());
            }
            state = self
                .queue
                .changed
                .wait_timeout(state, deadline - now)
                .map_err(|_| AudioError::Stream("audio queue poisoned".to_string()))?
                .0;
        }
        drop(state);

        // The last callback's buffer is still in the device
        std::thread::sleep(self.config.buffer_duration());
        Ok(())
    }
}
