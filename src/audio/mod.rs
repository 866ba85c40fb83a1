//! Audio device and stream layer
//!
//! The host audio subsystem sits behind the [`AudioHost`] trait so that the
//! recording session and playback never talk to cpal directly:
//!
//! - [`cpal_host::CpalHost`] drives real hardware (PipeWire, PulseAudio, ALSA,
//!   JACK, CoreAudio, WASAPI)
//! - [`memory::MemoryHost`] is a scripted in-process host for tests and for
//!   embedding without hardware
//!
//! Streams are opened and closed only through [`stream`].

pub mod cpal_host;
pub mod devices;
pub mod memory;
pub mod stream;

pub use devices::{list_devices, DeviceList};
pub use stream::{open_capture, open_playback, AudioStream, CaptureStream, PlaybackStream};

use crate::config::AudioConfig;
use crate::error::AudioError;
use std::fmt;
use std::time::Duration;

/// Direction of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Hardware into the process (microphone)
    Capture,
    /// Process to hardware (speaker)
    Playback,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Capture => write!(f, "input"),
            Direction::Playback => write!(f, "output"),
        }
    }
}

/// Sample encodings a waveform file may carry (little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    I16,
    I24,
    I32,
    F32,
}

impl SampleFormat {
    /// Size of one sample in bytes
    pub fn sample_width(self) -> u16 {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::I16 => 2,
            SampleFormat::I24 => 3,
            SampleFormat::I32 | SampleFormat::F32 => 4,
        }
    }

    pub fn bits_per_sample(self) -> u16 {
        self.sample_width() * 8
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleFormat::F32)
    }

    /// Map a WAV `(bits_per_sample, is_float)` pair to a sample format
    pub fn from_wav(bits_per_sample: u16, is_float: bool) -> Option<Self> {
        match (bits_per_sample, is_float) {
            (8, false) => Some(SampleFormat::U8),
            (16, false) => Some(SampleFormat::I16),
            (24, false) => Some(SampleFormat::I24),
            (32, false) => Some(SampleFormat::I32),
            (32, true) => Some(SampleFormat::F32),
            _ => None,
        }
    }

    /// Decode little-endian samples into f32 in [-1.0, 1.0].
    ///
    /// Trailing bytes that do not form a whole sample are ignored.
    pub fn decode_f32(self, bytes: &[u8], out: &mut Vec<f32>) {
        let width = self.sample_width() as usize;
        out.reserve(bytes.len() / width);
        for b in bytes.chunks_exact(width) {
            let sample = match self {
                SampleFormat::U8 => (b[0] as f32 - 128.0) / 128.0,
                SampleFormat::I16 => i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0,
                SampleFormat::I24 => {
                    let sign = if b[2] & 0x80 != 0 { 0xff } else { 0x00 };
                    i32::from_le_bytes([b[0], b[1], b[2], sign]) as f32 / 8_388_608.0
                }
                SampleFormat::I32 => {
                    i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0
                }
                SampleFormat::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            };
            out.push(sample);
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::U8 => write!(f, "8-bit unsigned PCM"),
            SampleFormat::I16 => write!(f, "16-bit PCM"),
            SampleFormat::I24 => write!(f, "24-bit PCM"),
            SampleFormat::I32 => write!(f, "32-bit PCM"),
            SampleFormat::F32 => write!(f, "32-bit float"),
        }
    }
}

/// Format parameters of an audio stream.
///
/// `frames_per_buffer` is the size of every blocking read or write, and
/// therefore bounds the latency of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub frames_per_buffer: u32,
}

impl StreamConfig {
    /// Capture configuration: always signed 16-bit samples
    pub fn capture(sample_rate: u32, channels: u16, frames_per_buffer: u32) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format: SampleFormat::I16,
            frames_per_buffer,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.sample_width() as usize
    }

    /// Bytes moved by one blocking read or write
    pub fn buffer_bytes(&self) -> usize {
        self.frames_per_buffer as usize * self.bytes_per_frame()
    }

    /// Samples (all channels) moved by one blocking read or write
    pub fn buffer_samples(&self) -> usize {
        self.frames_per_buffer as usize * self.channels as usize
    }

    /// Wall-clock time covered by one buffer
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_buffer as f64 / self.sample_rate.max(1) as f64)
    }

    /// Duration of `bytes` of audio in this format
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frames = bytes / self.bytes_per_frame().max(1);
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }

    pub fn validate(&self, direction: Direction) -> Result<(), AudioError> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidConfig(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.frames_per_buffer == 0 {
            return Err(AudioError::InvalidConfig(
                "frames per buffer must be positive".to_string(),
            ));
        }
        match direction {
            Direction::Capture => {
                if !matches!(self.channels, 1 | 2) {
                    return Err(AudioError::InvalidConfig(format!(
                        "capture supports 1 or 2 channels, got {}",
                        self.channels
                    )));
                }
                if self.sample_format != SampleFormat::I16 {
                    return Err(AudioError::InvalidConfig(format!(
                        "capture records 16-bit PCM, got {}",
                        self.sample_format
                    )));
                }
            }
            Direction::Playback => {
                if self.channels == 0 {
                    return Err(AudioError::InvalidConfig(
                        "playback needs at least one channel".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::capture(16000, 1, 4096)
    }
}

/// An audio device as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Position in the host's full device listing
    pub id: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
}

impl Device {
    pub fn max_channels(&self, direction: Direction) -> u16 {
        match direction {
            Direction::Capture => self.max_input_channels,
            Direction::Playback => self.max_output_channels,
        }
    }

    pub fn supports(&self, direction: Direction) -> bool {
        self.max_channels(direction) > 0
    }
}

/// One blocking read worth of captured audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedChunk {
    /// Interleaved little-endian i16 samples
    pub data: Vec<u8>,
    /// The driver dropped samples before this chunk was read
    pub overrun: bool,
}

/// Reading half of a capture stream. Lent to the capture thread.
pub trait FrameSource: Send {
    /// Block until `frames` frames have been captured.
    ///
    /// `Ok(None)` means the source has ended and will produce nothing more.
    fn read(&mut self, frames: usize) -> Result<Option<CapturedChunk>, AudioError>;

    /// Drop everything captured so far and clear the overrun flag, so the
    /// next read starts at the current instant.
    fn discard_pending(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Writing half of a playback stream
pub trait FrameSink {
    /// Queue `data` (in the stream's sample format), blocking while the
    /// device is behind.
    fn write(&mut self, data: &[u8]) -> Result<(), AudioError>;

    /// Block until everything written so far has been played
    fn drain(&mut self) -> Result<(), AudioError>;
}

/// Owning half of an open stream. Dropping it releases the hardware.
pub trait StreamControl {
    fn stop(&mut self) -> Result<(), AudioError>;
}

/// What a backend hands back when it opens a stream
pub struct OpenedStream<Io> {
    pub io: Io,
    pub control: Box<dyn StreamControl>,
}

/// The host audio subsystem
pub trait AudioHost {
    /// Human-readable host name (e.g. "ALSA")
    fn name(&self) -> String;

    /// Query every device the host reports, in index order.
    /// Never cached: each call returns fresh values.
    fn devices(&self) -> Result<Vec<Device>, AudioError>;

    /// Index of the host default device for `direction`, if any
    fn default_device(&self, direction: Direction) -> Result<Option<usize>, AudioError>;

    fn open_capture(
        &self,
        device: usize,
        config: &StreamConfig,
    ) -> Result<OpenedStream<Box<dyn FrameSource>>, AudioError>;

    fn open_playback(
        &self,
        device: usize,
        config: &StreamConfig,
    ) -> Result<OpenedStream<Box<dyn FrameSink>>, AudioError>;
}

/// Factory function to create the configured host
pub fn create_host(config: &AudioConfig) -> Result<Box<dyn AudioHost>, AudioError> {
    Ok(Box::new(cpal_host::CpalHost::new(&config.host)?))
}
