//! Stream lifecycle
//!
//! The only place hardware streams are opened. An [`AudioStream`] owns the
//! backend handle for its whole open interval; `close` consumes it, and a
//! stream dropped on an error path is released by `Drop`.

use super::{
    AudioHost, Direction, FrameSink, FrameSource, OpenedStream, StreamConfig, StreamControl,
};
use crate::error::AudioError;

/// An open hardware stream bound to one device, one direction and one config
pub struct AudioStream<Io> {
    io: Io,
    control: Option<Box<dyn StreamControl>>,
    direction: Direction,
    device: usize,
    config: StreamConfig,
}

pub type CaptureStream = AudioStream<Box<dyn FrameSource>>;
pub type PlaybackStream = AudioStream<Box<dyn FrameSink>>;

impl<Io> AudioStream<Io> {
    fn new(
        opened: OpenedStream<Io>,
        direction: Direction,
        device: usize,
        config: StreamConfig,
    ) -> Self {
        Self {
            io: opened.io,
            control: Some(opened.control),
            direction,
            device,
            config,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Stop the stream and release the hardware
    pub fn close(mut self) -> Result<(), AudioError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), AudioError> {
        let Some(mut control) = self.control.take() else {
            return Ok(());
        };
        let result = control.stop();
        drop(control);
        tracing::debug!("Closed {} stream on device {}", self.direction, self.device);
        result
    }
}

impl<Io> Drop for AudioStream<Io> {
    fn drop(&mut self) {
        if self.control.is_some() {
            if let Err(e) = self.release() {
                tracing::warn!("Failed to stop {} stream: {}", self.direction, e);
            }
        }
    }
}

impl CaptureStream {
    /// Blocking read of `frames` frames
    pub fn read(&mut self, frames: usize) -> Result<Option<super::CapturedChunk>, AudioError> {
        self.io.read(frames)
    }

    /// Borrow the reading half, e.g. to lend it to a capture thread while the
    /// stream itself stays with its owner.
    pub fn reader(&mut self) -> &mut dyn FrameSource {
        self.io.as_mut()
    }
}

impl PlaybackStream {
    /// Blocking write of one chunk
    pub fn write(&mut self, data: &[u8]) -> Result<(), AudioError> {
        self.io.write(data)
    }

    pub fn drain(&mut self) -> Result<(), AudioError> {
        self.io.drain()
    }
}

/// Open a capture stream on `device`, or on the host default input when `None`
pub fn open_capture(
    host: &dyn AudioHost,
    config: &StreamConfig,
    device: Option<usize>,
) -> Result<CaptureStream, AudioError> {
    config.validate(Direction::Capture)?;
    let index = resolve_device(host, Direction::Capture, config, device)?;
    let opened = host.open_capture(index, config)?;
    tracing::debug!(
        "Opened input stream on device {}: {} Hz, {} channel(s), {} frames/buffer",
        index,
        config.sample_rate,
        config.channels,
        config.frames_per_buffer
    );
    Ok(AudioStream::new(opened, Direction::Capture, index, *config))
}

/// Open a playback stream on `device`, or on the host default output when `None`.
///
/// `config` normally comes from the header of the file being played.
pub fn open_playback(
    host: &dyn AudioHost,
    config: &StreamConfig,
    device: Option<usize>,
) -> Result<PlaybackStream, AudioError> {
    config.validate(Direction::Playback)?;
    let index = resolve_device(host, Direction::Playback, config, device)?;
    let opened = host.open_playback(index, config)?;
    tracing::debug!(
        "Opened output stream on device {}: {} Hz, {} channel(s), {}",
        index,
        config.sample_rate,
        config.channels,
        config.sample_format
    );
    Ok(AudioStream::new(opened, Direction::Playback, index, *config))
}

/// Resolve "no preference" to the host default and check the device can
/// carry `config` in `direction`.
fn resolve_device(
    host: &dyn AudioHost,
    direction: Direction,
    config: &StreamConfig,
    requested: Option<usize>,
) -> Result<usize, AudioError> {
    let index = match requested {
        Some(index) => index,
        None => host
            .default_device(direction)?
            .ok_or(AudioError::NoDefaultDevice(direction))?,
    };

    let devices = host.devices()?;
    let device = devices
        .iter()
        .find(|d| d.id == index)
        .ok_or_else(|| AudioError::DeviceUnavailable {
            index,
            reason: "no such device".to_string(),
        })?;

    let max_channels = device.max_channels(direction);
    if max_channels == 0 {
        return Err(AudioError::DeviceUnavailable {
            index,
            reason: format!("'{}' has no {} channels", device.name, direction),
        });
    }
    if config.channels > max_channels {
        return Err(AudioError::DeviceUnavailable {
            index,
            reason: format!(
                "'{}' supports at most {} {} channel(s), {} requested",
                device.name, max_channels, direction, config.channels
            ),
        });
    }

    tracing::info!("Using {} device {}: {}", direction, index, device.name);
    Ok(index)
}
