//! Playback of waveform files
//!
//! Reads a file sequentially and feeds it to an output stream opened with
//! the file's own format, one buffer at a time.

use crate::audio::{self, AudioHost, PlaybackStream, StreamConfig};
use crate::error::{Result, VoxrecError};
use crate::wav::{self, FrameChunks};
use std::path::Path;
use std::time::Duration;

/// What was played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Number of writes to the device
    pub chunks: usize,
    pub bytes: usize,
    pub duration: Duration,
}

/// Play `path` on `device`, or the default output device when `None`.
///
/// Blocks until the whole file has been played. The output stream is closed
/// on every path, including read and write failures.
pub fn play(
    host: &dyn AudioHost,
    path: &Path,
    device: Option<usize>,
    frames_per_buffer: u32,
) -> Result<PlaybackSummary> {
    let reader = wav::read_frames(path, frames_per_buffer.max(1) as usize)?;
    let header = *reader.header();
    let config = StreamConfig::from_header(&header, frames_per_buffer)?;
    tracing::info!(
        "Playing {:?}: {} Hz, {} channel(s), {}, {:.2}s",
        path,
        config.sample_rate,
        config.channels,
        config.sample_format,
        header.duration().as_secs_f64()
    );

    let mut stream = audio::open_playback(host, &config, device)?;
    let played = feed(&mut stream, reader);
    let drained = match &played {
        Ok(_) => stream.drain().map_err(VoxrecError::from),
        Err(_) => Ok(()),
    };
    let closed = stream.close();

    let summary = played?;
    drained?;
    closed?;

    tracing::debug!(
        "Played {} chunk(s), {} bytes",
        summary.chunks,
        summary.bytes
    );
    Ok(summary)
}

fn feed(stream: &mut PlaybackStream, reader: FrameChunks) -> Result<PlaybackSummary> {
    let config = *stream.config();
    let mut summary = PlaybackSummary {
        chunks: 0,
        bytes: 0,
        duration: Duration::ZERO,
    };

    for chunk in reader {
        let chunk = chunk?;
        stream.write(&chunk)?;
        summary.chunks += 1;
        summary.bytes += chunk.len();
    }

    summary.duration = config.duration_of(summary.bytes);
    Ok(summary)
}
