//! Waveform container codec
//!
//! RIFF/WAVE files through hound. Payloads move through the rest of the crate
//! as little-endian byte chunks in the stream's sample format; this module is
//! the only place that converts between those bytes and hound's typed samples.

use crate::audio::{SampleFormat, StreamConfig};
use crate::error::WaveformError;
use hound::{WavIntoSamples, WavReader, WavSpec, WavWriter};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

/// Sample encoding recorded in the container header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    /// Integer PCM
    None,
    /// 32-bit IEEE float
    IeeeFloat,
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionType::None => write!(f, "NONE"),
            CompressionType::IeeeFloat => write!(f, "FLOAT"),
        }
    }
}

/// Parsed waveform header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformHeader {
    pub channels: u16,
    /// Bytes per sample
    pub sample_width: u16,
    pub frame_rate: u32,
    pub compression: CompressionType,
    pub frame_count: u32,
}

impl WaveformHeader {
    fn from_spec(spec: WavSpec, frame_count: u32) -> Result<Self, WaveformError> {
        let is_float = spec.sample_format == hound::SampleFormat::Float;
        if SampleFormat::from_wav(spec.bits_per_sample, is_float).is_none() {
            return Err(WaveformError::Format(format!(
                "unsupported sample encoding: {} bits {}",
                spec.bits_per_sample,
                if is_float { "float" } else { "integer" }
            )));
        }
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(WaveformError::Format(format!(
                "header declares {} channel(s) at {} Hz",
                spec.channels, spec.sample_rate
            )));
        }

        Ok(Self {
            channels: spec.channels,
            sample_width: spec.bits_per_sample.div_ceil(8),
            frame_rate: spec.sample_rate,
            compression: if is_float {
                CompressionType::IeeeFloat
            } else {
                CompressionType::None
            },
            frame_count,
        })
    }

    pub fn sample_format(&self) -> Result<SampleFormat, WaveformError> {
        SampleFormat::from_wav(
            self.sample_width * 8,
            self.compression == CompressionType::IeeeFloat,
        )
        .ok_or_else(|| {
            WaveformError::Format(format!("unsupported sample width: {}", self.sample_width))
        })
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_width as usize
    }

    pub fn payload_bytes(&self) -> usize {
        self.frame_count as usize * self.bytes_per_frame()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count as f64 / self.frame_rate.max(1) as f64)
    }
}

impl StreamConfig {
    /// Stream configuration that plays a file with this header unchanged
    pub fn from_header(
        header: &WaveformHeader,
        frames_per_buffer: u32,
    ) -> Result<Self, WaveformError> {
        Ok(Self {
            sample_rate: header.frame_rate,
            channels: header.channels,
            sample_format: header.sample_format()?,
            frames_per_buffer,
        })
    }
}

fn wav_spec(config: &StreamConfig) -> WavSpec {
    WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: config.sample_format.bits_per_sample(),
        sample_format: if config.sample_format.is_float() {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    }
}

/// Serialize captured chunks to a new waveform file at `path`.
///
/// Chunks are concatenated in order into one payload. The file is finalized
/// (header sizes patched) and closed before this returns. A payload that is
/// not a whole number of frames is rejected before the file is created.
pub fn write<C: AsRef<[u8]>>(
    path: &Path,
    chunks: &[C],
    config: &StreamConfig,
) -> Result<WaveformHeader, WaveformError> {
    let bytes_per_frame = config.bytes_per_frame();
    let width = config.sample_format.sample_width() as usize;
    let payload: usize = chunks.iter().map(|c| c.as_ref().len()).sum();
    if bytes_per_frame == 0 || payload % bytes_per_frame != 0 {
        return Err(WaveformError::Format(format!(
            "payload of {} bytes is not a whole number of {}-byte frames",
            payload, bytes_per_frame
        )));
    }

    let spec = wav_spec(config);
    let mut writer = WavWriter::create(path, spec)?;

    // A sample may straddle a chunk boundary
    let mut carry: Vec<u8> = Vec::with_capacity(width);
    for chunk in chunks {
        let mut bytes = chunk.as_ref();
        if !carry.is_empty() {
            let take = (width - carry.len()).min(bytes.len());
            carry.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if carry.len() == width {
                write_sample(&mut writer, config.sample_format, &carry)?;
                carry.clear();
            }
        }
        let mut samples = bytes.chunks_exact(width);
        for sample in &mut samples {
            write_sample(&mut writer, config.sample_format, sample)?;
        }
        carry.extend_from_slice(samples.remainder());
    }

    writer.finalize()?;

    let header = WaveformHeader::from_spec(spec, (payload / bytes_per_frame) as u32)?;
    tracing::debug!(
        "Wrote {:?}: {} frames, {} Hz, {} channel(s), {}",
        path,
        header.frame_count,
        header.frame_rate,
        header.channels,
        config.sample_format
    );
    Ok(header)
}

fn write_sample<W>(
    writer: &mut WavWriter<W>,
    format: SampleFormat,
    b: &[u8],
) -> Result<(), WaveformError>
where
    W: std::io::Write + std::io::Seek,
{
    match format {
        // hound takes signed 8-bit values and stores them offset by 128
        SampleFormat::U8 => writer.write_sample((b[0] as i16 - 128) as i8)?,
        SampleFormat::I16 => writer.write_sample(i16::from_le_bytes([b[0], b[1]]))?,
        SampleFormat::I24 => {
            let sign = if b[2] & 0x80 != 0 { 0xff } else { 0x00 };
            writer.write_sample(i32::from_le_bytes([b[0], b[1], b[2], sign]))?
        }
        SampleFormat::I32 => writer.write_sample(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))?,
        SampleFormat::F32 => writer.write_sample(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))?,
    }
    Ok(())
}

/// Read and validate the header of a waveform file
pub fn read_header(path: &Path) -> Result<WaveformHeader, WaveformError> {
    let reader = WavReader::open(path)?;
    WaveformHeader::from_spec(reader.spec(), reader.duration())
}

enum Samples {
    Int(WavIntoSamples<BufReader<File>, i32>),
    Float(WavIntoSamples<BufReader<File>, f32>),
}

/// Lazy reader over the payload of a waveform file, in fixed-size chunks
pub struct FrameChunks {
    header: WaveformHeader,
    format: SampleFormat,
    samples: Samples,
    chunk_samples: usize,
    finished: bool,
}

/// Open `path` for sequential reading in chunks of `chunk_frames` frames.
///
/// Every chunk except possibly the last is `chunk_frames * bytes_per_frame`
/// bytes. The header is validated before any payload is read.
pub fn read_frames(path: &Path, chunk_frames: usize) -> Result<FrameChunks, WaveformError> {
    if chunk_frames == 0 {
        return Err(WaveformError::Format(
            "chunk size must be at least one frame".to_string(),
        ));
    }

    let reader = WavReader::open(path)?;
    let header = WaveformHeader::from_spec(reader.spec(), reader.duration())?;
    let format = header.sample_format()?;
    let samples = if format.is_float() {
        Samples::Float(reader.into_samples::<f32>())
    } else {
        Samples::Int(reader.into_samples::<i32>())
    };

    Ok(FrameChunks {
        header,
        format,
        samples,
        chunk_samples: chunk_frames * header.channels as usize,
        finished: false,
    })
}

impl FrameChunks {
    pub fn header(&self) -> &WaveformHeader {
        &self.header
    }

    fn next_sample(&mut self, out: &mut Vec<u8>) -> Option<Result<(), WaveformError>> {
        let encoded = match &mut self.samples {
            Samples::Float(samples) => samples
                .next()?
                .map(|s| out.extend_from_slice(&s.to_le_bytes())),
            Samples::Int(samples) => {
                let format = self.format;
                samples.next()?.map(|s| match format {
                    SampleFormat::U8 => out.push((s + 128) as u8),
                    SampleFormat::I16 => out.extend_from_slice(&(s as i16).to_le_bytes()),
                    SampleFormat::I24 => out.extend_from_slice(&s.to_le_bytes()[..3]),
                    SampleFormat::I32 | SampleFormat::F32 => {
                        out.extend_from_slice(&s.to_le_bytes())
                    }
                })
            }
        };
        Some(encoded.map_err(WaveformError::from))
    }
}

impl Iterator for FrameChunks {
    type Item = Result<Vec<u8>, WaveformError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let width = self.format.sample_width() as usize;
        let mut chunk = Vec::with_capacity(self.chunk_samples * width);
        for _ in 0..self.chunk_samples {
            match self.next_sample(&mut chunk) {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}

/// Check the PCM16 mono contract consumers of recordings rely on
pub fn validate_pcm16_mono(header: &WaveformHeader) -> Result<(), WaveformError> {
    if header.channels != 1 || header.sample_width != 2 || header.compression != CompressionType::None
    {
        return Err(WaveformError::Format(format!(
            "Audio input file must be WAV, mono, 16-bit PCM (got {} channel(s), {}-byte samples, compression {})",
            header.channels, header.sample_width, header.compression
        )));
    }
    Ok(())
}

/// Read the header of `path` and check it is PCM16 mono
pub fn check_pcm16_mono(path: &Path) -> Result<WaveformHeader, WaveformError> {
    let header = read_header(path)?;
    validate_pcm16_mono(&header)?;
    Ok(header)
}
