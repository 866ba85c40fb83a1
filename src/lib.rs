//! Voxrec: audio capture to WAV and WAV playback
//!
//! This library provides the core functionality for:
//! - Enumerating audio devices and classifying them as microphones/speakers
//! - Opening and closing hardware streams via cpal (PipeWire, PulseAudio, ALSA)
//! - Capturing on a dedicated thread between a start and a stop trigger
//! - Reading and writing RIFF/WAVE files via hound
//! - Playing WAV files back in fixed-size chunks
//!
//! # Architecture
//!
//! ```text
//!          ┌──────────────┐         ┌──────────────┐
//!          │   Trigger    │         │   Devices    │
//!          │ (console/..) │         │  (AudioHost) │
//!          └──────────────┘         └──────────────┘
//!                 │ start/stop              │ device index
//!                 ▼                         ▼
//!          ┌─────────────────────────────────────────────────┐
//!          │                Recording Session                │
//!          │  Idle ─▶ Armed ─▶ Capturing ─▶ Draining ─▶ Stopped │
//!          └─────────────────────────────────────────────────┘
//!                 │ owns stream             ▲ FrameBuffer
//!                 ▼                         │
//!          ┌──────────────┐         ┌──────────────┐
//!          │ AudioStream  │ ──────▶ │   Capture    │
//!          │   (cpal)     │  reads  │    thread    │
//!          └──────────────┘         └──────────────┘
//!                                           │
//!                                           ▼ frames
//!                                   ┌──────────────┐
//!                                   │  WAV codec   │
//!                                   │   (hound)    │
//!                                   └──────────────┘
//!                                           │
//!                                           ▼ file
//!                                   ┌──────────────┐
//!                                   │   Playback   │
//!                                   └──────────────┘
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;
pub mod state;
pub mod trigger;
pub mod wav;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::{Result, VoxrecError};
pub use session::{record_to_file, RecordingSession};
