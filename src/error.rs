//! Error types for voxrec
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide users toward fixing common issues.

use crate::audio::Direction;
use crate::state::SessionState;
use thiserror::Error;

/// Top-level error type for the voxrec application
#[derive(Error, Debug)]
pub enum VoxrecError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Waveform error: {0}")]
    Waveform(#[from] WaveformError),

    #[error("Recording session error: {0}")]
    Session(#[from] SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the host audio layer and stream lifecycle
#[derive(Error, Debug)]
pub enum AudioError {
    /// The host audio subsystem could not be initialised. Not retried.
    #[error("Audio subsystem unavailable: {0}")]
    Subsystem(String),

    #[error("Audio device {index} unavailable: {reason}")]
    DeviceUnavailable { index: usize, reason: String },

    #[error("No default {0} device. List devices with: voxrec devices")]
    NoDefaultDevice(Direction),

    #[error("No {0} devices found")]
    NoDevices(Direction),

    /// The hardware exists but could not be claimed (in use, rejected config).
    #[error("Audio device {index} busy: {reason}")]
    DeviceBusy { index: usize, reason: String },

    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}

/// Rejected answers to the interactive device prompt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceChoiceError {
    #[error("Input must be whole number")]
    NotANumber,

    #[error("You must select a number from the list")]
    NotListed(usize),
}

/// Errors related to the WAV container
#[derive(Error, Debug)]
pub enum WaveformError {
    #[error("Invalid waveform file: {0}")]
    Format(String),

    #[error("Waveform IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for WaveformError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => WaveformError::Io(io),
            other => WaveformError::Format(other.to_string()),
        }
    }
}

/// Errors raised by the start/stop trigger sources
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Trigger input closed before the {0} event")]
    Closed(&'static str),

    #[error("Expected a {expected} event, got {got}")]
    UnexpectedEvent {
        expected: &'static str,
        got: &'static str,
    },

    #[error("Trigger IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the recording session state machine
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cannot {operation} while the session is {state}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("Captured frames were already saved")]
    FramesConsumed,

    #[error("Capture thread panicked")]
    WorkerPanicked,

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Waveform(#[from] WaveformError),
}

/// Result type alias using VoxrecError
pub type Result<T> = std::result::Result<T, VoxrecError>;
