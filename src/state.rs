//! State machine for a recording session
//!
//! Defines the states of one capture:
//! Idle → Armed → Capturing → Draining → Stopped
//!
//! `Armed → Idle` and `Capturing → Idle` are the failure path, taken when the
//! start trigger fails or the capture thread cannot be started.

/// Recording session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No stream open
    #[default]
    Idle,

    /// Capture stream open, waiting for the start trigger
    Armed,

    /// Capture thread reading from the device
    Capturing,

    /// Stop requested, waiting for the capture thread to finish its last read
    Draining,

    /// Capture thread joined and stream closed; frames ready to save
    Stopped,
}

impl SessionState {
    /// Check if `next` is a legal successor of this state
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Armed)
                | (Armed, Capturing)
                | (Capturing, Draining)
                | (Draining, Stopped)
                | (Armed, Idle)
                | (Capturing, Idle)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Armed => "armed",
            SessionState::Capturing => "capturing",
            SessionState::Draining => "draining",
            SessionState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
