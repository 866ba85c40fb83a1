//! Start/stop trigger sources
//!
//! A recording is bracketed by two blocking events. The session does not
//! care where they come from: the console, another thread, or a timer.

use crate::error::TriggerError;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

/// Events delivered to a [`ChannelTrigger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Start,
    Stop,
}

impl TriggerEvent {
    fn as_str(self) -> &'static str {
        match self {
            TriggerEvent::Start => "start",
            TriggerEvent::Stop => "stop",
        }
    }
}

/// A blocking source of the start and stop events of one recording
pub trait Trigger {
    /// Block until capture should begin
    fn wait_for_start(&mut self) -> Result<(), TriggerError>;

    /// Block until capture should end
    fn wait_for_stop(&mut self) -> Result<(), TriggerError>;
}

/// Prompts on a writer and waits for a line on a reader
pub struct ConsoleTrigger<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsoleTrigger<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, message: &str, event: TriggerEvent) -> Result<(), TriggerError> {
        writeln!(self.output, "{}", message)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(TriggerError::Closed(event.as_str()));
        }
        Ok(())
    }
}

impl ConsoleTrigger<io::StdinLock<'static>, io::Stdout> {
    /// Trigger driven by the terminal
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Trigger for ConsoleTrigger<R, W> {
    fn wait_for_start(&mut self) -> Result<(), TriggerError> {
        self.prompt("Press <ENTER> to start recording...", TriggerEvent::Start)
    }

    fn wait_for_stop(&mut self) -> Result<(), TriggerError> {
        self.prompt("Press <ENTER> to stop the recording", TriggerEvent::Stop)
    }
}

/// Waits for events sent from another thread
pub struct ChannelTrigger {
    rx: Receiver<TriggerEvent>,
}

impl ChannelTrigger {
    pub fn new(rx: Receiver<TriggerEvent>) -> Self {
        Self { rx }
    }

    /// Create a trigger together with the sender that drives it
    pub fn pair() -> (Sender<TriggerEvent>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }

    fn expect(&mut self, expected: TriggerEvent) -> Result<(), TriggerError> {
        match self.rx.recv() {
            Ok(event) if event == expected => Ok(()),
            Ok(event) => Err(TriggerError::UnexpectedEvent {
                expected: expected.as_str(),
                got: event.as_str(),
            }),
            Err(_) => Err(TriggerError::Closed(expected.as_str())),
        }
    }
}

impl Trigger for ChannelTrigger {
    fn wait_for_start(&mut self) -> Result<(), TriggerError> {
        self.expect(TriggerEvent::Start)
    }

    fn wait_for_stop(&mut self) -> Result<(), TriggerError> {
        self.expect(TriggerEvent::Stop)
    }
}

/// Starts immediately and stops after a fixed duration
pub struct TimedTrigger {
    duration: Duration,
}

impl TimedTrigger {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Trigger for TimedTrigger {
    fn wait_for_start(&mut self) -> Result<(), TriggerError> {
        tracing::info!("Recording for {:.1}s", self.duration.as_secs_f64());
        Ok(())
    }

    fn wait_for_stop(&mut self) -> Result<(), TriggerError> {
        std::thread::sleep(self.duration);
        Ok(())
    }
}
