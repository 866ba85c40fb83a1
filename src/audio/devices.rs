//! Device enumeration and interactive device selection

use super::{AudioHost, Device, Direction};
use crate::error::{AudioError, DeviceChoiceError, VoxrecError};
use std::io::{BufRead, Write};

const PROMPT_RULE: &str = "*****************************";

/// Devices split by capability. A device with both input and output
/// channels appears in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList {
    pub microphones: Vec<Device>,
    pub speakers: Vec<Device>,
}

impl DeviceList {
    /// Classify devices, keeping the host's index order
    pub fn classify(devices: Vec<Device>) -> Self {
        let mut list = DeviceList::default();
        for device in devices {
            if device.supports(Direction::Playback) {
                list.speakers.push(device.clone());
            }
            if device.supports(Direction::Capture) {
                list.microphones.push(device);
            }
        }
        list
    }

    /// Devices usable for `direction`
    pub fn candidates(&self, direction: Direction) -> &[Device] {
        match direction {
            Direction::Capture => &self.microphones,
            Direction::Playback => &self.speakers,
        }
    }
}

/// Query the host for its devices and classify them.
///
/// The device list is rebuilt on every call.
pub fn list_devices(host: &dyn AudioHost) -> Result<DeviceList, AudioError> {
    let devices = host.devices()?;
    tracing::debug!("{} reported {} device(s)", host.name(), devices.len());
    Ok(DeviceList::classify(devices))
}

/// Render the device selection prompt
pub fn format_device_prompt(devices: &[Device]) -> String {
    let mut prompt = format!("\n{}\nSelect a device to use:\n\n", PROMPT_RULE);
    for device in devices {
        prompt.push_str(&format!("\t{}. {}\n", device.id, device.name));
    }
    prompt.push_str(&format!("\n{}\n", PROMPT_RULE));
    prompt
}

/// Parse one answer to the device prompt
pub fn parse_device_choice(input: &str, devices: &[Device]) -> Result<usize, DeviceChoiceError> {
    let index: usize = input
        .trim()
        .parse()
        .map_err(|_| DeviceChoiceError::NotANumber)?;
    if devices.iter().any(|d| d.id == index) {
        Ok(index)
    } else {
        Err(DeviceChoiceError::NotListed(index))
    }
}

/// Ask the user to pick a device for `direction`, re-prompting until the
/// answer names a listed device.
pub fn prompt_for_device<R: BufRead, W: Write>(
    host: &dyn AudioHost,
    direction: Direction,
    mut input: R,
    mut output: W,
) -> Result<usize, VoxrecError> {
    let list = list_devices(host)?;
    let devices = list.candidates(direction);
    if devices.is_empty() {
        return Err(AudioError::NoDevices(direction).into());
    }

    let prompt = format_device_prompt(devices);
    loop {
        write!(output, "{}", prompt)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(VoxrecError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "no device selected",
            )));
        }

        match parse_device_choice(&line, devices) {
            Ok(index) => return Ok(index),
            Err(e) => writeln!(output, "\nERROR: {}.\n", e)?,
        }
    }
}
