//! Playback tests against the in-memory audio host

use tempfile::TempDir;
use voxrec::audio::memory::MemoryHost;
use voxrec::audio::{Device, SampleFormat, StreamConfig};
use voxrec::error::{AudioError, VoxrecError};
use voxrec::playback::play;
use voxrec::wav;

fn speaker_host() -> MemoryHost {
    MemoryHost::new(vec![
        Device {
            id: 0,
            name: "USB Headset".to_string(),
            max_input_channels: 1,
            max_output_channels: 2,
        },
        Device {
            id: 1,
            name: "HDMI".to_string(),
            max_input_channels: 0,
            max_output_channels: 8,
        },
    ])
    .with_default_input(0)
    .with_default_output(1)
}

/// Distinct, ordered PCM16 payload of `frames` mono frames
fn ramp(frames: usize) -> Vec<u8> {
    (0..frames)
        .flat_map(|i| (i as i16).wrapping_mul(7).to_le_bytes())
        .collect()
}

#[test]
fn test_play_writes_every_byte_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ramp.wav");
    let payload = ramp(1000);
    wav::write(&path, &[payload.clone()], &StreamConfig::capture(16000, 1, 256)).unwrap();

    let host = speaker_host();
    let summary = play(&host, &path, None, 256).unwrap();

    assert_eq!(host.played(), payload);
    assert_eq!(host.write_sizes(), vec![512, 512, 512, 464]);
    assert_eq!(summary.chunks, 4);
    assert_eq!(summary.bytes, 2000);
    assert!(!host.is_claimed(1));
}

#[test]
fn test_play_uses_file_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("float.wav");
    let config = StreamConfig {
        sample_format: SampleFormat::F32,
        ..StreamConfig::capture(44100, 2, 64)
    };
    let payload: Vec<u8> = (0..128)
        .flat_map(|i| (i as f32 / 128.0).to_le_bytes())
        .collect();
    wav::write(&path, &[payload.clone()], &config).unwrap();

    let host = speaker_host();
    let summary = play(&host, &path, Some(0), 64).unwrap();
    assert_eq!(host.played(), payload);
    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.duration.as_micros(), 64 * 1_000_000 / 44100);
}

#[test]
fn test_write_failure_releases_device() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ramp.wav");
    wav::write(&path, &[ramp(1024)], &StreamConfig::capture(16000, 1, 256)).unwrap();

    let host = speaker_host().fail_write_at(2);
    let result = play(&host, &path, Some(1), 256);

    assert!(matches!(
        result,
        Err(VoxrecError::Audio(AudioError::Stream(_)))
    ));
    assert_eq!(host.write_sizes(), vec![512, 512]);
    assert!(!host.is_claimed(1));

    // The device can be opened again straight away
    let host_ok = speaker_host();
    assert!(play(&host_ok, &path, Some(1), 256).is_ok());
}

#[test]
fn test_input_only_device_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ramp.wav");
    wav::write(&path, &[ramp(16)], &StreamConfig::default()).unwrap();

    let host = MemoryHost::new(vec![Device {
        id: 0,
        name: "Mic".to_string(),
        max_input_channels: 1,
        max_output_channels: 0,
    }]);
    assert!(matches!(
        play(&host, &path, Some(0), 16),
        Err(VoxrecError::Audio(AudioError::DeviceUnavailable { index: 0, .. }))
    ));
    assert!(matches!(
        play(&host, &path, None, 16),
        Err(VoxrecError::Audio(AudioError::NoDefaultDevice(_)))
    ));
}

#[test]
fn test_record_then_play_round_trip() {
    use voxrec::session::RecordingSession;
    use voxrec::trigger::{ChannelTrigger, TriggerEvent};

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("take.wav");
    let (tx, mut trigger) = ChannelTrigger::pair();
    let captured = [ramp(128), ramp(128)];
    let host = speaker_host()
        .with_capture(captured.clone())
        .stop_at_end_of_input(tx.clone());
    tx.send(TriggerEvent::Start).unwrap();

    let mut session = RecordingSession::new(StreamConfig::capture(16000, 1, 128));
    session.arm(&host, Some(0)).unwrap();
    session.run(&mut trigger).unwrap();
    session.save(&path).unwrap();

    play(&host, &path, None, 128).unwrap();
    assert_eq!(host.played(), captured.concat());
}
