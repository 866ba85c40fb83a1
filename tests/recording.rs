//! End-to-end recording tests against the in-memory audio host

use std::path::PathBuf;
use tempfile::TempDir;
use voxrec::audio::memory::MemoryHost;
use voxrec::audio::{Device, StreamConfig};
use voxrec::error::{AudioError, SessionError};
use voxrec::session::{record_to_file, RecordingSession};
use voxrec::state::SessionState;
use voxrec::trigger::{ChannelTrigger, TriggerEvent};
use voxrec::wav;

fn microphone_host() -> MemoryHost {
    MemoryHost::new(vec![
        Device {
            id: 0,
            name: "Built-in Microphone".to_string(),
            max_input_channels: 2,
            max_output_channels: 0,
        },
        Device {
            id: 1,
            name: "Built-in Output".to_string(),
            max_input_channels: 0,
            max_output_channels: 2,
        },
    ])
    .with_default_input(0)
    .with_default_output(1)
}

/// 4096 frames of mono PCM16 whose samples all equal `value`
fn buffer(value: i16) -> Vec<u8> {
    std::iter::repeat(value.to_le_bytes())
        .take(4096)
        .flatten()
        .collect()
}

fn output_path(dir: &TempDir) -> PathBuf {
    dir.path().join("recording.wav")
}

#[test]
fn test_record_three_buffers_and_save() {
    let dir = TempDir::new().unwrap();
    let (tx, mut trigger) = ChannelTrigger::pair();
    let host = microphone_host()
        .with_capture([buffer(1), buffer(2), buffer(3)])
        .stop_at_end_of_input(tx.clone());
    tx.send(TriggerEvent::Start).unwrap();

    let config = StreamConfig::capture(16000, 1, 4096);
    let mut session = RecordingSession::new(config);
    session.arm(&host, None).unwrap();
    assert!(host.is_claimed(0));

    session.run(&mut trigger).unwrap();
    assert!(!host.is_claimed(0));
    assert_eq!(
        session.history(),
        &[
            SessionState::Idle,
            SessionState::Armed,
            SessionState::Capturing,
            SessionState::Draining,
            SessionState::Stopped,
        ]
    );

    let frames = session.frames().unwrap();
    assert_eq!(frames.len(), 3);
    assert!(frames.chunks().iter().all(|c| c.len() == 8192));

    let path = output_path(&dir);
    let header = session.save(&path).unwrap();
    assert_eq!(header.frame_rate, 16000);
    assert_eq!(header.channels, 1);
    assert_eq!(header.sample_width, 2);
    assert_eq!(header.payload_bytes(), 24576);

    let on_disk = wav::check_pcm16_mono(&path).unwrap();
    assert_eq!(on_disk, header);

    let payload: Vec<u8> = wav::read_frames(&path, 4096)
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect::<Vec<_>>()
        .concat();
    assert_eq!(payload, [buffer(1), buffer(2), buffer(3)].concat());
}

#[test]
fn test_save_before_stopped_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut session = RecordingSession::new(StreamConfig::default());
    assert!(matches!(
        session.save(&output_path(&dir)),
        Err(SessionError::InvalidState {
            state: SessionState::Idle,
            ..
        })
    ));

    let host = microphone_host();
    session.arm(&host, Some(0)).unwrap();
    assert!(matches!(
        session.save(&output_path(&dir)),
        Err(SessionError::InvalidState {
            state: SessionState::Armed,
            ..
        })
    ));
    assert!(!output_path(&dir).exists());
}

#[test]
fn test_arm_twice_is_rejected() {
    let host = microphone_host();
    let mut session = RecordingSession::new(StreamConfig::default());
    session.arm(&host, None).unwrap();
    assert!(matches!(
        session.arm(&host, None),
        Err(SessionError::InvalidState {
            state: SessionState::Armed,
            operation: "arm"
        })
    ));
}

#[test]
fn test_overrun_chunks_are_kept() {
    let dir = TempDir::new().unwrap();
    let (tx, mut trigger) = ChannelTrigger::pair();
    let host = microphone_host()
        .with_capture([buffer(1)])
        .with_overrun_chunk(buffer(2))
        .with_capture([buffer(3)])
        .stop_at_end_of_input(tx.clone());
    tx.send(TriggerEvent::Start).unwrap();

    let mut session = RecordingSession::new(StreamConfig::default());
    session.arm(&host, None).unwrap();
    session.run(&mut trigger).unwrap();

    let frames = session.frames().unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames.overruns(), 1);

    let header = session.save(&output_path(&dir)).unwrap();
    assert_eq!(header.frame_count, 3 * 4096);
}

#[test]
fn test_record_to_file_stereo() {
    let dir = TempDir::new().unwrap();
    let (tx, mut trigger) = ChannelTrigger::pair();
    let chunk = vec![0u8; 4 * 512];
    let host = microphone_host()
        .with_capture([chunk.clone(), chunk])
        .stop_at_end_of_input(tx.clone());
    tx.send(TriggerEvent::Start).unwrap();

    let path = output_path(&dir);
    let header = record_to_file(
        &host,
        StreamConfig::capture(48000, 2, 512),
        Some(0),
        &mut trigger,
        &path,
    )
    .unwrap();

    assert_eq!(header.channels, 2);
    assert_eq!(header.frame_count, 1024);
    assert!(wav::check_pcm16_mono(&path).is_err());
    assert!(!host.is_claimed(0));
}

#[test]
fn test_record_to_file_on_busy_device() {
    let dir = TempDir::new().unwrap();
    let host = microphone_host();
    let mut holder = RecordingSession::new(StreamConfig::default());
    holder.arm(&host, Some(0)).unwrap();

    let (_tx, mut trigger) = ChannelTrigger::pair();
    let result = record_to_file(
        &host,
        StreamConfig::default(),
        Some(0),
        &mut trigger,
        &output_path(&dir),
    );
    assert!(matches!(result, Err(SessionError::Audio(_))));
    assert!(!output_path(&dir).exists());
}

#[test]
fn test_stop_from_another_thread_ends_live_capture() {
    let (tx, mut trigger) = ChannelTrigger::pair();
    let host = microphone_host().with_endless_capture(buffer(5));
    tx.send(TriggerEvent::Start).unwrap();

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        tx.send(TriggerEvent::Stop).unwrap();
    });

    let mut session = RecordingSession::new(StreamConfig::default());
    session.arm(&host, None).unwrap();
    session.run(&mut trigger).unwrap();
    stopper.join().unwrap();

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(
        session.history(),
        &[
            SessionState::Idle,
            SessionState::Armed,
            SessionState::Capturing,
            SessionState::Draining,
            SessionState::Stopped,
        ]
    );
    let frames = session.frames().unwrap();
    assert!(!frames.is_empty());
    assert!(frames.chunks().iter().all(|c| *c == buffer(5)));
    assert!(!host.is_claimed(0));
}

#[test]
fn test_record_to_file_keeps_frames_before_read_error() {
    let dir = TempDir::new().unwrap();
    let (tx, mut trigger) = ChannelTrigger::pair();
    let host = microphone_host()
        .with_capture([buffer(1), buffer(2), buffer(3)])
        .fail_read_at(2)
        .stop_at_end_of_input(tx.clone());
    tx.send(TriggerEvent::Start).unwrap();

    let path = output_path(&dir);
    let result = record_to_file(
        &host,
        StreamConfig::default(),
        None,
        &mut trigger,
        &path,
    );
    assert!(matches!(
        result,
        Err(SessionError::Audio(AudioError::Stream(_)))
    ));
    assert!(!host.is_claimed(0));

    let header = wav::check_pcm16_mono(&path).unwrap();
    assert_eq!(header.frame_count, 2 * 4096);
    let payload: Vec<u8> = wav::read_frames(&path, 4096)
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect::<Vec<_>>()
        .concat();
    assert_eq!(payload, [buffer(1), buffer(2)].concat());
}
