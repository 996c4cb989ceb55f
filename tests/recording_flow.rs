//! End-to-end recording flows: source -> detector -> controller -> sink,
//! driven the same way the sentryd loop drives them.

use std::time::{Duration, Instant};

use sentrycam::{
    CpuBackend, DetectorBackend, FileSource, Frame, FrameSource, MjpegAviRecorder,
    RecordingController, SessionEvent, SinkCall, StubBackend, StubRecorder,
};

fn frame() -> Frame {
    Frame::new(vec![0u8; 64 * 48 * 3], 64, 48)
}

#[test]
fn abrupt_end_of_stream_finalizes_the_open_session_exactly_once() {
    let recorder = StubRecorder::new();
    let log = recorder.log_handle();
    let mut controller =
        RecordingController::new(Box::new(recorder), Duration::from_secs(5), 20.0);
    let mut backend = StubBackend::with_script(std::iter::repeat(true).take(10));

    let frame = frame();
    let base = Instant::now();
    for tick in 0..10u64 {
        let result = backend.detect(&frame.data, frame.width, frame.height).unwrap();
        controller
            .tick(result.presence(), &frame, base + Duration::from_millis(tick * 50))
            .unwrap();
    }
    assert!(controller.is_recording());

    // The frame source ends here; the driver still owes the finalize.
    let event = controller.shutdown().unwrap();
    assert!(matches!(event, Some(SessionEvent::Stopped { .. })));

    let finalizes = log
        .lock()
        .unwrap()
        .iter()
        .filter(|call| matches!(call, SinkCall::Finalize { .. }))
        .count();
    assert_eq!(finalizes, 1);

    let stats = controller.stats();
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.sessions_stopped, 1);
}

#[test]
fn one_presence_episode_produces_one_playable_avi() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = MjpegAviRecorder::new(dir.path(), 85);
    let mut controller =
        RecordingController::new(Box::new(recorder), Duration::from_secs(1), 20.0);

    let frame = frame();
    let base = Instant::now();
    let script = [true, true, true, false, false, false];
    let mut stopped = 0;
    for (tick, &presence) in script.iter().enumerate() {
        let now = base + Duration::from_secs(tick as u64);
        let outcome = controller.tick(presence, &frame, now).unwrap();
        if matches!(outcome.event, Some(SessionEvent::Stopped { .. })) {
            stopped += 1;
        }
    }
    assert_eq!(stopped, 1);
    assert!(!controller.is_recording());

    let avi_files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                == Some("avi")
        })
        .collect();
    assert_eq!(avi_files.len(), 1);

    let bytes = std::fs::read(avi_files[0].path()).unwrap();
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"AVI ");
    let riff_size = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    assert_eq!(riff_size as usize + 8, bytes.len());

    // Three presence ticks plus the within-grace tick; the stop tick itself
    // is not written.
    let total_frames = u32::from_le_bytes(bytes[48..52].try_into().unwrap());
    assert_eq!(total_frames, 4);
}

#[test]
fn synthetic_file_replay_records_the_visitor_episode_and_ends_cleanly() {
    let mut source = FileSource::new(sentrycam::ingest::file::FileConfig {
        path: "stub://clip".to_string(),
        target_fps: 20,
    })
    .unwrap();
    source.connect().unwrap();

    let mut backend = CpuBackend::new();
    let recorder = StubRecorder::new();
    let log = recorder.log_handle();
    let mut controller =
        RecordingController::new(Box::new(recorder), Duration::from_secs(1), 20.0);

    let base = Instant::now();
    let mut tick = 0u64;
    while let Some(frame) = source.next_frame().unwrap() {
        let result = backend.detect(&frame.data, frame.width, frame.height).unwrap();
        let now = base + Duration::from_millis(tick * 50);
        controller.tick(result.presence(), &frame, now).unwrap();
        tick += 1;
    }

    // The visitor crosses mid-clip and leaves; with a one-second grace the
    // session closes before the clip runs out.
    let stats = controller.stats();
    assert_eq!(stats.sessions_started, 1);
    assert_eq!(stats.sessions_stopped, 1);
    assert!(!controller.is_recording());
    assert!(controller.shutdown().unwrap().is_none());

    let calls = log.lock().unwrap();
    let opens = calls
        .iter()
        .filter(|call| matches!(call, SinkCall::Open { .. }))
        .count();
    let finalizes = calls
        .iter()
        .filter(|call| matches!(call, SinkCall::Finalize { .. }))
        .count();
    assert_eq!(opens, 1);
    assert_eq!(finalizes, 1);
}

#[test]
fn session_counts_balance_over_a_noisy_run() {
    let recorder = StubRecorder::new();
    let mut controller =
        RecordingController::new(Box::new(recorder), Duration::from_secs(2), 20.0);
    let script = [
        false, true, false, true, true, false, false, false, false, true, true, false, true,
        false, false, false, false, true,
    ];
    let mut backend = StubBackend::with_script(script);

    let frame = frame();
    let base = Instant::now();
    for tick in 0..script.len() as u64 {
        let result = backend.detect(&frame.data, frame.width, frame.height).unwrap();
        controller
            .tick(result.presence(), &frame, base + Duration::from_secs(tick))
            .unwrap();
    }

    let stats = controller.stats();
    let open = if controller.is_recording() { 1 } else { 0 };
    assert_eq!(stats.sessions_started, stats.sessions_stopped + open);
    assert!(stats.sessions_started >= 2);
}
