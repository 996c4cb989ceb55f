use std::sync::Mutex;

use tempfile::NamedTempFile;

use sentrycam::config::SentrydConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTRY_CONFIG",
        "SENTRY_CAMERA_DEVICE",
        "SENTRY_DETECTOR_BACKEND",
        "SENTRY_OUTPUT_DIR",
        "SENTRY_GRACE_SECS",
        "SENTRY_FRAME_RATE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentrydConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://front_door");
    assert_eq!(cfg.camera.target_fps, 20);
    assert_eq!(cfg.camera.width, 640);
    assert_eq!(cfg.camera.height, 480);
    assert_eq!(cfg.detector.backend, "cpu");
    assert_eq!(cfg.recording.output_dir, "recordings");
    assert_eq!(cfg.recording.grace_secs, 5.0);
    assert_eq!(cfg.recording.frame_rate, 20.0);

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "camera": {
            "device": "/dev/video2",
            "target_fps": 15,
            "width": 800,
            "height": 600,
            "max_probe_index": 3
        },
        "detector": {
            "backend": "stub",
            "threshold": 8.5
        },
        "recording": {
            "output_dir": "/var/lib/sentry/recordings",
            "grace_secs": 10.0,
            "frame_rate": 25.0,
            "jpeg_quality": 90
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTRY_CONFIG", file.path());
    std::env::set_var("SENTRY_CAMERA_DEVICE", "stub://garage");
    std::env::set_var("SENTRY_GRACE_SECS", "2.5");

    let cfg = SentrydConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://garage");
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.camera.max_probe_index, 3);
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.detector.threshold, Some(8.5));
    assert_eq!(cfg.recording.output_dir, "/var/lib/sentry/recordings");
    assert_eq!(cfg.recording.grace_secs, 2.5);
    assert_eq!(cfg.recording.frame_rate, 25.0);
    assert_eq!(cfg.recording.jpeg_quality, 90);

    clear_env();
}

#[test]
fn rejects_invalid_grace_and_frame_rate() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTRY_GRACE_SECS", "-1");
    assert!(SentrydConfig::load().is_err());
    std::env::remove_var("SENTRY_GRACE_SECS");

    std::env::set_var("SENTRY_FRAME_RATE", "0");
    assert!(SentrydConfig::load().is_err());
    std::env::remove_var("SENTRY_FRAME_RATE");

    std::env::set_var("SENTRY_GRACE_SECS", "soon");
    assert!(SentrydConfig::load().is_err());

    clear_env();
}
