use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CAMERA_DEVICE: &str = "stub://front_door";
const DEFAULT_TARGET_FPS: u32 = 20;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_MAX_PROBE_INDEX: u32 = 5;
const DEFAULT_DETECTOR_BACKEND: &str = "cpu";
const DEFAULT_OUTPUT_DIR: &str = "recordings";
const DEFAULT_GRACE_SECS: f64 = 5.0;
const DEFAULT_FRAME_RATE: f64 = 20.0;
const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Deserialize, Default)]
struct SentrydConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    recording: Option<RecordingConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    max_probe_index: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    threshold: Option<f32>,
    model_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordingConfigFile {
    output_dir: Option<String>,
    grace_secs: Option<f64>,
    frame_rate: Option<f64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct SentrydConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub recording: RecordingSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Camera device path, `stub://...`, `auto`, or a local video file.
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Highest device index tried when `device` is `auto`.
    pub max_probe_index: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub threshold: Option<f32>,
    pub model_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RecordingSettings {
    /// Directory receiving one file per session, or `stub://` for a dry run.
    pub output_dir: String,
    /// Continuous-absence time before a session is stopped.
    pub grace_secs: f64,
    /// Target encoding rate for new sinks.
    pub frame_rate: f64,
    pub jpeg_quality: u8,
}

impl RecordingSettings {
    pub fn grace(&self) -> Duration {
        Duration::from_secs_f64(self.grace_secs)
    }
}

impl SentrydConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTRY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentrydConfigFile) -> Self {
        let camera = CameraSettings {
            device: file
                .camera
                .as_ref()
                .and_then(|camera| camera.device.clone())
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            target_fps: file
                .camera
                .as_ref()
                .and_then(|camera| camera.target_fps)
                .unwrap_or(DEFAULT_TARGET_FPS),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(DEFAULT_WIDTH),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(DEFAULT_HEIGHT),
            max_probe_index: file
                .camera
                .and_then(|camera| camera.max_probe_index)
                .unwrap_or(DEFAULT_MAX_PROBE_INDEX),
        };
        let detector = DetectorSettings {
            backend: file
                .detector
                .as_ref()
                .and_then(|detector| detector.backend.clone())
                .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
            threshold: file.detector.as_ref().and_then(|detector| detector.threshold),
            model_path: file.detector.and_then(|detector| detector.model_path),
        };
        let recording = RecordingSettings {
            output_dir: file
                .recording
                .as_ref()
                .and_then(|recording| recording.output_dir.clone())
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            grace_secs: file
                .recording
                .as_ref()
                .and_then(|recording| recording.grace_secs)
                .unwrap_or(DEFAULT_GRACE_SECS),
            frame_rate: file
                .recording
                .as_ref()
                .and_then(|recording| recording.frame_rate)
                .unwrap_or(DEFAULT_FRAME_RATE),
            jpeg_quality: file
                .recording
                .and_then(|recording| recording.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
        };
        Self {
            camera,
            detector,
            recording,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("SENTRY_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(backend) = std::env::var("SENTRY_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend;
            }
        }
        if let Ok(dir) = std::env::var("SENTRY_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.recording.output_dir = dir;
            }
        }
        if let Ok(grace) = std::env::var("SENTRY_GRACE_SECS") {
            self.recording.grace_secs = grace
                .parse()
                .map_err(|_| anyhow!("SENTRY_GRACE_SECS must be a number of seconds"))?;
        }
        if let Ok(rate) = std::env::var("SENTRY_FRAME_RATE") {
            self.recording.frame_rate = rate
                .parse()
                .map_err(|_| anyhow!("SENTRY_FRAME_RATE must be a number of frames per second"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera frame size must be non-zero"));
        }
        if self.detector.backend.trim().is_empty() {
            return Err(anyhow!("detector backend must not be empty"));
        }
        if !(self.recording.grace_secs.is_finite() && self.recording.grace_secs >= 0.0) {
            return Err(anyhow!("recording grace_secs must be zero or positive"));
        }
        if !(self.recording.frame_rate.is_finite() && self.recording.frame_rate > 0.0) {
            return Err(anyhow!("recording frame_rate must be positive"));
        }
        if !(1..=100).contains(&self.recording.jpeg_quality) {
            return Err(anyhow!("recording jpeg_quality must be in 1..=100"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SentrydConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
