//! SentryCam - presence-triggered video recorder.
//!
//! SentryCam watches a live camera feed and records it to timestamped files
//! whenever a detector reports at least one object of interest present.
//! Recording keeps going through brief gaps in detection and stops only
//! after detection has been continuously absent for a configured grace
//! period.
//!
//! # Architecture
//!
//! Per captured frame, the driver loop runs three stages:
//!
//! 1. A frame source (`ingest`) yields the next frame, or ends the stream.
//! 2. A detector backend (`detect`) reduces the frame to a presence signal.
//! 3. The recording controller (`record`) turns the signal into session
//!    start/stop transitions and writes the frame to the open sink.
//!
//! The controller is the one piece of real design here: a timer-debounced
//! state machine with exactly-once file creation per session and
//! exactly-once release of the recording sink, including on fatal exits.
//!
//! # Module Structure
//!
//! - `frame`: the RGB24 frame container shared by all stages
//! - `ingest`: frame sources (camera devices, file replay, synthetic stubs)
//! - `detect`: detector backends and their registry
//! - `record`: the recording controller, sessions, and sinks
//! - `config`: sentryd configuration (JSON file + environment overrides)

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod record;

pub use config::{CameraSettings, DetectorSettings, RecordingSettings, SentrydConfig};
pub use detect::{
    BackendRegistry, CpuBackend, Detection, DetectionCapability, DetectionResult, DetectorBackend,
    ObjectClass, StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::Frame;
pub use ingest::{FileSource, FrameSource, SourceStats, V4l2Source};
pub use record::{
    ControllerStats, MjpegAviRecorder, Recorder, RecordingController, RecordingSink, SessionEvent,
    SessionId, SinkCall, StubRecorder, TickOutcome,
};
