//! Recording pipeline: the detection-triggered controller, session
//! lifecycle, and the sinks it drives.

mod controller;
mod mjpeg;
mod session;
mod sink;
mod stub;

pub use controller::{ControllerStats, RecordingController, SessionEvent, TickOutcome};
pub use mjpeg::MjpegAviRecorder;
pub use session::SessionId;
pub use sink::{Recorder, RecordingSink};
pub use stub::{SinkCall, StubRecorder};
