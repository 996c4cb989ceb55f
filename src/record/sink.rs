use anyhow::Result;

use crate::frame::Frame;

/// Factory for recording sinks.
///
/// `open` is called by the controller at the moment a session starts: the
/// name is the session id (used verbatim as the artifact's base name), and
/// the dimensions come from the frame that triggered the session, not from
/// configuration. An open failure is recoverable — the controller stays idle
/// and retries on the next tick with presence.
pub trait Recorder {
    fn open(
        &mut self,
        name: &str,
        frame_rate: f64,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn RecordingSink>>;
}

/// Write target for one recording session.
///
/// A sink is exclusively owned by its session; no other component writes to
/// or finalizes it. `finalize` is the sole mechanism by which the recorded
/// artifact becomes durable and playable. It is called at most once per sink
/// in normal operation, but implementations must tolerate a second call
/// without corrupting the artifact (the driver's cleanup path is allowed to
/// be defensive).
pub trait RecordingSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    fn finalize(&mut self) -> Result<()>;
}
