use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};

use crate::frame::Frame;
use crate::record::sink::RecordingSink;

/// Session names are local wall-clock time, day first, and double as the
/// output artifact's base name.
const SESSION_NAME_FORMAT: &str = "%d-%m-%Y-%H-%M-%S";

/// Identity of one recording session, e.g. `05-03-2024-14-09-22`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocates session ids from start timestamps.
///
/// Two sessions starting within the same clock second would otherwise
/// produce the same name and silently overwrite each other; the namer
/// disambiguates by appending a monotonic counter (`-2`, `-3`, ...).
pub(crate) struct SessionNamer {
    last: Option<(String, u32)>,
}

impl SessionNamer {
    pub(crate) fn new() -> Self {
        Self { last: None }
    }

    pub(crate) fn allocate(&mut self, at: DateTime<Local>) -> SessionId {
        let base = at.format(SESSION_NAME_FORMAT).to_string();
        match &mut self.last {
            Some((last_base, count)) if *last_base == base => {
                *count += 1;
                SessionId(format!("{}-{}", base, count))
            }
            _ => {
                self.last = Some((base.clone(), 1));
                SessionId(base)
            }
        }
    }
}

/// One continuous recording: the session exclusively owns its sink from open
/// to finalize.
///
/// `finalize` consumes the session, so the sink is released exactly once on
/// the normal path. If a session is dropped without being finalized (fatal
/// errors, panics in the outer loop), `Drop` runs a best-effort finalize so
/// no artifact is left open without an attempted release.
pub(crate) struct RecordingSession {
    id: SessionId,
    started_at: Instant,
    sink: Option<Box<dyn RecordingSink>>,
    frames_written: u64,
}

impl RecordingSession {
    pub(crate) fn new(id: SessionId, sink: Box<dyn RecordingSink>, started_at: Instant) -> Self {
        Self {
            id,
            started_at,
            sink: Some(sink),
            frames_written: 0,
        }
    }

    pub(crate) fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| anyhow!("recording session {} already finalized", self.id))?;
        sink.write_frame(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Finalize the sink and release it. Returns the session id, the number
    /// of frames written, and the session duration.
    pub(crate) fn finalize(mut self, now: Instant) -> Result<(SessionId, u64, Duration)> {
        if let Some(mut sink) = self.sink.take() {
            sink.finalize()?;
        }
        let duration = now.saturating_duration_since(self.started_at);
        Ok((self.id.clone(), self.frames_written, duration))
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(err) = sink.finalize() {
                log::warn!("failed to finalize recording session {}: {:#}", self.id, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, h, m, s).unwrap()
    }

    #[test]
    fn session_name_is_day_first_wall_clock() {
        let mut namer = SessionNamer::new();
        let id = namer.allocate(at(14, 9, 22));
        assert_eq!(id.as_str(), "05-03-2024-14-09-22");
    }

    #[test]
    fn same_second_starts_get_a_counter_suffix() {
        let mut namer = SessionNamer::new();
        let first = namer.allocate(at(14, 9, 22));
        let second = namer.allocate(at(14, 9, 22));
        let third = namer.allocate(at(14, 9, 22));

        assert_eq!(first.as_str(), "05-03-2024-14-09-22");
        assert_eq!(second.as_str(), "05-03-2024-14-09-22-2");
        assert_eq!(third.as_str(), "05-03-2024-14-09-22-3");
    }

    #[test]
    fn counter_resets_once_the_clock_moves_on() {
        let mut namer = SessionNamer::new();
        namer.allocate(at(14, 9, 22));
        namer.allocate(at(14, 9, 22));
        let next = namer.allocate(at(14, 9, 23));
        assert_eq!(next.as_str(), "05-03-2024-14-09-23");
    }
}
