//! Detection-triggered recording state machine.
//!
//! The controller converts the per-frame presence signal into start/stop
//! recording transitions. Starting is immediate: the first frame with
//! presence opens a session and is written to it. Stopping is debounced:
//! losing presence arms a deadline, and only a full grace period of
//! continuous absence finalizes the session. Presence regained before the
//! deadline (the deadline tick included) resumes recording as if nothing
//! happened.
//!
//! The grace comparison uses the caller-supplied wall-clock `now`, not frame
//! counts, so variable frame rates do not shorten or stretch the debounce.

use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;

use crate::frame::Frame;
use crate::record::session::{RecordingSession, SessionId, SessionNamer};
use crate::record::sink::Recorder;

/// State machine phases. The active session and the stop deadline live
/// inside the variants that require them, so "session present iff not idle"
/// and "deadline present iff stop pending" hold by construction.
enum ControllerState {
    Idle,
    Recording {
        session: RecordingSession,
    },
    StopPending {
        session: RecordingSession,
        deadline: Instant,
    },
}

/// Session-lifecycle event produced by a tick, for logging/observability.
#[derive(Debug)]
pub enum SessionEvent {
    Started {
        id: SessionId,
    },
    Stopped {
        id: SessionId,
        frames: u64,
        duration: Duration,
    },
    /// The sink could not be opened. The controller stays idle and the start
    /// is retried on the next tick with presence.
    OpenFailed {
        error: String,
    },
}

/// What a single tick did.
#[derive(Debug)]
pub struct TickOutcome {
    /// At most one lifecycle event per tick.
    pub event: Option<SessionEvent>,
    /// Whether the tick's frame was written to the active sink.
    pub wrote_frame: bool,
}

/// Lifetime counters over a controller's run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ControllerStats {
    pub sessions_started: u64,
    pub sessions_stopped: u64,
    pub frames_written: u64,
    pub open_failures: u64,
}

/// Owns the detection-to-recording state machine and drives the recorder.
///
/// `tick` is called once per captured frame, in arrival order, never
/// concurrently. There is no suspension inside `tick`: arming the stop timer
/// just stores a deadline compared against the caller-supplied `now` on
/// later ticks.
pub struct RecordingController {
    recorder: Box<dyn Recorder>,
    grace: Duration,
    frame_rate: f64,
    namer: SessionNamer,
    state: ControllerState,
    stats: ControllerStats,
}

impl RecordingController {
    pub fn new(recorder: Box<dyn Recorder>, grace: Duration, frame_rate: f64) -> Self {
        Self {
            recorder,
            grace,
            frame_rate,
            namer: SessionNamer::new(),
            state: ControllerState::Idle,
            stats: ControllerStats::default(),
        }
    }

    /// Advance the state machine by one captured frame.
    ///
    /// Write failures are fatal: the session is dropped here and its `Drop`
    /// impl releases the sink.
    pub fn tick(&mut self, presence: bool, frame: &Frame, now: Instant) -> Result<TickOutcome> {
        let state = std::mem::replace(&mut self.state, ControllerState::Idle);
        match (state, presence) {
            (ControllerState::Idle, false) => Ok(TickOutcome {
                event: None,
                wrote_frame: false,
            }),

            (ControllerState::Idle, true) => self.open_session(frame, now),

            (ControllerState::Recording { mut session }, true) => {
                self.write_to(&mut session, frame)?;
                self.state = ControllerState::Recording { session };
                Ok(TickOutcome {
                    event: None,
                    wrote_frame: true,
                })
            }

            // Presence lost: keep writing through the grace period.
            (ControllerState::Recording { mut session }, false) => {
                self.write_to(&mut session, frame)?;
                self.state = ControllerState::StopPending {
                    session,
                    deadline: now + self.grace,
                };
                Ok(TickOutcome {
                    event: None,
                    wrote_frame: true,
                })
            }

            // Presence regained before the deadline: disarm the timer.
            (ControllerState::StopPending { mut session, .. }, true) => {
                self.write_to(&mut session, frame)?;
                self.state = ControllerState::Recording { session };
                Ok(TickOutcome {
                    event: None,
                    wrote_frame: true,
                })
            }

            (ControllerState::StopPending { mut session, deadline }, false) => {
                if now >= deadline {
                    // Grace period fully elapsed: finalize, do not write.
                    let (id, frames, duration) = session.finalize(now)?;
                    self.stats.sessions_stopped += 1;
                    Ok(TickOutcome {
                        event: Some(SessionEvent::Stopped {
                            id,
                            frames,
                            duration,
                        }),
                        wrote_frame: false,
                    })
                } else {
                    self.write_to(&mut session, frame)?;
                    self.state = ControllerState::StopPending { session, deadline };
                    Ok(TickOutcome {
                        event: None,
                        wrote_frame: true,
                    })
                }
            }
        }
    }

    /// Finalize any open session. The host of the controller must call this
    /// on every exit path: end of frame stream, quit signal, and fatal
    /// errors alike.
    pub fn shutdown(&mut self) -> Result<Option<SessionEvent>> {
        let state = std::mem::replace(&mut self.state, ControllerState::Idle);
        let session = match state {
            ControllerState::Idle => return Ok(None),
            ControllerState::Recording { session } => session,
            ControllerState::StopPending { session, .. } => session,
        };
        let (id, frames, duration) = session.finalize(Instant::now())?;
        self.stats.sessions_stopped += 1;
        Ok(Some(SessionEvent::Stopped {
            id,
            frames,
            duration,
        }))
    }

    pub fn is_recording(&self) -> bool {
        !matches!(self.state, ControllerState::Idle)
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    fn open_session(&mut self, frame: &Frame, now: Instant) -> Result<TickOutcome> {
        let id = self.namer.allocate(Local::now());
        match self
            .recorder
            .open(id.as_str(), self.frame_rate, frame.width, frame.height)
        {
            Ok(sink) => {
                let mut session = RecordingSession::new(id.clone(), sink, now);
                self.write_to(&mut session, frame)?;
                self.stats.sessions_started += 1;
                self.state = ControllerState::Recording { session };
                Ok(TickOutcome {
                    event: Some(SessionEvent::Started { id }),
                    wrote_frame: true,
                })
            }
            Err(err) => {
                self.stats.open_failures += 1;
                Ok(TickOutcome {
                    event: Some(SessionEvent::OpenFailed {
                        error: format!("{:#}", err),
                    }),
                    wrote_frame: false,
                })
            }
        }
    }

    fn write_to(&mut self, session: &mut RecordingSession, frame: &Frame) -> Result<()> {
        session.write_frame(frame)?;
        self.stats.frames_written += 1;
        Ok(())
    }
}
