use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::record::sink::{Recorder, RecordingSink};

/// One observed call against a stub sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkCall {
    Open { name: String },
    Write { name: String },
    Finalize { name: String },
}

/// In-memory recorder for tests and `stub://` dry runs.
///
/// Every open/write/finalize call is appended to a shared log, so tests can
/// assert on exact sink lifecycles (one finalize per session, retried opens,
/// and so on). `fail_next_opens` injects open failures to exercise the
/// controller's stay-idle-and-retry path.
pub struct StubRecorder {
    log: Arc<Mutex<Vec<SinkCall>>>,
    fail_opens_remaining: usize,
}

impl StubRecorder {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            fail_opens_remaining: 0,
        }
    }

    /// Make the next `count` open calls fail.
    pub fn fail_next_opens(mut self, count: usize) -> Self {
        self.fail_opens_remaining = count;
        self
    }

    /// Shared handle to the call log; clone before boxing the recorder.
    pub fn log_handle(&self) -> Arc<Mutex<Vec<SinkCall>>> {
        self.log.clone()
    }
}

impl Default for StubRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder for StubRecorder {
    fn open(
        &mut self,
        name: &str,
        _frame_rate: f64,
        _width: u32,
        _height: u32,
    ) -> Result<Box<dyn RecordingSink>> {
        if self.fail_opens_remaining > 0 {
            self.fail_opens_remaining -= 1;
            return Err(anyhow!("stub recorder: injected open failure"));
        }
        let mut log = self
            .log
            .lock()
            .map_err(|_| anyhow!("stub recorder log poisoned"))?;
        log.push(SinkCall::Open {
            name: name.to_string(),
        });
        Ok(Box::new(StubSink {
            name: name.to_string(),
            log: self.log.clone(),
            finalized: false,
        }))
    }
}

struct StubSink {
    name: String,
    log: Arc<Mutex<Vec<SinkCall>>>,
    finalized: bool,
}

impl RecordingSink for StubSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        if self.finalized {
            return Err(anyhow!("stub sink {} is already finalized", self.name));
        }
        let mut log = self
            .log
            .lock()
            .map_err(|_| anyhow!("stub recorder log poisoned"))?;
        log.push(SinkCall::Write {
            name: self.name.clone(),
        });
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let mut log = self
            .log
            .lock()
            .map_err(|_| anyhow!("stub recorder log poisoned"))?;
        log.push(SinkCall::Finalize {
            name: self.name.clone(),
        });
        self.finalized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_the_sink_lifecycle_in_order() {
        let mut recorder = StubRecorder::new();
        let log = recorder.log_handle();

        let mut sink = recorder.open("clip", 20.0, 64, 48).unwrap();
        sink.write_frame(&Frame::new(vec![0u8; 64 * 48 * 3], 64, 48))
            .unwrap();
        sink.finalize().unwrap();

        let calls = log.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                SinkCall::Open {
                    name: "clip".to_string()
                },
                SinkCall::Write {
                    name: "clip".to_string()
                },
                SinkCall::Finalize {
                    name: "clip".to_string()
                },
            ]
        );
    }

    #[test]
    fn second_finalize_is_a_quiet_no_op() {
        let mut recorder = StubRecorder::new();
        let log = recorder.log_handle();

        let mut sink = recorder.open("clip", 20.0, 64, 48).unwrap();
        sink.finalize().unwrap();
        sink.finalize().unwrap();

        let finalizes = log
            .lock()
            .unwrap()
            .iter()
            .filter(|call| matches!(call, SinkCall::Finalize { .. }))
            .count();
        assert_eq!(finalizes, 1);
    }

    #[test]
    fn injected_open_failures_are_consumed() {
        let mut recorder = StubRecorder::new().fail_next_opens(1);
        assert!(recorder.open("clip", 20.0, 64, 48).is_err());
        assert!(recorder.open("clip", 20.0, 64, 48).is_ok());
    }
}
