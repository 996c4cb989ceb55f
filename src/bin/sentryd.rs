//! sentryd - presence-triggered recording daemon
//!
//! This daemon:
//! 1. Pulls frames from the configured source (camera device, file replay)
//! 2. Runs the configured detector backend on each frame
//! 3. Feeds the presence signal into the recording controller
//! 4. Writes one timestamped video file per presence episode
//! 5. Finalizes any open session on shutdown, quit signals included

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sentrycam::{
    config::{RecordingSettings, SentrydConfig},
    detect::{BackendRegistry, CpuBackend, DetectionCapability, DetectorBackend, StubBackend},
    ingest::{self, FrameSource},
    record::{MjpegAviRecorder, Recorder, RecordingController, SessionEvent, StubRecorder},
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SentrydConfig::load()?;
    log::info!(
        "sentryd starting: camera={} detector={} output={}",
        cfg.camera.device,
        cfg.detector.backend,
        cfg.recording.output_dir
    );
    log::info!(
        "grace period {:.1}s, encoding at {:.1} fps",
        cfg.recording.grace_secs,
        cfg.recording.frame_rate
    );

    let mut source = ingest::open_source(&cfg.camera)?;
    source.connect()?;

    let mut registry = build_registry(&cfg)?;
    registry.set_default(&cfg.detector.backend)?;
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    {
        let mut guard = lock_backend(&backend)?;
        guard.warm_up().context("detector warm-up failed")?;
        log::info!(
            "detector backend '{}' ready (object detection: {})",
            guard.name(),
            guard.supports(DetectionCapability::ObjectDetection)
        );
    }

    let recorder = build_recorder(&cfg.recording);
    let mut controller =
        RecordingController::new(recorder, cfg.recording.grace(), cfg.recording.frame_rate);

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
        })
        .context("install quit signal handler")?;
    }

    let result = run_loop(
        source.as_mut(),
        &backend,
        &mut controller,
        &cfg,
        &running,
    );

    // Finalize any open session on every exit path, fatal errors included.
    if controller.is_recording() {
        log::info!("run ended while recording; finalizing open session");
    }
    match controller.shutdown() {
        Ok(Some(SessionEvent::Stopped { id, frames, .. })) => {
            log::info!("session {} finalized at shutdown ({} frames)", id, frames);
        }
        Ok(_) => {}
        Err(err) => log::error!("failed to finalize open session: {:#}", err),
    }

    let stats = controller.stats();
    log::info!(
        "sessions started={} stopped={} frames written={} open failures={}",
        stats.sessions_started,
        stats.sessions_stopped,
        stats.frames_written,
        stats.open_failures
    );
    result
}

fn run_loop(
    source: &mut dyn FrameSource,
    backend: &Arc<Mutex<dyn DetectorBackend>>,
    controller: &mut RecordingController,
    cfg: &SentrydConfig,
    running: &AtomicBool,
) -> Result<()> {
    let frame_interval = if cfg.camera.target_fps > 0 {
        Duration::from_millis(1000 / cfg.camera.target_fps as u64)
    } else {
        Duration::ZERO
    };
    let mut last_health_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame().context("frame capture failed")? else {
            log::info!("frame source ended");
            break;
        };

        let result = {
            let mut guard = lock_backend(backend)?;
            guard
                .detect(&frame.data, frame.width, frame.height)
                .context("presence detection failed")?
        };
        if result.presence() {
            log::debug!(
                "presence: {} detection(s), confidence {:.2}",
                result.detections.len(),
                result.confidence
            );
        }

        let outcome = controller.tick(result.presence(), &frame, Instant::now())?;
        match outcome.event {
            Some(SessionEvent::Started { id }) => log::info!("session {} started", id),
            Some(SessionEvent::Stopped {
                id,
                frames,
                duration,
            }) => log::info!(
                "session {} stopped ({} frames, {:.1}s)",
                id,
                frames,
                duration.as_secs_f64()
            ),
            Some(SessionEvent::OpenFailed { error }) => {
                log::error!("session-open-failed: {}", error);
            }
            None => {}
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            log::info!(
                "source health={} frames={} ({})",
                source.is_healthy(),
                stats.frames_captured,
                stats.source
            );
            last_health_log = Instant::now();
        }

        if frame_interval > Duration::ZERO {
            std::thread::sleep(frame_interval);
        }
    }

    Ok(())
}

fn lock_backend(
    backend: &Arc<Mutex<dyn DetectorBackend>>,
) -> Result<std::sync::MutexGuard<'_, dyn DetectorBackend + 'static>> {
    backend
        .lock()
        .map_err(|_| anyhow!("detector backend lock poisoned"))
}

fn build_registry(cfg: &SentrydConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();

    let mut cpu = CpuBackend::new();
    if let Some(threshold) = cfg.detector.threshold {
        cpu = cpu.with_threshold(threshold);
    }
    registry.register(cpu);
    registry.register(StubBackend::new());

    #[cfg(feature = "backend-tract")]
    {
        use sentrycam::detect::TractBackend;
        if let Some(model_path) = &cfg.detector.model_path {
            let mut tract = TractBackend::new(model_path, cfg.camera.width, cfg.camera.height)?;
            if let Some(threshold) = cfg.detector.threshold {
                tract = tract.with_threshold(threshold);
            }
            registry.register(tract);
        } else if cfg.detector.backend == "tract" {
            return Err(anyhow!(
                "detector.model_path is required for the tract backend"
            ));
        }
    }

    Ok(registry)
}

fn build_recorder(recording: &RecordingSettings) -> Box<dyn Recorder> {
    if recording.output_dir.starts_with("stub://") {
        log::warn!(
            "recording to stub sink, no files will be written ({})",
            recording.output_dir
        );
        Box::new(StubRecorder::new())
    } else {
        Box::new(MjpegAviRecorder::new(
            recording.output_dir.clone(),
            recording.jpeg_quality,
        ))
    }
}
