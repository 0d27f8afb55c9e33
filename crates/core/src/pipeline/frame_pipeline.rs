use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::capture::domain::capture_error::CaptureError;
use crate::capture::frame_source::FrameSource;
use crate::capture::latest_frame_slot::LatestFrameSlot;
use crate::detection::domain::bridge_error::BridgeError;
use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::detection_service::DetectionService;
use crate::detection::domain::engine_kind::EngineKind;
use crate::effects::domain::face_effect::FaceEffect;
use crate::pipeline::domain::frame_sink::FrameSink;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::constants::{DEFAULT_DRAIN_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::shared::frame::Frame;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error("failed to spawn pipeline worker: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// How long `stop` waits for the frame being processed to finish before
    /// tearing the detector connection down underneath it.
    pub drain_timeout: Duration,
    /// How often an idle worker re-checks for shutdown.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// The per-frame stages, shared with the worker thread while running.
struct Stages {
    effect: Box<dyn FaceEffect>,
    sink: Box<dyn FrameSink>,
    logger: Box<dyn PipelineLogger>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

/// Wires frame source, detector, effect and sink into one live flow.
///
/// Layout: `capture thread → LatestFrameSlot → worker [detect → effect → present]`
///
/// The worker is the only consumer of the depth-1 slot, so at most one frame
/// is being processed at any time. Frames captured meanwhile replace each
/// other in the slot and are counted as dropped.
pub struct FramePipeline {
    source: FrameSource,
    detector: Arc<dyn DetectionService>,
    stages: Arc<Mutex<Stages>>,
    slot: Arc<LatestFrameSlot>,
    config: PipelineConfig,
    processed: Arc<AtomicU64>,
    worker: Option<Worker>,
}

impl FramePipeline {
    pub fn new(
        source: FrameSource,
        detector: Arc<dyn DetectionService>,
        effect: Box<dyn FaceEffect>,
        sink: Box<dyn FrameSink>,
        logger: Box<dyn PipelineLogger>,
        config: PipelineConfig,
    ) -> Self {
        let slot = Arc::new(LatestFrameSlot::new());
        source.subscribe(slot.clone());
        Self {
            source,
            detector,
            stages: Arc::new(Mutex::new(Stages {
                effect,
                sink,
                logger,
            })),
            slot,
            config,
            processed: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    /// Further subscribers may attach here; each sees every captured frame.
    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn processed_frames(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.slot.dropped()
    }

    pub fn engine(&self) -> EngineKind {
        self.detector.engine()
    }

    /// Applies from the next detection request on.
    pub fn set_engine(&self, engine: EngineKind) {
        self.detector.set_engine(engine);
    }

    /// Starts the detector, then the worker, then the camera. On failure
    /// everything already started is stopped again before returning.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.worker.is_some() {
            log::info!("Pipeline is already running");
            return Ok(());
        }

        log::info!("Starting pipeline");
        self.detector.start()?;
        self.slot.reset_dropped();

        let worker = match self.spawn_worker() {
            Ok(worker) => worker,
            Err(e) => {
                self.detector.stop();
                return Err(e.into());
            }
        };
        self.worker = Some(worker);

        if let Err(e) = self.source.start() {
            log::error!("Camera failed to start, rolling back: {e}");
            self.shutdown_worker();
            return Err(e.into());
        }

        log::info!("Pipeline started");
        Ok(())
    }

    /// Stops the camera, waits for the frame in flight, then stops the
    /// detector. No-op when not running.
    pub fn stop(&mut self) {
        if self.worker.is_none() {
            return;
        }

        log::info!("Stopping pipeline");
        self.source.stop();
        self.shutdown_worker();
        self.slot.clear();

        let mut stages = lock(&self.stages);
        stages
            .logger
            .metric("dropped_frames", self.slot.dropped() as f64);
        stages.logger.summary();
        log::info!("Pipeline stopped");
    }

    fn spawn_worker(&self) -> std::io::Result<Worker> {
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);

        let ctx = WorkerContext {
            detector: self.detector.clone(),
            stages: self.stages.clone(),
            slot: self.slot.clone(),
            processed: self.processed.clone(),
            stop: stop.clone(),
            poll_interval: self.config.poll_interval,
        };

        let handle = std::thread::Builder::new()
            .name("frame-pipeline".to_string())
            .spawn(move || {
                ctx.run();
                let _ = done_tx.send(());
            })?;

        Ok(Worker {
            stop,
            done_rx,
            handle,
        })
    }

    /// Lets the current frame finish within the drain timeout, stops the
    /// detector (which aborts a detect still blocked on its reply), and
    /// joins the worker.
    fn shutdown_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.stop.store(true, Ordering::SeqCst);
        if worker.done_rx.recv_timeout(self.config.drain_timeout).is_err() {
            log::warn!(
                "Frame still in flight after {:?}; closing detector connection",
                self.config.drain_timeout
            );
        }

        self.detector.stop();
        if worker.handle.join().is_err() {
            log::error!("Pipeline worker panicked");
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerContext {
    detector: Arc<dyn DetectionService>,
    stages: Arc<Mutex<Stages>>,
    slot: Arc<LatestFrameSlot>,
    processed: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl WorkerContext {
    fn run(&self) {
        while !self.stop.load(Ordering::SeqCst) {
            let Some(frame) = self.slot.recv_timeout(self.poll_interval) else {
                continue;
            };
            let index = frame.index();
            let mut stages = lock(&self.stages);
            if catch_unwind(AssertUnwindSafe(|| self.process(frame, &mut stages))).is_err() {
                log::error!("Pipeline stage panicked on frame {index}; skipping it");
            }
        }
    }

    fn process(&self, frame: Frame, stages: &mut Stages) {
        let t0 = Instant::now();
        let detection = match self.detector.detect(&frame) {
            Ok(detection) => detection,
            Err(e) => {
                log::warn!("Detection failed for frame {}: {e}", frame.index());
                DetectionResult::not_detected(self.detector.engine())
            }
        };
        stages.logger.timing("detect", elapsed_ms(t0));

        let t1 = Instant::now();
        let output = if detection.is_detected() {
            stages
                .logger
                .metric("confidence", detection.confidence() as f64);
            match stages.effect.apply(&frame, &detection) {
                Ok(rendered) => rendered,
                Err(e) => {
                    log::warn!("Effect failed for frame {}: {e}", frame.index());
                    frame
                }
            }
        } else {
            frame
        };
        stages.logger.timing("effect", elapsed_ms(t1));

        let t2 = Instant::now();
        if let Err(e) = stages.sink.present(&output, &detection) {
            log::warn!("Failed to present frame {}: {e}", output.index());
        }
        stages.logger.timing("present", elapsed_ms(t2));

        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        stages.logger.progress(processed);
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
