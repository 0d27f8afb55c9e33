use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::capture::domain::camera_device::{CameraDevice, CaptureConfig};
use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::frame_subscriber::FrameSubscriber;
use crate::shared::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type SubscriberList = Arc<Mutex<Vec<(SubscriptionId, Arc<dyn FrameSubscriber>)>>>;

struct RunningCapture {
    stop_tx: Sender<()>,
    handle: JoinHandle<Option<Box<dyn CameraDevice>>>,
}

/// Owns the camera and broadcasts captured frames to subscribers.
///
/// Layout: `capture thread [read → broadcast → wait interval]`
///
/// The capture loop never waits on downstream processing beyond the
/// synchronous `on_frame` calls; consumers that fall behind decide for
/// themselves what to drop.
pub struct FrameSource {
    config: CaptureConfig,
    device: Option<Box<dyn CameraDevice>>,
    subscribers: SubscriberList,
    next_id: AtomicU64,
    running: Option<RunningCapture>,
}

impl FrameSource {
    pub fn new(device: Box<dyn CameraDevice>, config: CaptureConfig) -> Self {
        Self {
            config,
            device: Some(device),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            running: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn FrameSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push((id, subscriber));
        id
    }

    /// Returns `false` if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = lock(&self.subscribers);
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Opens the device and starts the capture thread.
    ///
    /// Calling this while already running is a logged no-op.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.running.is_some() {
            log::info!("Camera is already running");
            return Ok(());
        }

        let mut device = self.device.take().ok_or_else(|| CaptureError::DeviceUnavailable {
            device: self.config.device.clone(),
            reason: "device handle was lost by a previous capture thread".to_string(),
        })?;

        log::info!(
            "Starting camera {:?} at {}x{} @ {} fps",
            self.config.device,
            self.config.width,
            self.config.height,
            self.config.fps
        );

        if let Err(e) = device.open(&self.config) {
            log::error!("Failed to open camera: {e}");
            self.device = Some(device);
            return Err(e);
        }

        let builder = std::thread::Builder::new().name("frame-source".to_string());
        self.spawn_capture(device, builder)?;
        log::info!("Camera started");
        Ok(())
    }

    /// The device is handed over only once the thread exists, so a failed
    /// spawn leaves it released and available to the next `start`.
    fn spawn_capture(
        &mut self,
        mut device: Box<dyn CameraDevice>,
        builder: std::thread::Builder,
    ) -> Result<(), CaptureError> {
        let (device_tx, device_rx) = crossbeam_channel::bounded::<Box<dyn CameraDevice>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let subscribers = self.subscribers.clone();
        let interval = self.config.interval;

        let spawned = builder.spawn(move || {
            let device = device_rx.recv().ok()?;
            Some(capture_loop(device, &subscribers, &stop_rx, interval))
        });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to spawn capture thread: {e}");
                device.release();
                self.device = Some(device);
                return Err(CaptureError::DeviceUnavailable {
                    device: self.config.device.clone(),
                    reason: format!("failed to spawn capture thread: {e}"),
                });
            }
        };

        if let Err(crossbeam_channel::SendError(mut device)) = device_tx.send(device) {
            let _ = handle.join();
            device.release();
            self.device = Some(device);
            return Err(CaptureError::DeviceUnavailable {
                device: self.config.device.clone(),
                reason: "capture thread exited before receiving the device".to_string(),
            });
        }

        self.running = Some(RunningCapture { stop_tx, handle });
        Ok(())
    }

    /// Stops the capture loop, waits for it to exit, then releases the device.
    /// No-op when not running.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        log::info!("Stopping camera");
        let _ = running.stop_tx.send(());

        match running.handle.join() {
            Ok(Some(mut device)) => {
                device.release();
                self.device = Some(device);
                log::info!("Camera stopped");
            }
            Ok(None) => log::error!("Capture thread never received the camera"),
            Err(_) => log::error!("Capture thread panicked; camera handle lost"),
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    mut device: Box<dyn CameraDevice>,
    subscribers: &SubscriberList,
    stop_rx: &crossbeam_channel::Receiver<()>,
    interval: Duration,
) -> Box<dyn CameraDevice> {
    loop {
        match device.read() {
            Ok(Some(frame)) => broadcast(subscribers, &frame),
            Ok(None) => log::debug!("Camera returned an empty frame"),
            Err(e) => log::warn!("Error capturing frame: {e}"),
        }

        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    device
}

/// Delivers one frame to every subscriber. A failing or panicking subscriber
/// is logged and skipped; the others still receive the frame.
fn broadcast(subscribers: &SubscriberList, frame: &Frame) {
    let snapshot: Vec<(SubscriptionId, Arc<dyn FrameSubscriber>)> = lock(subscribers).clone();

    for (id, subscriber) in snapshot {
        match catch_unwind(AssertUnwindSafe(|| subscriber.on_frame(frame))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Frame subscriber {id:?} failed: {e}"),
            Err(_) => log::error!("Frame subscriber {id:?} panicked"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
