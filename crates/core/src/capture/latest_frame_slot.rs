use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::capture::domain::frame_subscriber::{FrameSubscriber, SubscriberError};
use crate::shared::frame::Frame;

/// Single-entry mailbox between the capture thread and a slower consumer.
///
/// Holds at most one pending frame. Pushing while a frame is pending
/// replaces it (drop-oldest), so a slow consumer always sees the newest
/// frame and never builds a backlog.
pub struct LatestFrameSlot {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    dropped: AtomicU64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, frame: Frame) {
        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    frame = rejected;
                }
                // Unreachable while we hold `rx`.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Waits up to `timeout` for a pending frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Frame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_take(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Frames replaced before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Discards any pending frame without counting it as dropped.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSubscriber for LatestFrameSlot {
    fn on_frame(&self, frame: &Frame) -> Result<(), SubscriberError> {
        self.push(frame.clone());
        Ok(())
    }
}
