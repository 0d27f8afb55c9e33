use crossbeam_channel::{Sender, TrySendError};

use crate::detection::domain::detection_result::DetectionResult;
use crate::pipeline::domain::frame_sink::{FrameSink, ProcessedFrame, SinkError};
use crate::shared::frame::Frame;

/// Forwards processed frames to another thread over a bounded channel.
///
/// When the receiver lags and the channel is full, the new frame is
/// discarded rather than blocking the pipeline worker.
pub struct ChannelSink {
    tx: Sender<ProcessedFrame>,
    discarded: u64,
}

impl ChannelSink {
    pub fn new(tx: Sender<ProcessedFrame>) -> Self {
        Self { tx, discarded: 0 }
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}

impl FrameSink for ChannelSink {
    fn present(&mut self, frame: &Frame, detection: &DetectionResult) -> Result<(), SinkError> {
        let processed = ProcessedFrame {
            frame: frame.clone(),
            detection: detection.clone(),
        };
        match self.tx.try_send(processed) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.discarded += 1;
                log::debug!("Display channel full, discarding frame {}", frame.index());
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err("display channel disconnected".into()),
        }
    }
}
