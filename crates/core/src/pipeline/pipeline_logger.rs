use std::collections::HashMap;
use std::time::Instant;

/// Observer for per-frame pipeline events.
///
/// Lets the front end decide how timings and counters surface (log lines,
/// an on-screen overlay, nothing at all) without touching the orchestrator.
pub trait PipelineLogger: Send {
    /// Called once per processed frame with the running total.
    fn progress(&mut self, processed: u64);

    /// Duration of one stage (`detect`, `effect`, `present`) for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A sampled value such as detection confidence or dropped frames.
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// End-of-run report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _processed: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

#[derive(Default)]
struct Series {
    count: u64,
    total: f64,
    max: f64,
}

impl Series {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = self.max.max(value);
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Aggregates stage timings and metrics for a live session and reports them
/// through the `log` facade.
///
/// Keeps running totals rather than every sample, since a camera session
/// has no natural end. Progress is logged every `every_frames` frames.
pub struct StdoutPipelineLogger {
    every_frames: u64,
    timings: HashMap<String, Series>,
    metrics: HashMap<String, Series>,
    started: Instant,
    processed: u64,
}

impl StdoutPipelineLogger {
    pub fn new(every_frames: u64) -> Self {
        Self {
            every_frames: every_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            started: Instant::now(),
            processed: 0,
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Mean duration recorded for `stage`, in milliseconds.
    pub fn mean_timing(&self, stage: &str) -> Option<f64> {
        self.timings.get(stage).map(Series::mean)
    }

    pub fn mean_metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(Series::mean)
    }

    /// Formatted report, or `None` before anything was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Session summary ({} frames in {elapsed:.1}s):",
            self.processed
        )];

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, series) in stages {
            lines.push(format!(
                "  {stage:8} avg {:6.1}ms  max {:6.1}ms",
                series.mean(),
                series.max
            ));
        }

        let mut metrics: Vec<_> = self.metrics.iter().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));
        for (name, series) in metrics {
            lines.push(format!("  {name}: avg {:.2}  max {:.2}", series.mean(), series.max));
        }

        if self.processed > 0 && elapsed > 0.0 {
            lines.push(format!(
                "  Effective rate: {:.1} fps",
                self.processed as f64 / elapsed
            ));
        }

        Some(lines.join("\n"))
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(crate::shared::constants::PROGRESS_LOG_EVERY)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, processed: u64) {
        self.processed = processed;
        if processed % self.every_frames == 0 {
            log::info!("Processed {processed} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings.entry(stage.to_string()).or_default().push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n{text}");
        }
    }
}
