use motion_diff_common::frame::FrameBuffer;
use tracing::{debug, info};

use crate::motion_box::MotionBox;

/// Everything one diffing cycle produces.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Engine cycle counter, including the priming cycle.
    pub cycle: u64,
    pub captured_at_ms: i64,
    pub score: u64,
    /// Normalized heatmap of the change between the two frames.
    pub diff: FrameBuffer,
    /// `Some` only when the score is positive and box emission is enabled.
    pub motion_box: Option<MotionBox>,
}

impl CycleReport {
    pub fn has_motion(&self) -> bool {
        self.score > 0
    }
}

/// Receives cycle results. Display, storage and rendering are the sink's
/// business; the engine only hands over the report.
pub trait MotionSink: Send {
    fn emit(&mut self, report: &CycleReport);

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

impl<T: MotionSink + ?Sized> MotionSink for Box<T> {
    fn emit(&mut self, report: &CycleReport) {
        (**self).emit(report)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Logs every report through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MotionSink for TracingSink {
    fn emit(&mut self, report: &CycleReport) {
        match &report.motion_box {
            Some(b) => info!(
                cycle = report.cycle,
                score = report.score,
                x_min = b.x_min,
                x_max = b.x_max,
                y_min = b.y_min,
                y_max = b.y_max,
                "motion detected"
            ),
            None if report.has_motion() => {
                info!(cycle = report.cycle, score = report.score, "motion detected")
            }
            None => debug!(cycle = report.cycle, "no motion"),
        }
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Forwards each report to every inner sink, in insertion order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn MotionSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: impl MotionSink + 'static) {
        debug!(sink = sink.name(), "registered motion sink");
        self.sinks.push(Box::new(sink));
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MotionSink for FanoutSink {
    fn emit(&mut self, report: &CycleReport) {
        for sink in &mut self.sinks {
            sink.emit(report);
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}
