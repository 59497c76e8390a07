use motion_diff_common::config::{ConfigError, EngineConfig};
use motion_diff_common::frame::{FrameBuffer, FrameError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::diff::{self, DiffParams, PARALLEL_MIN_PIXELS};
use crate::motion_box::{MotionBox, MotionBoxTracker};
use crate::sink::CycleReport;
use crate::source::{FrameSource, SourceError};

/// Lifecycle of a [`MotionEngine`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// No frame source attached yet.
    Idle,
    Running,
    Stopped,
}

/// The single frame carried from one cycle to the next.
#[derive(Debug, Default)]
pub struct EngineState {
    previous: Option<FrameBuffer>,
}

impl EngineState {
    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn previous(&self) -> Option<&FrameBuffer> {
        self.previous.as_ref()
    }
}

/// Result of a successful cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// First frame stored; nothing to compare against yet.
    Primed,
    Report(CycleReport),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("frame unavailable: {0}")]
    FrameUnavailable(#[source] SourceError),
    #[error("{0}")]
    DimensionMismatch(#[source] FrameError),
    #[error("engine is {0:?}, cycles only run while Running")]
    NotRunning(EngineStatus),
    #[error("engine cannot start from {0:?}")]
    AlreadyStarted(EngineStatus),
    #[error("invalid engine config: {0}")]
    Config(#[from] ConfigError),
}

/// Runs capture-diff-emit cycles against a frame source.
///
/// The engine owns the previous frame and the box tracker. Cycles are driven
/// from outside (see [`crate::scheduler`]) and must not overlap, which the
/// `&mut self` receiver enforces.
pub struct MotionEngine<S> {
    config: EngineConfig,
    params: DiffParams,
    source: Option<S>,
    status: EngineStatus,
    state: EngineState,
    tracker: MotionBoxTracker,
    cycles: u64,
}

impl<S: FrameSource> MotionEngine<S> {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            params: DiffParams::from(&config),
            tracker: MotionBoxTracker::new(config.width),
            config,
            source: None,
            status: EngineStatus::Idle,
            state: EngineState::default(),
            cycles: 0,
        })
    }

    /// Attach the frame source and move `Idle → Running`.
    pub fn start(&mut self, source: S) -> Result<(), EngineError> {
        if self.status != EngineStatus::Idle {
            return Err(EngineError::AlreadyStarted(self.status));
        }
        info!(
            source = source.name(),
            width = self.config.width,
            height = self.config.height,
            sensitivity = self.config.sensitivity,
            weighting = ?self.config.weighting,
            "motion engine started"
        );
        self.source = Some(source);
        self.status = EngineStatus::Running;
        Ok(())
    }

    /// Move to `Stopped`, releasing the source and the stored frame.
    pub fn stop(&mut self) {
        if self.status == EngineStatus::Stopped {
            return;
        }
        self.source = None;
        self.state = EngineState::default();
        self.tracker.reset(self.config.width);
        self.status = EngineStatus::Stopped;
        info!(cycles = self.cycles, "motion engine stopped");
    }

    /// One capture-diff-emit cycle.
    ///
    /// Failures leave the stored previous frame untouched, so the next cycle
    /// compares against the last frame that was actually accepted.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, EngineError> {
        let source = match (self.status, self.source.as_mut()) {
            (EngineStatus::Running, Some(source)) => source,
            (status, _) => return Err(EngineError::NotRunning(status)),
        };

        let acquired = source.acquire_frame().await;
        let current = acquired.map_err(|e| {
            warn!(error = %e, source = source.name(), "frame unavailable, skipping cycle");
            EngineError::FrameUnavailable(e)
        })?;

        current
            .ensure_dimensions(self.config.width, self.config.height)
            .map_err(|e| {
                warn!(error = %e, "frame rejected");
                EngineError::DimensionMismatch(e)
            })?;

        self.cycles += 1;
        let cycle = self.cycles;

        let Some(previous) = self.state.previous.as_ref() else {
            debug!(cycle, "first frame stored, nothing to compare yet");
            self.state.previous = Some(current);
            return Ok(CycleOutcome::Primed);
        };

        let result = if self.config.parallel && self.config.pixel_count() >= PARALLEL_MIN_PIXELS {
            diff::compute_parallel(previous, &current, &self.params, &mut self.tracker)
        } else {
            diff::compute(previous, &current, &self.params, &mut self.tracker)
        }
        .map_err(EngineError::DimensionMismatch)?;

        let motion_box = (result.score > 0 && self.config.emit_box).then(|| self.tracker.current());
        debug!(cycle, score = result.score, ?motion_box, "cycle complete");

        let report = CycleReport {
            cycle,
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
            score: result.score,
            diff: result.diff,
            motion_box,
        };

        self.state.previous = Some(current);
        self.tracker.reset(self.config.width);
        Ok(CycleOutcome::Report(report))
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn has_previous(&self) -> bool {
        self.state.has_previous()
    }

    /// The tracker's box as it stands between cycles (always the empty
    /// sentinel, since the tracker is reset once a report is built).
    pub fn motion_box(&self) -> MotionBox {
        self.tracker.current()
    }

    /// Completed cycles, the priming cycle included.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
