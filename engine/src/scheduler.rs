//! Periodic cycle driver.
//!
//! Cycles run one at a time on a `tokio::time::interval`. A tick that comes due
//! while a cycle is still running is delayed rather than replayed, so cycles
//! never overlap or burst. Stopping is signalled through a [`StopHandle`]; the
//! loop checks it before every cycle and drops the report of a cycle that was
//! in flight when the stop arrived.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::{CycleOutcome, EngineError, MotionEngine};
use crate::sink::MotionSink;
use crate::source::FrameSource;

/// Requests a running scheduler to stop. Cloneable; any clone stops it.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// The scheduler's side of the stop channel.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop has been requested. Never resolves if every
    /// handle is dropped without stopping.
    pub async fn stopped(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Counters for one scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub primed: u64,
    pub reports: u64,
    pub motion_reports: u64,
    pub failures: u64,
    pub discarded: u64,
}

/// Drive `engine` every `interval` until stopped, handing each report to
/// `sink`. Per-cycle failures are logged and counted; the loop keeps going.
/// The engine is stopped on return.
pub async fn run_scheduler<S, K>(
    engine: &mut MotionEngine<S>,
    sink: &mut K,
    interval: Duration,
    mut stop: StopSignal,
) -> SchedulerStats
where
    S: FrameSource,
    K: MotionSink + ?Sized,
{
    let mut stats = SchedulerStats::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_ms = interval.as_millis() as u64, sink = sink.name(), "scheduler started");

    loop {
        tokio::select! {
            biased;
            _ = stop.stopped() => break,
            _ = ticker.tick() => {}
        }

        match engine.run_cycle().await {
            Ok(CycleOutcome::Primed) => stats.primed += 1,
            Ok(CycleOutcome::Report(report)) => {
                if stop.is_stopped() {
                    debug!(cycle = report.cycle, "stop requested mid-cycle, discarding report");
                    stats.discarded += 1;
                    break;
                }
                stats.reports += 1;
                if report.has_motion() {
                    stats.motion_reports += 1;
                }
                sink.emit(&report);
            }
            Err(EngineError::NotRunning(status)) => {
                warn!(?status, "engine not running, scheduler exiting");
                break;
            }
            Err(e) => {
                stats.failures += 1;
                warn!(error = %e, failures = stats.failures, "cycle failed");
            }
        }
    }

    engine.stop();
    info!(
        primed = stats.primed,
        reports = stats.reports,
        motion_reports = stats.motion_reports,
        failures = stats.failures,
        "scheduler stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{config, ScriptedSource};
    use crate::engine::EngineStatus;
    use crate::sink::CycleReport;
    use crate::source::SourceError;
    use motion_diff_common::frame::{FrameBuffer, Pixel};
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct CountingSink {
        cycles: Vec<u64>,
    }

    impl MotionSink for CountingSink {
        fn emit(&mut self, report: &CycleReport) {
            self.cycles.push(report.cycle);
        }
    }

    fn black() -> FrameBuffer {
        FrameBuffer::filled(2, 1, Pixel::new(0, 0, 0, 255))
    }

    fn engine_with(script: Vec<Result<FrameBuffer, SourceError>>) -> (MotionEngine<ScriptedSource>, Arc<std::sync::atomic::AtomicUsize>) {
        let source = ScriptedSource::new(script);
        let pulls = Arc::clone(&source.pulls);
        let mut engine = MotionEngine::new(config(2, 1, 10.0)).unwrap();
        engine.start(source).unwrap();
        (engine, pulls)
    }

    #[tokio::test(start_paused = true)]
    async fn stop_mid_interval_prevents_further_cycles() {
        let (mut engine, pulls) = engine_with(vec![Ok(black())]);
        let (handle, signal) = stop_channel();

        let task = tokio::spawn(async move {
            let mut sink = CountingSink::default();
            let stats = run_scheduler(&mut engine, &mut sink, Duration::from_millis(100), signal).await;
            (engine, sink, stats)
        });

        // Ticks at 0, 100 and 200 ms; stop lands between ticks.
        tokio::time::sleep(Duration::from_millis(250)).await;
        handle.stop();
        let (engine, sink, stats) = task.await.unwrap();

        let pulled = pulls.load(Ordering::SeqCst);
        assert_eq!(pulled, 3);
        assert_eq!(stats.primed, 1);
        assert_eq!(stats.reports, 2);
        assert_eq!(sink.cycles, vec![2, 3]);
        assert_eq!(engine.status(), EngineStatus::Stopped);
        assert!(!engine.has_previous());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(pulls.load(Ordering::SeqCst), pulled);
        assert_eq!(engine.cycles(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_runs_nothing() {
        let (mut engine, pulls) = engine_with(vec![Ok(black())]);
        let (handle, signal) = stop_channel();
        handle.stop();
        assert!(handle.is_stopped());

        let mut sink = CountingSink::default();
        let stats = run_scheduler(&mut engine, &mut sink, Duration::from_millis(100), signal).await;
        assert_eq!(stats, SchedulerStats::default());
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.status(), EngineStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_end_the_loop() {
        let (mut engine, _pulls) = engine_with(vec![
            Err(SourceError::Unavailable("warming up".into())),
            Ok(black()),
            Err(SourceError::Status(503)),
            Ok(black()),
        ]);
        let (handle, signal) = stop_channel();

        let task = tokio::spawn(async move {
            let mut sink = CountingSink::default();
            let stats = run_scheduler(&mut engine, &mut sink, Duration::from_millis(50), signal).await;
            (sink, stats)
        });

        // Ticks at 0, 50, 100, 150.
        tokio::time::sleep(Duration::from_millis(175)).await;
        handle.stop();
        let (sink, stats) = task.await.unwrap();

        assert_eq!(stats.failures, 2);
        assert_eq!(stats.primed, 1);
        assert_eq!(stats.reports, 1);
        assert_eq!(stats.motion_reports, 0);
        assert_eq!(sink.cycles, vec![2]);
    }

    #[tokio::test]
    async fn idle_engine_ends_the_loop() {
        let mut engine: MotionEngine<ScriptedSource> = MotionEngine::new(config(2, 1, 10.0)).unwrap();
        let (_handle, signal) = stop_channel();
        let mut sink = CountingSink::default();
        let stats = run_scheduler(&mut engine, &mut sink, Duration::from_millis(10), signal).await;
        assert_eq!(stats, SchedulerStats::default());
        assert_eq!(engine.status(), EngineStatus::Stopped);
    }
}
