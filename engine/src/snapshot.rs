use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use image::{ImageFormat, Rgba, RgbaImage};
use motion_diff_common::config::SnapshotConfig;
use motion_diff_common::frame::FrameBuffer;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::motion_box::MotionBox;
use crate::sink::{CycleReport, MotionSink};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to encode PNG: {0}")]
    Encode(String),
    #[error("failed to write snapshot {0}: {1}")]
    Write(String, std::io::Error),
}

/// Relative path of a heatmap snapshot, grouped by UTC day.
/// e.g. "snapshots/2025-02-18/20250218T093000000Z_000042.png"
pub fn snapshot_key(prefix: &str, captured_at_ms: i64, cycle: u64) -> String {
    let dt: DateTime<Utc> = Utc
        .timestamp_millis_opt(captured_at_ms)
        .single()
        .unwrap_or_else(Utc::now);
    format!(
        "{prefix}{date}/{ts}_{cycle:06}.png",
        date = dt.format("%Y-%m-%d"),
        ts = dt.format("%Y%m%dT%H%M%S%3fZ"),
    )
}

/// The diff buffer as an image, with `motion_box` outlined in `color`.
pub fn heatmap_image(diff: &FrameBuffer, motion_box: Option<&MotionBox>, color: [u8; 3]) -> RgbaImage {
    let mut img = RgbaImage::from_fn(diff.width(), diff.height(), |x, y| {
        let p = diff.pixel_at(x, y).unwrap_or_default();
        Rgba([p.r, p.g, p.b, p.a])
    });

    let in_frame = |b: &&MotionBox| !b.is_empty() && b.x_min < img.width() && b.y_min < img.height();
    if let Some(b) = motion_box.filter(in_frame) {
        let stroke = Rgba([color[0], color[1], color[2], 255]);
        let x_max = b.x_max.min(img.width().saturating_sub(1));
        let y_max = b.y_max.min(img.height().saturating_sub(1));
        for x in b.x_min..=x_max {
            img.put_pixel(x, b.y_min, stroke);
            img.put_pixel(x, y_max, stroke);
        }
        for y in b.y_min..=y_max {
            img.put_pixel(b.x_min, y, stroke);
            img.put_pixel(x_max, y, stroke);
        }
    }
    img
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, SnapshotError> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| SnapshotError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Encode and store one snapshot. Blocking.
fn write_snapshot(
    path: &Path,
    diff: &FrameBuffer,
    motion_box: Option<&MotionBox>,
    color: [u8; 3],
) -> Result<(), SnapshotError> {
    let png = encode_png(&heatmap_image(diff, motion_box, color))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SnapshotError::Write(parent.display().to_string(), e))?;
    }
    std::fs::write(path, png).map_err(|e| SnapshotError::Write(path.display().to_string(), e))
}

/// Writes every n-th heatmap to disk as PNG.
///
/// Encoding and file I/O run on the blocking pool, so `emit` must be called
/// from within a Tokio runtime and never waits on the disk.
pub struct SnapshotSink {
    directory: PathBuf,
    every_n_cycles: u64,
    only_on_motion: bool,
    box_color: [u8; 3],
    eligible: u64,
    written: Arc<AtomicU64>,
    pending: Vec<JoinHandle<()>>,
}

impl SnapshotSink {
    pub fn new(config: &SnapshotConfig, box_color: [u8; 3]) -> Self {
        Self {
            directory: PathBuf::from(&config.directory),
            every_n_cycles: config.every_n_cycles.max(1),
            only_on_motion: config.only_on_motion,
            box_color,
            eligible: 0,
            written: Arc::new(AtomicU64::new(0)),
            pending: Vec::new(),
        }
    }

    /// Snapshots that reached the disk so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Wait for every snapshot handed off so far.
    pub async fn flush(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "snapshot task failed");
            }
        }
    }

    fn spawn_write(&mut self, report: &CycleReport) {
        let cycle = report.cycle;
        let path = self.directory.join(snapshot_key("", report.captured_at_ms, cycle));
        let diff = report.diff.clone();
        let motion_box = report.motion_box;
        let color = self.box_color;
        let written = Arc::clone(&self.written);

        self.pending.retain(|handle| !handle.is_finished());
        self.pending.push(tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                write_snapshot(&path, &diff, motion_box.as_ref(), color).map(|()| path)
            })
            .await;

            match result {
                Ok(Ok(path)) => {
                    written.fetch_add(1, Ordering::Relaxed);
                    debug!(path = %path.display(), cycle, "snapshot written");
                }
                Ok(Err(e)) => warn!(error = %e, cycle, "failed to write snapshot"),
                Err(e) => error!(error = %e, cycle, "spawn_blocking failed"),
            }
        }));
    }
}

impl MotionSink for SnapshotSink {
    fn emit(&mut self, report: &CycleReport) {
        if self.only_on_motion && !report.has_motion() {
            return;
        }
        self.eligible += 1;
        if self.eligible % self.every_n_cycles != 0 {
            return;
        }
        self.spawn_write(report);
    }

    fn name(&self) -> &str {
        "snapshot"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_diff_common::frame::Pixel;

    fn report(cycle: u64, score: u64) -> CycleReport {
        CycleReport {
            cycle,
            captured_at_ms: 1739871000000,
            score,
            diff: FrameBuffer::filled(6, 4, Pixel::new(0, 0, 0, 255)),
            motion_box: (score > 0).then_some(MotionBox { x_min: 1, x_max: 3, y_min: 1, y_max: 2 }),
        }
    }

    fn config(dir: &Path, every_n_cycles: u64, only_on_motion: bool) -> SnapshotConfig {
        SnapshotConfig {
            enabled: true,
            directory: dir.display().to_string(),
            every_n_cycles,
            only_on_motion,
        }
    }

    #[test]
    fn test_key_format() {
        // 2025-02-18T09:30:00.000Z
        let key = snapshot_key("snapshots/", 1739871000000, 42);
        assert_eq!(key, "snapshots/2025-02-18/20250218T093000000Z_000042.png");
    }

    #[test]
    fn outline_is_drawn_in_box_color() {
        let r = report(1, 4);
        let img = heatmap_image(&r.diff, r.motion_box.as_ref(), [255, 0, 0]);
        let red = Rgba([255, 0, 0, 255]);
        let black = Rgba([0, 0, 0, 255]);
        assert_eq!(*img.get_pixel(1, 1), red);
        assert_eq!(*img.get_pixel(3, 2), red);
        assert_eq!(*img.get_pixel(2, 1), red);
        assert_eq!(*img.get_pixel(0, 0), black);
        assert_eq!(*img.get_pixel(5, 3), black);
    }

    #[test]
    fn empty_box_draws_nothing() {
        let diff = FrameBuffer::filled(3, 3, Pixel::gray(7));
        let img = heatmap_image(&diff, Some(&MotionBox::empty(3)), [255, 0, 0]);
        assert!(img.pixels().all(|p| *p == Rgba([7, 7, 7, 255])));
    }

    #[test]
    fn png_round_trips_through_image() {
        let diff = FrameBuffer::filled(5, 2, Pixel::gray(128));
        let png = encode_png(&heatmap_image(&diff, None, [0, 0, 0])).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (5, 2));
        assert_eq!(*decoded.get_pixel(4, 1), Rgba([128, 128, 128, 255]));
    }

    #[tokio::test]
    async fn writes_every_nth_motion_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotSink::new(&config(dir.path(), 2, true), [255, 0, 0]);

        sink.emit(&report(1, 3));
        sink.emit(&report(2, 0));
        sink.emit(&report(3, 5));
        sink.emit(&report(4, 1));
        sink.emit(&report(5, 2));
        sink.flush().await;

        // Motion reports: 1, 3, 4, 5 -> the 2nd and 4th are written.
        assert_eq!(sink.written(), 2);
        let day = dir.path().join("2025-02-18");
        assert!(day.join("20250218T093000000Z_000003.png").exists());
        assert!(day.join("20250218T093000000Z_000005.png").exists());
        assert!(!day.join("20250218T093000000Z_000001.png").exists());
    }

    #[tokio::test]
    async fn counts_quiet_reports_when_not_motion_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotSink::new(&config(dir.path(), 1, false), [0, 255, 0]);
        sink.emit(&report(1, 0));
        sink.emit(&report(2, 0));
        sink.flush().await;
        assert_eq!(sink.written(), 2);
    }

    #[tokio::test]
    async fn unwritable_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let mut sink = SnapshotSink::new(&config(&blocker, 1, true), [255, 0, 0]);
        sink.emit(&report(1, 1));
        sink.flush().await;
        assert_eq!(sink.written(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn emit_returns_before_the_write_lands() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SnapshotSink::new(&config(dir.path(), 1, true), [255, 0, 0]);

        // On a current-thread runtime the spawned task cannot run until we
        // yield, so nothing is on disk yet.
        sink.emit(&report(9, 1));
        assert_eq!(sink.written(), 0);

        sink.flush().await;
        assert_eq!(sink.written(), 1);
        assert!(dir
            .path()
            .join("2025-02-18/20250218T093000000Z_000009.png")
            .exists());
    }
}
