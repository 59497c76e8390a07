//! Per-pixel frame differencing.
//!
//! For every pixel the absolute per-channel difference is weighted into a
//! single value, scaled into a 0-255 heatmap intensity, and compared against
//! the sensitivity threshold. Pixels at or above the threshold count towards
//! the motion score and are reported to the [`MotionBoxTracker`].
//!
//! Nothing here keeps state between calls. The caller owns the frames and the
//! tracker.

use motion_diff_common::config::{EngineConfig, HeatmapStyle, WeightScheme};
use motion_diff_common::frame::{FrameBuffer, FrameError, CHANNELS};
use rayon::prelude::*;

use crate::motion_box::MotionBoxTracker;

/// Frames with at least this many pixels go through the row-parallel pass
/// when parallelism is enabled.
pub const PARALLEL_MIN_PIXELS: usize = 320 * 240;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffParams {
    pub sensitivity: f64,
    pub weighting: WeightScheme,
    pub heatmap: HeatmapStyle,
}

impl From<&EngineConfig> for DiffParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            sensitivity: config.sensitivity,
            weighting: config.weighting,
            heatmap: config.heatmap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferenceResult {
    /// Pixels whose weighted difference met the sensitivity.
    pub score: u64,
    /// Normalized heatmap, same size as the inputs.
    pub diff: FrameBuffer,
}

/// Weighted difference of two pixels' RGB channels.
pub fn weighted_diff(weighting: WeightScheme, a: &[u8], b: &[u8]) -> f64 {
    let dr = a[0].abs_diff(b[0]) as f64;
    let dg = a[1].abs_diff(b[1]) as f64;
    let db = a[2].abs_diff(b[2]) as f64;
    match weighting {
        // Sum first so integer totals divisible by 3 stay exact.
        WeightScheme::Equal => (dr + dg + db) / 3.0,
        WeightScheme::Perceptual => {
            let [wr, wg, wb] = weighting.weights();
            dr * wr + dg * wg + db * wb
        }
    }
}

/// Heatmap intensity for a weighted difference, always within 0..=255.
pub fn normalize(diff: f64, sensitivity: f64) -> u8 {
    (diff * (255.0 / sensitivity)).round().clamp(0.0, 255.0) as u8
}

/// Sequential difference pass.
///
/// `tracker` must already be reset for this frame; it receives every
/// over-threshold pixel.
pub fn compute(
    previous: &FrameBuffer,
    current: &FrameBuffer,
    params: &DiffParams,
    tracker: &mut MotionBoxTracker,
) -> Result<DifferenceResult, FrameError> {
    current.ensure_dimensions(previous.width(), previous.height())?;

    let mut diff = FrameBuffer::filled(previous.width(), previous.height(), Default::default());
    let score = diff_span(
        previous.as_bytes(),
        current.as_bytes(),
        diff.as_bytes_mut(),
        0,
        params,
        tracker,
    );
    Ok(DifferenceResult { score, diff })
}

/// Row-parallel difference pass. Produces exactly what [`compute`] does.
///
/// Rows are split into bands, one partial score and tracker per band, and the
/// partials are reduced by summing scores and min/max-merging the boxes.
pub fn compute_parallel(
    previous: &FrameBuffer,
    current: &FrameBuffer,
    params: &DiffParams,
    tracker: &mut MotionBoxTracker,
) -> Result<DifferenceResult, FrameError> {
    current.ensure_dimensions(previous.width(), previous.height())?;

    let width = previous.width();
    let height = previous.height() as usize;
    let rows_per_band = (height / rayon::current_num_threads()).max(1);
    let band_pixels = rows_per_band * width as usize;
    let band_bytes = (band_pixels * CHANNELS).max(CHANNELS);

    let mut diff = FrameBuffer::filled(width, previous.height(), Default::default());
    let (score, partial) = diff
        .as_bytes_mut()
        .par_chunks_mut(band_bytes)
        .zip(previous.as_bytes().par_chunks(band_bytes))
        .zip(current.as_bytes().par_chunks(band_bytes))
        .enumerate()
        .map(|(band, ((out, prev), cur))| {
            let mut band_tracker = MotionBoxTracker::new(width);
            let score = diff_span(prev, cur, out, band * band_pixels, params, &mut band_tracker);
            (score, band_tracker)
        })
        .reduce(
            || (0, MotionBoxTracker::new(width)),
            |(a, mut acc), (b, other)| {
                acc.merge(&other);
                (a + b, acc)
            },
        );

    tracker.merge(&partial);
    Ok(DifferenceResult { score, diff })
}

/// Diff a contiguous run of pixels whose first pixel has linear index
/// `first_index`. Returns the number of over-threshold pixels.
fn diff_span(
    previous: &[u8],
    current: &[u8],
    out: &mut [u8],
    first_index: usize,
    params: &DiffParams,
    tracker: &mut MotionBoxTracker,
) -> u64 {
    let mut score = 0;
    let pixels = previous
        .chunks_exact(CHANNELS)
        .zip(current.chunks_exact(CHANNELS))
        .zip(out.chunks_exact_mut(CHANNELS));

    for (offset, ((prev, cur), px)) in pixels.enumerate() {
        let diff = weighted_diff(params.weighting, prev, cur);
        let intensity = normalize(diff, params.sensitivity);
        match params.heatmap {
            HeatmapStyle::Grayscale => px.copy_from_slice(&[intensity, intensity, intensity, 255]),
            HeatmapStyle::Green => px.copy_from_slice(&[0, intensity, 0, 255]),
        }

        if diff >= params.sensitivity {
            score += 1;
            tracker.observe_index(first_index + offset);
        }
    }
    score
}
