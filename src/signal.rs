//! Signal processing over one joint angle series.
//!
//! Stages, in order: baseline subtraction (rest-pose offset), zero-floor
//! normalization (extension reference at exactly 0), centered moving-average
//! smoothing, prominence-based repetition detection, and velocity
//! statistics. Extrema and velocities are computed on the zero-floored
//! series; the smoothed series feeds repetition detection only, which keeps
//! `max_flexion` pinned at 0 after normalization.

use crate::error::{Error, Result};

/// Window (seconds) whose mean defines the rest-pose baseline.
pub const BASELINE_SECONDS: f64 = 1.0;
/// Fallback baseline sample count when no sample falls under the window.
pub const BASELINE_FALLBACK_SAMPLES: usize = 60;
/// Moving-average smoothing window (samples, centered).
pub const SMOOTHING_WINDOW: usize = 5;
/// Absolute repetition threshold in degrees.
pub const PEAK_THRESHOLD_DEG: f64 = 15.0;
/// Fractional repetition threshold relative to ROM.
pub const PEAK_THRESHOLD_FRAC: f64 = 0.2;
/// Half-width (samples) of the prominence window around a candidate peak.
pub const PROMINENCE_HALF_WINDOW: usize = 15;
/// Minimum spacing in seconds between accepted peaks.
pub const MIN_PEAK_SPACING_SECONDS: f64 = 0.6;

/// Subtract the rest-pose baseline: the mean of all samples earlier than
/// [`BASELINE_SECONDS`], falling back to the first
/// [`BASELINE_FALLBACK_SAMPLES`] samples when none qualify.
pub fn baseline_subtract(angles: &[f64], time_seconds: &[f64]) -> Vec<f64> {
    if angles.is_empty() {
        return Vec::new();
    }
    let under_window = time_seconds
        .iter()
        .position(|&t| t >= BASELINE_SECONDS)
        .unwrap_or(0);
    let end = if under_window > 0 {
        under_window
    } else {
        BASELINE_FALLBACK_SAMPLES.min(angles.len())
    };

    let baseline = angles[..end].iter().sum::<f64>() / end as f64;
    angles.iter().map(|a| a - baseline).collect()
}

/// Shift the series so its minimum is exactly 0: the smallest value becomes
/// the extension reference and all flexion is positive.
pub fn zero_floor(angles: &mut [f64]) {
    let min = angles.iter().copied().fold(f64::INFINITY, f64::min);
    if min.is_finite() {
        for a in angles.iter_mut() {
            *a -= min;
        }
    }
}

/// Centered moving average; the window shrinks at the series edges.
pub fn moving_average(data: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    let mut out = Vec::with_capacity(data.len());
    for i in 0..data.len() {
        let start = i.saturating_sub(half);
        let end = (i + half + 1).min(data.len());
        let sum: f64 = data[start..end].iter().sum();
        out.push(sum / (end - start) as f64);
    }
    out
}

/// Count repetitions via 5-point local maxima on the smoothed series.
/// A candidate's prominence over a ±15-sample window must strictly exceed
/// max(15°, 0.2 × ROM), and the peak must lie at least 0.6 s after the
/// previously accepted peak (non-maximum suppression by time).
pub fn count_repetitions(angles: &[f64], time_seconds: &[f64]) -> u32 {
    if angles.len() < SMOOTHING_WINDOW {
        return 0;
    }
    let smoothed = moving_average(angles, SMOOTHING_WINDOW);
    let max = smoothed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = smoothed.iter().copied().fold(f64::INFINITY, f64::min);
    let rom = max - min;
    let threshold = PEAK_THRESHOLD_DEG.max(PEAK_THRESHOLD_FRAC * rom);

    let mut count = 0u32;
    let mut last_peak_time = f64::NEG_INFINITY;

    for i in 2..smoothed.len() - 2 {
        let v = smoothed[i];
        let is_local_max = v > smoothed[i - 1]
            && v > smoothed[i + 1]
            && v > smoothed[i - 2]
            && v > smoothed[i + 2];
        if !is_local_max {
            continue;
        }

        let start = i.saturating_sub(PROMINENCE_HALF_WINDOW);
        let end = (i + PROMINENCE_HALF_WINDOW + 1).min(smoothed.len());
        let local_min = smoothed[start..end]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        // Prominence must strictly exceed the threshold.
        if v - local_min <= threshold {
            continue;
        }

        let t = time_seconds[i];
        if t - last_peak_time >= MIN_PEAK_SPACING_SECONDS {
            count += 1;
            last_peak_time = t;
        }
    }

    count
}

/// Angular velocity statistics over consecutive sample pairs with Δt > 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityStats {
    pub avg: f64,
    pub peak: f64,
    pub p95: f64,
}

/// Instantaneous velocity is |Δangle| / Δt in deg/s. Pairs with Δt ≤ 0 are
/// skipped; with no usable pair all statistics are 0.
pub fn velocity_stats(angles: &[f64], time_seconds: &[f64]) -> VelocityStats {
    let mut velocities = Vec::with_capacity(angles.len().saturating_sub(1));
    for i in 1..angles.len() {
        let dt = time_seconds[i] - time_seconds[i - 1];
        if dt > 0.0 {
            velocities.push((angles[i] - angles[i - 1]).abs() / dt);
        }
    }
    if velocities.is_empty() {
        return VelocityStats {
            avg: 0.0,
            peak: 0.0,
            p95: 0.0,
        };
    }

    let avg = velocities.iter().sum::<f64>() / velocities.len() as f64;
    let peak = velocities.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let p95 = percentile(&velocities, 95.0);
    VelocityStats { avg, peak, p95 }
}

/// Linear-interpolated percentile: rank = p/100 × (n−1), interpolating
/// between the surrounding order statistics. Deterministic for fixed input.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Normalized series plus the statistics derived from it.
#[derive(Debug, Clone)]
pub struct ProcessedSeries {
    /// Baseline-subtracted, zero-floored angles.
    pub angles: Vec<f64>,
    pub time_seconds: Vec<f64>,
    pub repetitions: u32,
    pub max_extension: f64,
    pub max_flexion: f64,
    pub rom: f64,
    pub velocity: VelocityStats,
}

/// Run the full pipeline over one angle series. Fails with
/// [`Error::EmptySeries`] on fewer than 2 samples.
pub fn process(angles: &[f64], time_seconds: &[f64]) -> Result<ProcessedSeries> {
    if angles.len() < 2 || time_seconds.len() < angles.len() {
        return Err(Error::EmptySeries);
    }

    let mut normalized = baseline_subtract(angles, time_seconds);
    zero_floor(&mut normalized);

    let max_extension = normalized.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let max_flexion = normalized.iter().copied().fold(f64::INFINITY, f64::min);
    let rom = max_extension - max_flexion;
    let repetitions = count_repetitions(&normalized, time_seconds);
    let velocity = velocity_stats(&normalized, time_seconds);

    Ok(ProcessedSeries {
        angles: normalized,
        time_seconds: time_seconds[..angles.len()].to_vec(),
        repetitions,
        max_extension,
        max_flexion,
        rom,
        velocity,
    })
}
