//! Metrics aggregation and bilateral asymmetry.
//!
//! Each knee requires its own thigh+shank pair; a missing pair is a typed
//! error naming the side, never partial or zero-filled metrics that could
//! pass for real measurements.

use crate::error::{Error, Result};
use crate::kinematics;
use crate::signal::{self, ProcessedSeries};
use crate::types::{
    Analysis, AsymmetryResult, DominantSide, HipMetricsSet, JointMetrics, PositionTag, Session,
    Side,
};

/// ROM difference (degrees) at or above which one side is dominant.
pub const ROM_DOMINANCE_THRESHOLD_DEG: f64 = 10.0;
/// Repetition-count difference above which one side is dominant.
pub const REPETITION_DOMINANCE_THRESHOLD: u32 = 1;

fn metrics_from(processed: &ProcessedSeries) -> JointMetrics {
    JointMetrics {
        repetitions: processed.repetitions,
        rom: processed.rom,
        max_flexion: processed.max_flexion,
        max_extension: processed.max_extension,
        avg_velocity: processed.velocity.avg,
        peak_velocity: processed.velocity.peak,
        p95_velocity: processed.velocity.p95,
    }
}

/// Compute metrics for one side's thigh+shank pair.
pub fn knee_metrics(session: &Session, side: Side) -> Result<JointMetrics> {
    let thigh = session
        .stream(side.thigh())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::MissingRequiredSensors { sides: vec![side] })?;
    let shank = session
        .stream(side.shank())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::MissingRequiredSensors { sides: vec![side] })?;

    let series = kinematics::joint_angle_series(thigh, shank)?;
    let processed = signal::process(&series.angles, &series.time_seconds)?;
    Ok(metrics_from(&processed))
}

/// Compute hip metrics for one side from the pelvis+thigh pair, through the
/// same angle-series pipeline as the knee. The pelvis sensor is optional
/// equipment, so an absent pelvis (or thigh) yields `Ok(None)` rather than
/// an error.
pub fn hip_metrics(session: &Session, side: Side) -> Result<Option<JointMetrics>> {
    let pelvis = match session.stream(PositionTag::Pelvis).filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => return Ok(None),
    };
    let thigh = match session.stream(side.thigh()).filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => return Ok(None),
    };

    let series = kinematics::joint_angle_series(pelvis, thigh)?;
    let processed = signal::process(&series.angles, &series.time_seconds)?;
    Ok(Some(metrics_from(&processed)))
}

/// Bilateral asymmetry with the dominance rule, evaluated in order: ROM
/// difference ≥ 10° decides first, then repetition difference > 1, else
/// balanced. Differences are always non-negative magnitudes.
pub fn asymmetry(left: &JointMetrics, right: &JointMetrics) -> AsymmetryResult {
    let rom_difference = (left.rom - right.rom).abs();
    let repetition_difference = left.repetitions.abs_diff(right.repetitions);

    let dominant_side = if rom_difference >= ROM_DOMINANCE_THRESHOLD_DEG {
        if left.rom > right.rom {
            DominantSide::Left
        } else {
            DominantSide::Right
        }
    } else if repetition_difference > REPETITION_DOMINANCE_THRESHOLD {
        if left.repetitions > right.repetitions {
            DominantSide::Left
        } else {
            DominantSide::Right
        }
    } else {
        DominantSide::Balanced
    };

    AsymmetryResult {
        rom_difference,
        repetition_difference,
        dominant_side,
    }
}

/// Full bilateral analysis of a session. Fails fast with
/// [`Error::MissingRequiredSensors`] naming every side whose knee pair is
/// absent; hip metrics are filled per side when the pelvis recorded, and
/// session-level parse warnings are carried into the envelope.
pub fn analyze_session(session: &Session) -> Result<Analysis> {
    let missing: Vec<Side> = [Side::Left, Side::Right]
        .into_iter()
        .filter(|&side| !session.has_pair(side))
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingRequiredSensors { sides: missing });
    }

    let left = knee_metrics(session, Side::Left)?;
    let right = knee_metrics(session, Side::Right)?;
    let asymmetry = asymmetry(&left, &right);
    let hip = HipMetricsSet {
        left: hip_metrics(session, Side::Left)?,
        right: hip_metrics(session, Side::Right)?,
    };

    Ok(Analysis {
        left,
        right,
        asymmetry,
        hip,
        warnings: session.warnings.clone(),
    })
}
