//! Joint-motion metrics from body-worn IMU sensors.
//!
//! Two ingestion paths converge on one analysis pipeline: live binary
//! packets decoded and assembled by the stream [`aligner`], and batch CSV
//! archives loaded by the [`archive`] module. Either way the result is a
//! [`types::Session`] of per-position Euler streams, from which the
//! [`kinematics`] engine derives knee angle series, the [`signal`] pipeline
//! normalizes and segments them, and [`metrics`] aggregates per-side
//! [`types::JointMetrics`] plus left/right asymmetry.

pub mod aligner;
pub mod archive;
pub mod error;
pub mod kinematics;
pub mod metrics;
pub mod orientation;
pub mod packet;
pub mod signal;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Analysis, AsymmetryResult, DominantSide, HipMetricsSet, JointMetrics, PositionTag, Sample,
    SensorStream, Session, Side,
};
