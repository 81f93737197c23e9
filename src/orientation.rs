//! Quaternion / Euler-angle conversions.
//!
//! Sensors report orientation either as quaternions (live packets) or as
//! ZYX-intrinsic Euler angles in degrees (CSV exports). Both directions are
//! pure functions over nalgebra types and are mutual near-inverses away from
//! the gimbal-lock singularities at ±90° pitch.

use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Magnitude below which a quaternion is treated as degenerate.
pub const DEGENERATE_NORM: f64 = 1e-8;

/// Normalize a raw w,x,y,z quaternion. A near-zero-norm quaternion cannot be
/// normalized; it falls back to the identity orientation (NaN-free) and the
/// returned flag is true so callers can surface the recovery as a warning.
pub fn normalize_or_identity(q: [f64; 4]) -> (UnitQuaternion<f64>, bool) {
    let quat = Quaternion::new(q[0], q[1], q[2], q[3]);
    if quat.norm() < DEGENERATE_NORM {
        (UnitQuaternion::identity(), true)
    } else {
        (UnitQuaternion::from_quaternion(quat), false)
    }
}

/// Convert a w,x,y,z quaternion to ZYX-intrinsic Euler angles in degrees.
/// Degenerate input yields the identity orientation and a logged warning.
pub fn quat_to_euler_zyx(q: [f64; 4]) -> [f64; 3] {
    let (unit, degenerate) = normalize_or_identity(q);
    if degenerate {
        log::warn!("degenerate orientation (norm < {DEGENERATE_NORM}), using identity");
    }
    let (roll, pitch, yaw) = unit.euler_angles();
    [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
}

/// Convert ZYX-intrinsic Euler angles in degrees to a unit quaternion.
pub fn euler_zyx_to_quat(euler: [f64; 3]) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(
        euler[0].to_radians(),
        euler[1].to_radians(),
        euler[2].to_radians(),
    )
}

/// Rotate a local-frame vector into world frame by the given orientation.
pub fn rotate_vector(q: &UnitQuaternion<f64>, v: [f64; 3]) -> Vector3<f64> {
    q.transform_vector(&Vector3::new(v[0], v[1], v[2]))
}
