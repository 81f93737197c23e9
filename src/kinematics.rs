//! Joint kinematics engine.
//!
//! A joint angle is the angle between the long-bone axes of two adjacent
//! segments: each sample's Euler triple becomes a quaternion, the local
//! bone axis is rotated into world frame by both orientations, and the
//! angle is the arc cosine of their clamped dot product. Streams are
//! aligned by truncating to the shorter length; both are assumed to have
//! been sampled at the same nominal rate and started together.

use crate::error::{Error, Result};
use crate::orientation;
use crate::types::SensorStream;

/// Bone long axis in the sensor frame: sensors mount with -Y along the bone.
pub const BONE_AXIS: [f64; 3] = [0.0, -1.0, 0.0];

/// One scalar joint angle per aligned sample pair, with the matching time
/// axis in seconds. Derived per metrics call, never persisted.
#[derive(Debug, Clone)]
pub struct JointAngleSeries {
    pub angles: Vec<f64>,
    pub time_seconds: Vec<f64>,
}

impl JointAngleSeries {
    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }
}

/// Compute the joint angle series for a segment pair (e.g. thigh vs shank).
/// Fails with [`Error::InsufficientSamples`] when the aligned length is
/// under 2.
pub fn joint_angle_series(
    proximal: &SensorStream,
    distal: &SensorStream,
) -> Result<JointAngleSeries> {
    let len = proximal.len().min(distal.len());
    if len < 2 {
        return Err(Error::InsufficientSamples {
            proximal: proximal.tag,
            distal: distal.tag,
            len,
        });
    }

    let mut angles = Vec::with_capacity(len);
    let mut time_seconds = Vec::with_capacity(len);

    for i in 0..len {
        let a = &proximal.samples[i];
        let b = &distal.samples[i];

        let qa = orientation::euler_zyx_to_quat(a.euler);
        let qb = orientation::euler_zyx_to_quat(b.euler);
        let va = orientation::rotate_vector(&qa, BONE_AXIS);
        let vb = orientation::rotate_vector(&qb, BONE_AXIS);

        let dot = va.dot(&vb).clamp(-1.0, 1.0);
        angles.push(dot.acos().to_degrees());
        time_seconds.push(a.time_seconds);
    }

    Ok(JointAngleSeries {
        angles,
        time_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PositionTag, Sample};
    use approx::assert_relative_eq;

    fn stream_from_euler_x(tag: PositionTag, angles_deg: &[f64]) -> SensorStream {
        let samples = angles_deg
            .iter()
            .enumerate()
            .map(|(i, &ex)| Sample {
                packet_counter: (i + 1) as u32,
                sample_time: (i as u32) * 16_667,
                euler: [ex, 0.0, 0.0],
                free_acc: None,
                status: None,
                time_seconds: i as f64 / 60.0,
            })
            .collect();
        SensorStream { tag, samples }
    }

    #[test]
    fn test_relative_rotation_about_x() {
        // Thigh held neutral, shank rotated: the joint angle equals the
        // rotation difference about the shared X axis.
        let thigh = stream_from_euler_x(PositionTag::RightThigh, &[0.0, 0.0, 0.0]);
        let shank = stream_from_euler_x(PositionTag::RightShank, &[0.0, 30.0, 90.0]);

        let series = joint_angle_series(&thigh, &shank).unwrap();
        assert_eq!(series.len(), 3);
        assert_relative_eq!(series.angles[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(series.angles[1], 30.0, epsilon = 1e-9);
        assert_relative_eq!(series.angles[2], 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_truncates_to_shorter_stream() {
        let thigh = stream_from_euler_x(PositionTag::LeftThigh, &[0.0; 10]);
        let shank = stream_from_euler_x(PositionTag::LeftShank, &[10.0; 6]);

        let series = joint_angle_series(&thigh, &shank).unwrap();
        assert_eq!(series.len(), 6);
        assert_eq!(series.time_seconds.len(), 6);
    }

    #[test]
    fn test_insufficient_samples_names_the_pair() {
        let thigh = stream_from_euler_x(PositionTag::LeftThigh, &[0.0, 1.0]);
        let shank = stream_from_euler_x(PositionTag::LeftShank, &[5.0]);
        let err = joint_angle_series(&thigh, &shank).unwrap_err();
        match err {
            Error::InsufficientSamples {
                proximal,
                distal,
                len,
            } => {
                assert_eq!(proximal, PositionTag::LeftThigh);
                assert_eq!(distal, PositionTag::LeftShank);
                assert_eq!(len, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let message = joint_angle_series(&thigh, &shank).unwrap_err().to_string();
        assert!(message.contains("left thigh"));
        assert!(message.contains("left shank"));
    }

    #[test]
    fn test_angle_is_symmetric() {
        let a = stream_from_euler_x(PositionTag::RightThigh, &[10.0, 20.0, 30.0]);
        let b = stream_from_euler_x(PositionTag::RightShank, &[55.0, 45.0, 35.0]);
        let ab = joint_angle_series(&a, &b).unwrap();
        let ba = joint_angle_series(&b, &a).unwrap();
        for (x, y) in ab.angles.iter().zip(&ba.angles) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }
}
