//! Core data model: samples, sensor positions, streams, sessions and the
//! metric types consumed by UI/persistence collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Anatomical mount position of a sensor. Raw values match the hardware
/// device tag written into CSV exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PositionTag {
    RightThigh = 1,
    RightShank = 2,
    LeftThigh = 3,
    LeftShank = 4,
    Pelvis = 5,
}

impl PositionTag {
    pub const ALL: [PositionTag; 5] = [
        PositionTag::RightThigh,
        PositionTag::RightShank,
        PositionTag::LeftThigh,
        PositionTag::LeftShank,
        PositionTag::Pelvis,
    ];

    pub fn from_raw(raw: u8) -> Option<PositionTag> {
        match raw {
            1 => Some(PositionTag::RightThigh),
            2 => Some(PositionTag::RightShank),
            3 => Some(PositionTag::LeftThigh),
            4 => Some(PositionTag::LeftShank),
            5 => Some(PositionTag::Pelvis),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Zero-based index into the fixed five-slot session arena.
    pub fn ordinal(self) -> usize {
        (self as u8 as usize) - 1
    }

    pub fn side(self) -> Option<Side> {
        match self {
            PositionTag::RightThigh | PositionTag::RightShank => Some(Side::Right),
            PositionTag::LeftThigh | PositionTag::LeftShank => Some(Side::Left),
            PositionTag::Pelvis => None,
        }
    }

    pub fn segment(self) -> &'static str {
        match self {
            PositionTag::RightThigh | PositionTag::LeftThigh => "thigh",
            PositionTag::RightShank | PositionTag::LeftShank => "shank",
            PositionTag::Pelvis => "pelvis",
        }
    }
}

impl fmt::Display for PositionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side() {
            Some(side) => write!(f, "{} {}", side, self.segment()),
            None => write!(f, "pelvis"),
        }
    }
}

/// Body side for joint-pair lookups and asymmetry reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn thigh(self) -> PositionTag {
        match self {
            Side::Left => PositionTag::LeftThigh,
            Side::Right => PositionTag::RightThigh,
        }
    }

    pub fn shank(self) -> PositionTag {
        match self {
            Side::Left => PositionTag::LeftShank,
            Side::Right => PositionTag::RightShank,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// One timestamped orientation reading.
///
/// `packet_counter` is assigned by the consumer starting at 1 and equals the
/// 1-based position within the stream once samples are ordered by
/// `sample_time`. `free_acc` and `status` are absent when the payload mode
/// did not carry them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub packet_counter: u32,
    /// Microseconds on the sensor clock, relative to the stream's first sample.
    pub sample_time: u32,
    /// Euler angles in degrees, ZYX intrinsic.
    pub euler: [f64; 3],
    pub free_acc: Option<[f64; 3]>,
    pub status: Option<u8>,
    /// `sample_time` expressed in seconds.
    pub time_seconds: f64,
}

/// Ordered sequence of samples for one position within one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorStream {
    pub tag: PositionTag,
    pub samples: Vec<Sample>,
}

impl SensorStream {
    pub fn new(tag: PositionTag) -> Self {
        SensorStream {
            tag,
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A recorded or loaded session: up to five sensor streams in a fixed arena
/// indexed by position ordinal, plus the wall-clock anchor used for archive
/// naming. Parse-level warnings accumulate here and flow into the analysis
/// envelope.
#[derive(Debug, Clone)]
pub struct Session {
    streams: [Option<SensorStream>; 5],
    pub start_time: DateTime<Utc>,
    pub warnings: Vec<String>,
}

impl Session {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Session {
            streams: [None, None, None, None, None],
            start_time,
            warnings: Vec::new(),
        }
    }

    pub fn stream(&self, tag: PositionTag) -> Option<&SensorStream> {
        self.streams[tag.ordinal()].as_ref()
    }

    pub fn stream_mut(&mut self, tag: PositionTag) -> Option<&mut SensorStream> {
        self.streams[tag.ordinal()].as_mut()
    }

    /// Mutable access to the position's stream, creating an empty one when
    /// the slot is vacant.
    pub fn stream_entry(&mut self, tag: PositionTag) -> &mut SensorStream {
        self.streams[tag.ordinal()].get_or_insert_with(|| SensorStream::new(tag))
    }

    /// Insert a stream, returning the stream it replaced if the position was
    /// already occupied.
    pub fn insert(&mut self, stream: SensorStream) -> Option<SensorStream> {
        self.streams[stream.tag.ordinal()].replace(stream)
    }

    /// Bitmask of occupied positions, bit `ordinal()` per tag.
    pub fn present_mask(&self) -> u8 {
        let mut mask = 0u8;
        for tag in PositionTag::ALL {
            if self.streams[tag.ordinal()].is_some() {
                mask |= 1 << tag.ordinal();
            }
        }
        mask
    }

    /// True when both streams of the side's thigh+shank pair carry data.
    pub fn has_pair(&self, side: Side) -> bool {
        self.stream(side.thigh()).is_some_and(|s| !s.is_empty())
            && self.stream(side.shank()).is_some_and(|s| !s.is_empty())
    }

    pub fn streams(&self) -> impl Iterator<Item = &SensorStream> {
        self.streams.iter().flatten()
    }
}

/// Per-joint metrics for one side. Field names and units (degrees, deg/s,
/// counts) are part of the external contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointMetrics {
    pub repetitions: u32,
    pub rom: f64,
    #[serde(rename = "maxFlexion")]
    pub max_flexion: f64,
    #[serde(rename = "maxExtension")]
    pub max_extension: f64,
    #[serde(rename = "avgVelocity")]
    pub avg_velocity: f64,
    #[serde(rename = "peakVelocity")]
    pub peak_velocity: f64,
    #[serde(rename = "p95Velocity")]
    pub p95_velocity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DominantSide {
    Left,
    Right,
    Balanced,
}

/// Bilateral asymmetry summary. Differences are reported as non-negative
/// magnitudes regardless of which branch decided dominance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsymmetryResult {
    #[serde(rename = "romDifference")]
    pub rom_difference: f64,
    #[serde(rename = "repetitionDifference")]
    pub repetition_difference: u32,
    #[serde(rename = "dominantSide")]
    pub dominant_side: DominantSide,
}

/// Hip metrics per side. A side is present only when the pelvis sensor
/// recorded alongside that side's thigh; knee-only sessions leave both empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HipMetricsSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<JointMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<JointMetrics>,
}

/// Complete analysis envelope handed to UI/persistence collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub left: JointMetrics,
    pub right: JointMetrics,
    pub asymmetry: AsymmetryResult,
    #[serde(default)]
    pub hip: HipMetricsSet,
    /// Non-fatal issues recovered during parsing (unknown tags, degenerate
    /// orientations, overwritten duplicates).
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_tag_round_trip() {
        for tag in PositionTag::ALL {
            assert_eq!(PositionTag::from_raw(tag.raw()), Some(tag));
        }
        assert_eq!(PositionTag::from_raw(0), None);
        assert_eq!(PositionTag::from_raw(6), None);
    }

    #[test]
    fn test_session_arena_and_mask() {
        let mut session = Session::new(Utc::now());
        assert_eq!(session.present_mask(), 0);

        let mut stream = SensorStream::new(PositionTag::LeftThigh);
        stream.samples.push(Sample {
            packet_counter: 1,
            sample_time: 0,
            euler: [0.0, 0.0, 0.0],
            free_acc: None,
            status: None,
            time_seconds: 0.0,
        });
        assert!(session.insert(stream).is_none());
        assert_eq!(session.present_mask(), 1 << PositionTag::LeftThigh.ordinal());
        assert!(!session.has_pair(Side::Left));

        let replaced = session.insert(SensorStream::new(PositionTag::LeftThigh));
        assert!(replaced.is_some());
    }

    #[test]
    fn test_metrics_serde_field_names() {
        let metrics = JointMetrics {
            repetitions: 5,
            rom: 60.0,
            max_flexion: 0.0,
            max_extension: 60.0,
            avg_velocity: 120.0,
            peak_velocity: 188.0,
            p95_velocity: 180.0,
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["maxFlexion"], 0.0);
        assert_eq!(json["avgVelocity"], 120.0);
        assert_eq!(json["p95Velocity"], 180.0);

        let asym = AsymmetryResult {
            rom_difference: 15.0,
            repetition_difference: 0,
            dominant_side: DominantSide::Left,
        };
        let json = serde_json::to_value(&asym).unwrap();
        assert_eq!(json["dominantSide"], "left");
        assert_eq!(json["romDifference"], 15.0);
    }
}
