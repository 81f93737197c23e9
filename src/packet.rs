//! Binary packet decoder for the wireless sensor link.
//!
//! Payloads are fixed-layout little-endian buffers delivered by the
//! transport collaborator from characteristic notifications: a u32
//! microsecond timestamp, four f32 quaternion components (w, x, y, z), and
//! depending on the payload mode an f32 free-acceleration triple plus a
//! status byte and clipping counters.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Measurement payload mode. The discriminants are the on-wire mode ids the
/// sensor firmware uses when starting a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PayloadMode {
    /// 20 bytes: timestamp + quaternion.
    OrientationQuaternion = 5,
    /// 32 bytes: timestamp + quaternion + free acceleration.
    CompleteQuaternion = 3,
    /// 36 bytes: timestamp + quaternion + free acceleration + status +
    /// clipping counters.
    ExtendedQuaternion = 2,
}

impl PayloadMode {
    pub fn mode_id(self) -> u8 {
        self as u8
    }

    /// Minimum buffer length required to decode this mode.
    pub fn min_len(self) -> usize {
        match self {
            PayloadMode::OrientationQuaternion => 20,
            PayloadMode::CompleteQuaternion => 32,
            PayloadMode::ExtendedQuaternion => 36,
        }
    }
}

/// One decoded notification payload, prior to stream assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedPacket {
    /// Raw sensor timestamp in microseconds. Epoch is arbitrary and resets
    /// are tolerated downstream, not corrected here.
    pub timestamp: u32,
    /// Quaternion components in w, x, y, z order.
    pub quaternion: [f64; 4],
    pub free_acc: Option<[f64; 3]>,
    pub status: Option<u8>,
    pub clip_counts: Option<[u8; 3]>,
}

fn read_u32_le(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

fn read_f32_le(buffer: &[u8], offset: usize) -> f64 {
    f32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ]) as f64
}

/// Decode one notification payload. A buffer shorter than the declared
/// mode's minimum is a fatal [`Error::MalformedPacket`]; no partial decode
/// is returned and the decoder never retries.
pub fn decode(buffer: &[u8], mode: PayloadMode) -> Result<DecodedPacket> {
    let expected = mode.min_len();
    if buffer.len() < expected {
        return Err(Error::MalformedPacket {
            mode,
            expected,
            actual: buffer.len(),
        });
    }

    let timestamp = read_u32_le(buffer, 0);
    let quaternion = [
        read_f32_le(buffer, 4),
        read_f32_le(buffer, 8),
        read_f32_le(buffer, 12),
        read_f32_le(buffer, 16),
    ];

    let free_acc = match mode {
        PayloadMode::OrientationQuaternion => None,
        PayloadMode::CompleteQuaternion | PayloadMode::ExtendedQuaternion => Some([
            read_f32_le(buffer, 20),
            read_f32_le(buffer, 24),
            read_f32_le(buffer, 28),
        ]),
    };

    let (status, clip_counts) = if mode == PayloadMode::ExtendedQuaternion {
        (
            Some(buffer[32]),
            Some([buffer[33], buffer[34], buffer[35]]),
        )
    } else {
        (None, None)
    };

    Ok(DecodedPacket {
        timestamp,
        quaternion,
        free_acc,
        status,
        clip_counts,
    })
}
