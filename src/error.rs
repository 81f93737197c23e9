use thiserror::Error;

use crate::packet::PayloadMode;
use crate::types::{PositionTag, Side};

/// Joint motion analysis error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("malformed packet: {mode:?} requires at least {expected} bytes, got {actual}")]
    MalformedPacket {
        mode: PayloadMode,
        expected: usize,
        actual: usize,
    },

    #[error("unknown position tag: {0}")]
    UnknownPositionTag(u8),

    #[error("missing required sensors for {}", format_sides(.sides))]
    MissingRequiredSensors { sides: Vec<Side> },

    #[error("insufficient samples for {proximal}/{distal} pair: got {len}, need at least 2")]
    InsufficientSamples {
        proximal: PositionTag,
        distal: PositionTag,
        len: usize,
    },

    #[error("empty angle series: cannot compute metrics on fewer than 2 samples")]
    EmptySeries,

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_sides(sides: &[Side]) -> String {
    let names: Vec<&str> = sides
        .iter()
        .map(|s| match s {
            Side::Left => "left knee",
            Side::Right => "right knee",
        })
        .collect();
    names.join(" and ")
}

pub type Result<T> = std::result::Result<T, Error>;
