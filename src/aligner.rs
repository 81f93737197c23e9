//! Live-path stream assembly.
//!
//! Decoded packets arrive over an explicit channel instead of per-event
//! callbacks, so transport concerns stay outside the pipeline and the
//! aligner can be driven with synthetic packets in tests. Transport
//! callbacks run on plain OS threads, hence a crossbeam channel on the
//! producer side; the consuming task is a tokio loop that flushes buffered
//! packets into the growing session on a fixed 100 ms tick.

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use tokio::time::{interval, Duration};

use crate::orientation;
use crate::packet::DecodedPacket;
use crate::types::{PositionTag, Sample, Session};

/// Alignment tick period while a recording is active.
pub const TICK_PERIOD: Duration = Duration::from_millis(100);

/// Raw packets retained per position after a flush, allowing short backward
/// overlap for future alignment windows while bounding memory.
pub const RAW_RETAIN: usize = 100;

/// One decoded packet tagged with the position its sensor is assigned to.
/// Reassigning a sensor at runtime only affects packets sent afterwards.
#[derive(Debug, Clone)]
pub struct TaggedPacket {
    pub tag: PositionTag,
    pub packet: DecodedPacket,
}

/// Producer half handed to the transport collaborator. Clone freely; one
/// sender per sensor callback stream is typical.
#[derive(Clone)]
pub struct PacketSender(Sender<TaggedPacket>);

impl PacketSender {
    /// Send one decoded packet. Returns false once the aligner has shut down.
    pub fn send(&self, tag: PositionTag, packet: DecodedPacket) -> bool {
        self.0.send(TaggedPacket { tag, packet }).is_ok()
    }
}

/// Consumer half owned by the aligner task.
pub struct PacketReceiver(Receiver<TaggedPacket>);

/// Create the decoded-packet channel connecting transport to the aligner.
pub fn packet_channel() -> (PacketSender, PacketReceiver) {
    let (tx, rx) = channel::unbounded();
    (PacketSender(tx), PacketReceiver(rx))
}

#[derive(Debug, Default)]
struct PositionBuffer {
    raw: Vec<DecodedPacket>,
    /// Count of raw packets already converted into samples.
    consumed: usize,
    first_timestamp: Option<u32>,
    next_counter: u32,
}

/// Buffers decoded packets per position and periodically merges them into a
/// session with the same shape the batch path produces.
pub struct StreamAligner {
    buffers: [PositionBuffer; 5],
    session: Session,
    degenerate_count: usize,
}

impl StreamAligner {
    pub fn new(start_time: DateTime<Utc>) -> Self {
        StreamAligner {
            buffers: Default::default(),
            session: Session::new(start_time),
            degenerate_count: 0,
        }
    }

    /// Buffer one decoded packet for its position. Single-writer per
    /// position is guaranteed by the owning task, not by locking.
    pub fn ingest(&mut self, tag: PositionTag, packet: DecodedPacket) {
        let buffer = &mut self.buffers[tag.ordinal()];
        if buffer.first_timestamp.is_none() {
            buffer.first_timestamp = Some(packet.timestamp);
        }
        buffer.raw.push(packet);
    }

    /// Convert unconsumed packets into samples, append them to the session
    /// streams, and trim each raw buffer to the most recent [`RAW_RETAIN`]
    /// entries.
    pub fn flush(&mut self) {
        for tag in PositionTag::ALL {
            let buffer = &mut self.buffers[tag.ordinal()];
            if buffer.consumed == buffer.raw.len() && buffer.raw.len() <= RAW_RETAIN {
                continue;
            }
            let first = buffer.first_timestamp.unwrap_or(0);

            let mut converted = Vec::with_capacity(buffer.raw.len() - buffer.consumed);
            for packet in &buffer.raw[buffer.consumed..] {
                let (unit, degenerate) = orientation::normalize_or_identity(packet.quaternion);
                if degenerate {
                    self.degenerate_count += 1;
                    log::warn!("degenerate orientation on {tag}, using identity");
                }
                let (roll, pitch, yaw) = unit.euler_angles();
                buffer.next_counter += 1;
                let relative = packet.timestamp.wrapping_sub(first);
                converted.push(Sample {
                    packet_counter: buffer.next_counter,
                    sample_time: relative,
                    euler: [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()],
                    free_acc: packet.free_acc,
                    status: packet.status,
                    time_seconds: relative as f64 / 1_000_000.0,
                });
            }
            buffer.consumed = buffer.raw.len();

            if buffer.raw.len() > RAW_RETAIN {
                let excess = buffer.raw.len() - RAW_RETAIN;
                buffer.raw.drain(..excess);
                buffer.consumed -= excess;
            }

            if !converted.is_empty() {
                self.session.stream_entry(tag).samples.extend(converted);
            }
        }
    }

    /// Final flush and session hand-off. Whatever was buffered when the
    /// transport stopped feeding packets remains analyzable.
    pub fn into_session(mut self) -> Session {
        self.flush();
        if self.degenerate_count > 0 {
            self.session.warnings.push(format!(
                "{} degenerate orientation packet(s) replaced with identity",
                self.degenerate_count
            ));
        }
        self.session
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Drive an aligner from a packet channel until every sender is dropped,
/// flushing on a fixed tick. Returns the assembled session.
pub async fn run(mut aligner: StreamAligner, rx: PacketReceiver) -> Session {
    let mut tick = interval(TICK_PERIOD);
    loop {
        tick.tick().await;
        let mut disconnected = false;
        loop {
            match rx.0.try_recv() {
                Ok(tagged) => aligner.ingest(tagged.tag, tagged.packet),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            return aligner.into_session();
        }
        aligner.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(timestamp: u32) -> DecodedPacket {
        DecodedPacket {
            timestamp,
            quaternion: [1.0, 0.0, 0.0, 0.0],
            free_acc: None,
            status: None,
            clip_counts: None,
        }
    }

    #[test]
    fn test_counters_and_relative_timestamps() {
        let mut aligner = StreamAligner::new(Utc::now());
        for i in 0..5u32 {
            aligner.ingest(PositionTag::RightThigh, packet(1_000_000 + i * 16_667));
        }
        aligner.flush();

        let session = aligner.session();
        let stream = session.stream(PositionTag::RightThigh).unwrap();
        assert_eq!(stream.len(), 5);
        let first = &stream.samples[0];
        assert_eq!(first.packet_counter, 1);
        assert_eq!(first.sample_time, 0);
        assert_eq!(stream.samples[4].packet_counter, 5);
        assert_eq!(stream.samples[4].sample_time, 4 * 16_667);
    }

    #[test]
    fn test_no_duplicates_across_flushes() {
        let mut aligner = StreamAligner::new(Utc::now());
        for i in 0..150u32 {
            aligner.ingest(PositionTag::LeftShank, packet(i * 10_000));
        }
        aligner.flush();
        for i in 150..200u32 {
            aligner.ingest(PositionTag::LeftShank, packet(i * 10_000));
        }
        aligner.flush();
        aligner.flush(); // idle tick appends nothing

        let session = aligner.into_session();
        let stream = session.stream(PositionTag::LeftShank).unwrap();
        assert_eq!(stream.len(), 200);
        for (i, sample) in stream.samples.iter().enumerate() {
            assert_eq!(sample.packet_counter, (i + 1) as u32);
            assert_eq!(sample.sample_time, i as u32 * 10_000);
        }
    }

    #[test]
    fn test_raw_buffer_is_bounded() {
        let mut aligner = StreamAligner::new(Utc::now());
        for i in 0..500u32 {
            aligner.ingest(PositionTag::Pelvis, packet(i));
        }
        aligner.flush();
        assert_eq!(aligner.buffers[PositionTag::Pelvis.ordinal()].raw.len(), RAW_RETAIN);
    }

    #[test]
    fn test_degenerate_packets_surface_as_warning() {
        let mut aligner = StreamAligner::new(Utc::now());
        let mut degenerate = packet(0);
        degenerate.quaternion = [0.0, 0.0, 0.0, 0.0];
        aligner.ingest(PositionTag::RightShank, degenerate);
        aligner.ingest(PositionTag::RightShank, packet(100));

        let session = aligner.into_session();
        let stream = session.stream(PositionTag::RightShank).unwrap();
        assert_eq!(stream.len(), 2);
        assert!(stream.samples[0].euler.iter().all(|v| v.is_finite()));
        assert!(session.warnings.iter().any(|w| w.contains("degenerate")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_assembles_session_from_channel() {
        let (tx, rx) = packet_channel();
        let aligner = StreamAligner::new(Utc::now());
        let task = tokio::spawn(run(aligner, rx));

        for i in 0..30u32 {
            tx.send(PositionTag::RightThigh, packet(i * 16_667));
            tx.send(PositionTag::RightShank, packet(i * 16_667));
        }
        drop(tx);

        let session = task.await.unwrap();
        assert_eq!(session.stream(PositionTag::RightThigh).unwrap().len(), 30);
        assert_eq!(session.stream(PositionTag::RightShank).unwrap().len(), 30);
        assert!(session.stream(PositionTag::Pelvis).is_none());
    }
}
