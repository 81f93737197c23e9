//! CSV archive loader and writer.
//!
//! An archive is a directory of per-sensor text files in the Movella DOT
//! Fusion export layout: metadata lines (one of which carries the
//! `DeviceTag:` position assignment), a column header row, then fixed-width
//! numeric rows. The writer emits the exact same layout so a live recording
//! exported here can be re-loaded by this module or by third-party tooling.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{PositionTag, Sample, SensorStream, Session};

const COLUMN_HEADER: &str =
    "PacketCounter,SampleTimeFine,Euler_X,Euler_Y,Euler_Z,FreeAcc_X,FreeAcc_Y,FreeAcc_Z,Status";

/// Extract the numeric device tag from a CSV header. Tolerates both
/// `DeviceTag: N` and `DeviceTag:,N` metadata forms.
pub fn extract_device_tag(content: &str) -> Option<u8> {
    for line in content.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("DeviceTag:") {
            let rest = rest.trim_start();
            let rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(tag) = digits.parse::<u8>() {
                return Some(tag);
            }
        }
    }
    None
}

/// Parse the data block of one sensor file into samples ordered by
/// `sample_time`. Rows with non-finite Euler values are discarded; packet
/// counters are reassigned sequentially from 1 after ordering.
fn parse_data_rows(content: &str) -> Vec<Sample> {
    let lines: Vec<&str> = content.lines().collect();
    let header_index = match lines.iter().position(|l| l.contains("PacketCounter")) {
        Some(i) => i,
        None => return Vec::new(),
    };

    struct RawRow {
        sample_time: u32,
        euler: [f64; 3],
        free_acc: [f64; 3],
        status: u8,
    }

    let mut rows: Vec<RawRow> = Vec::new();
    for line in &lines[header_index + 1..] {
        if line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split(',').collect();
        if columns.len() < 9 {
            continue;
        }

        let sample_time = match columns[1].trim().parse::<u32>() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let mut euler = [0.0f64; 3];
        let mut valid = true;
        for (slot, column) in euler.iter_mut().zip(&columns[2..5]) {
            match column.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => *slot = v,
                _ => {
                    valid = false;
                    break;
                }
            }
        }
        if !valid {
            continue;
        }

        let mut free_acc = [0.0f64; 3];
        for (slot, column) in free_acc.iter_mut().zip(&columns[5..8]) {
            *slot = column.trim().parse::<f64>().unwrap_or(0.0);
        }
        let status = columns[8].trim().parse::<u8>().unwrap_or(0);

        rows.push(RawRow {
            sample_time,
            euler,
            free_acc,
            status,
        });
    }

    rows.sort_by_key(|r| r.sample_time);
    let first_time = rows.first().map(|r| r.sample_time).unwrap_or(0);

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let relative = row.sample_time.wrapping_sub(first_time);
            Sample {
                packet_counter: (i + 1) as u32,
                sample_time: relative,
                euler: row.euler,
                free_acc: Some(row.free_acc),
                status: Some(row.status),
                time_seconds: relative as f64 / 1_000_000.0,
            }
        })
        .collect()
}

fn read_entry(path: &Path) -> std::io::Result<String> {
    if path.extension().is_some_and(|e| e == "gz") {
        let file = fs::File::open(path)?;
        let mut content = String::new();
        GzDecoder::new(file).read_to_string(&mut content)?;
        Ok(content)
    } else {
        fs::read_to_string(path)
    }
}

fn is_sensor_entry(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    name.ends_with(".csv") || name.ends_with(".txt") || name.ends_with(".csv.gz")
}

/// Load a session from an archive directory. Entries without a recognizable
/// tag or data block are skipped with a warning on the returned session;
/// a duplicate tag overwrites the earlier stream with a warning. Missing
/// sensor coverage is only fatal at aggregation time.
pub fn load_session_from_dir(dir: &Path) -> Result<Session> {
    let mut session = Session::new(Utc::now());

    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    // Deterministic processing order so duplicate-tag resolution is stable.
    entries.sort();

    for path in entries {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<invalid>")
            .to_string();
        if !is_sensor_entry(&path) {
            log::debug!("skipping non-sensor entry {name}");
            continue;
        }

        let content = match read_entry(&path) {
            Ok(c) => c,
            Err(e) => {
                session
                    .warnings
                    .push(format!("unreadable entry {name}: {e}"));
                continue;
            }
        };

        let raw_tag = match extract_device_tag(&content) {
            Some(t) => t,
            None => {
                session
                    .warnings
                    .push(format!("no DeviceTag metadata in {name}, skipping"));
                continue;
            }
        };
        let tag = match PositionTag::from_raw(raw_tag) {
            Some(t) => t,
            None => {
                session
                    .warnings
                    .push(format!("unknown DeviceTag {raw_tag} in {name}, skipping"));
                continue;
            }
        };

        let samples = parse_data_rows(&content);
        if samples.is_empty() {
            session
                .warnings
                .push(format!("no valid data rows in {name}, skipping"));
            continue;
        }

        log::info!("loaded {} samples for {tag} from {name}", samples.len());
        let stream = SensorStream { tag, samples };
        if session.insert(stream).is_some() {
            session
                .warnings
                .push(format!("duplicate DeviceTag {raw_tag}: {name} overwrites earlier stream"));
        }
    }

    Ok(session)
}

/// Archive filename for one position: `{tag}_{YYYYMMDD}_{HHMMSS}_{mmm}.csv`.
pub fn sensor_csv_filename(tag: PositionTag, start_time: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{:03}.csv",
        tag.raw(),
        start_time.format("%Y%m%d_%H%M%S"),
        start_time.timestamp_subsec_millis()
    )
}

/// Serialize one sensor stream into the export CSV layout. Free acceleration
/// and status are zero-filled when the live source omitted them.
pub fn write_sensor_csv(stream: &SensorStream, start_time: DateTime<Utc>) -> String {
    let start_str = format!(
        "{}_{:03} WEST",
        start_time.format("%Y-%m-%d_%H:%M:%S"),
        start_time.timestamp_subsec_millis()
    );

    let mut out = String::new();
    out.push_str("sep=,\n");
    out.push_str(&format!("DeviceTag:,{}\n", stream.tag.raw()));
    out.push_str("FirmwareVersion:,3.0.0\n");
    out.push_str("AppVersion:,2023.6.0\n");
    out.push_str("SyncStatus:,Synced\n");
    out.push_str("OutputRate:,60Hz\n");
    out.push_str("FilterProfile:,General\n");
    out.push_str("Measurement Mode:,Sensor fusion Mode - Extended(Euler)\n");
    out.push_str(&format!("StartTime: ,{start_str}\n"));
    out.push_str("© Movella Technologies B. V. 2005-2025\n");
    out.push('\n');
    out.push_str(COLUMN_HEADER);
    out.push('\n');

    for sample in &stream.samples {
        let acc = sample.free_acc.unwrap_or([0.0; 3]);
        let status = sample.status.unwrap_or(0);
        out.push_str(&format!(
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{}\n",
            sample.packet_counter,
            sample.sample_time,
            sample.euler[0],
            sample.euler[1],
            sample.euler[2],
            acc[0],
            acc[1],
            acc[2],
            status
        ));
    }

    out
}

/// Write every present stream of a session into `dir`, one CSV per position.
/// Returns the written paths.
pub fn export_session_to_dir(session: &Session, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for stream in session.streams() {
        let path = dir.join(sensor_csv_filename(stream.tag, session.start_time));
        fs::write(&path, write_sensor_csv(stream, session.start_time))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn sample_stream(tag: PositionTag, count: usize) -> SensorStream {
        let samples = (0..count)
            .map(|i| Sample {
                packet_counter: (i + 1) as u32,
                sample_time: (i as u32) * 16_667,
                euler: [10.0 + i as f64 * 0.5, -3.25, 91.125],
                free_acc: Some([0.01, 0.02, 9.81]),
                status: Some(0),
                time_seconds: i as f64 * 16_667.0 / 1e6,
            })
            .collect();
        SensorStream { tag, samples }
    }

    fn fixed_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn test_extract_device_tag_formats() {
        assert_eq!(extract_device_tag("sep=,\nDeviceTag:,3\n"), Some(3));
        assert_eq!(extract_device_tag("DeviceTag: 5\n"), Some(5));
        assert_eq!(extract_device_tag("DeviceTag:, 2\n"), Some(2));
        assert_eq!(extract_device_tag("FirmwareVersion:,3.0.0\n"), None);
    }

    #[test]
    fn test_writer_header_layout() {
        let csv = write_sensor_csv(&sample_stream(PositionTag::RightThigh, 2), fixed_start());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "sep=,");
        assert_eq!(lines[1], "DeviceTag:,1");
        assert_eq!(lines[8], "StartTime: ,2025-03-14_09:26:53_000 WEST");
        assert_eq!(lines[9], "© Movella Technologies B. V. 2005-2025");
        assert_eq!(lines[10], "");
        assert_eq!(lines[11], COLUMN_HEADER);
        assert!(lines[12].starts_with("1,0,10.000000,"));
    }

    #[test]
    fn test_filename_layout() {
        assert_eq!(
            sensor_csv_filename(PositionTag::LeftShank, fixed_start()),
            "4_20250314_092653_000.csv"
        );
    }

    #[test]
    fn test_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(fixed_start());
        session.insert(sample_stream(PositionTag::RightThigh, 50));
        session.insert(sample_stream(PositionTag::RightShank, 50));

        let written = export_session_to_dir(&session, dir.path()).unwrap();
        assert_eq!(written.len(), 2);

        let loaded = load_session_from_dir(dir.path()).unwrap();
        assert!(loaded.warnings.is_empty());
        let original = session.stream(PositionTag::RightThigh).unwrap();
        let restored = loaded.stream(PositionTag::RightThigh).unwrap();
        assert_eq!(original.len(), restored.len());
        for (a, b) in original.samples.iter().zip(&restored.samples) {
            assert_eq!(a.packet_counter, b.packet_counter);
            assert_eq!(a.sample_time, b.sample_time);
            for axis in 0..3 {
                assert_relative_eq!(a.euler[axis], b.euler[axis], epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn test_unknown_tag_and_junk_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut bogus = write_sensor_csv(&sample_stream(PositionTag::Pelvis, 5), fixed_start());
        bogus = bogus.replace("DeviceTag:,5", "DeviceTag:,9");
        fs::write(dir.path().join("sensor.csv"), bogus).unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();
        fs::write(
            dir.path().join("good.csv"),
            write_sensor_csv(&sample_stream(PositionTag::LeftThigh, 5), fixed_start()),
        )
        .unwrap();

        let session = load_session_from_dir(dir.path()).unwrap();
        assert!(session.stream(PositionTag::LeftThigh).is_some());
        assert!(session.stream(PositionTag::Pelvis).is_none());
        assert!(session
            .warnings
            .iter()
            .any(|w| w.contains("unknown DeviceTag 9")));
    }

    #[test]
    fn test_duplicate_tag_overwrites_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let first = sample_stream(PositionTag::RightThigh, 3);
        let second = sample_stream(PositionTag::RightThigh, 7);
        fs::write(
            dir.path().join("a_first.csv"),
            write_sensor_csv(&first, fixed_start()),
        )
        .unwrap();
        fs::write(
            dir.path().join("b_second.csv"),
            write_sensor_csv(&second, fixed_start()),
        )
        .unwrap();

        let session = load_session_from_dir(dir.path()).unwrap();
        assert_eq!(session.stream(PositionTag::RightThigh).unwrap().len(), 7);
        assert!(session.warnings.iter().any(|w| w.contains("duplicate")));
    }

    #[test]
    fn test_gzipped_entry_loads() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write_sensor_csv(&sample_stream(PositionTag::Pelvis, 4), fixed_start());
        let file = fs::File::create(dir.path().join("5_export.csv.gz")).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(csv.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let session = load_session_from_dir(dir.path()).unwrap();
        assert_eq!(session.stream(PositionTag::Pelvis).unwrap().len(), 4);
    }

    #[test]
    fn test_non_finite_rows_are_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = write_sensor_csv(&sample_stream(PositionTag::LeftShank, 3), fixed_start());
        csv.push_str("4,50001,NaN,0.0,0.0,0.0,0.0,0.0,0\n");
        csv.push_str("5,66668,1.0,2.0,3.0,0.0,0.0,0.0,0\n");
        fs::write(dir.path().join("s.csv"), csv).unwrap();

        let session = load_session_from_dir(dir.path()).unwrap();
        let stream = session.stream(PositionTag::LeftShank).unwrap();
        assert_eq!(stream.len(), 4);
        // Counters are reassigned after the NaN row is dropped.
        let counters: Vec<u32> = stream.samples.iter().map(|s| s.packet_counter).collect();
        assert_eq!(counters, vec![1, 2, 3, 4]);
    }
}
