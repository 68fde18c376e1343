#![allow(dead_code)]
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use spexone::telemetry::{MpsRecord, TmtcIssue, LEAP_SECONDS};
use spexone::{PrimaryHeader, SequenceFlag, Timestamp};

/// Secondary header time stamp for a UTC time, with 2^-16 s resolution.
pub fn tai(utc: DateTime<Utc>) -> Timestamp {
    let seconds = utc.timestamp() + LEAP_SECONDS;
    let subseconds = (u64::from(utc.timestamp_subsec_nanos()) << 16) / 1_000_000_000;
    Timestamp {
        seconds: seconds as u32,
        subseconds: subseconds as u16,
    }
}

pub fn utc(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32, millis: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, hh, mm, ss).unwrap() + TimeDelta::milliseconds(millis)
}

pub fn encode_packet(
    apid: u16,
    flags: SequenceFlag,
    seqid: u16,
    ts: Timestamp,
    payload: &[u8],
) -> Vec<u8> {
    let header = PrimaryHeader {
        version: 0,
        type_flag: 0,
        has_secondary_header: true,
        apid,
        sequence_flags: flags,
        sequence_id: seqid,
        len_minus1: (Timestamp::LEN + payload.len() - 1) as u16,
    };
    let mut buf = header.to_bytes().to_vec();
    buf.extend(ts.to_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Encode `payload` as `parts` packets; a single part is a standalone packet.
pub fn encode_segmented(
    apid: u16,
    first_seqid: u16,
    ts: Timestamp,
    payload: &[u8],
    parts: usize,
) -> Vec<u8> {
    if parts <= 1 {
        return encode_packet(apid, SequenceFlag::Standalone, first_seqid, ts, payload);
    }
    let chunk = payload.len().div_ceil(parts);
    let chunks: Vec<&[u8]> = payload.chunks(chunk).collect();
    let mut buf = Vec::default();
    for (idx, part) in chunks.iter().enumerate() {
        let flags = match idx {
            0 => SequenceFlag::First,
            i if i == chunks.len() - 1 => SequenceFlag::Last,
            _ => SequenceFlag::Continuation,
        };
        let seqid = (first_seqid + idx as u16) & PrimaryHeader::SEQ_MAX;
        buf.extend(encode_packet(apid, flags, seqid, ts, part));
    }
    buf
}

pub fn mps() -> MpsRecord {
    MpsRecord {
        icu_sw_version: 0x0129,
        mps_id: 7,
        det_exptime: 1000,
        det_fotlen: 100,
        det_offset: 0,
        reg_full_frame: 1,
        reg_ncoaddframes: 4,
        ..MpsRecord::default()
    }
}

/// Science packet payload: MPS, ICU time for issue 12 and up, big-endian image samples.
pub fn science_payload(issue: TmtcIssue, icu_time: Timestamp, image: &[u16]) -> Vec<u8> {
    let mut buf = mps().to_bytes().to_vec();
    if issue.has_icu_time() {
        buf.extend(icu_time.to_bytes());
    }
    for sample in image {
        buf.extend(sample.to_be_bytes());
    }
    buf
}

pub fn write_file(dir: &Path, name: &str, dat: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, dat).unwrap();
    path
}
