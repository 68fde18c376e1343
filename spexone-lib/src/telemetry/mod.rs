//! SPEXone telemetry records.
//!
//! Decodes the fixed-layout records carried in reassembled [LogicalPacket] payloads:
//! the science header (measurement parameter set, MPS) preceding each detector image and
//! the nominal housekeeping (NomHK) record. All fields are big-endian.
//!
//! [LogicalPacket]: crate::spacepacket::LogicalPacket
mod temperature;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spacepacket::{Apid, Timestamp};
use crate::{Error, Result};

pub use temperature::{frac_poly, Sensor, FRAC_POLY_COEFS};

/// Science packets: MPS header followed by one detector image.
pub const APID_SCIENCE: Apid = 0x350;
/// Nominal housekeeping packets.
pub const APID_NOMHK: Apid = 0x320;
/// Detector housekeeping packets.
pub const APID_DEMHK: Apid = 0x322;

/// Image frame counter width.
pub const IMAGE_ID_MASK: u16 = 0x3FFF;

/// TAI - UTC offset applied to secondary header time stamps.
pub const LEAP_SECONDS: i64 = 27;

/// PACE launch date, 2022-11-02T00:00:00Z, in seconds since 1970.
pub const LAUNCH_DATE_SECONDS: i64 = 1_667_347_200;

/// Measurements before this date are on-ground calibration measurements.
#[must_use]
pub fn launch_date() -> DateTime<Utc> {
    DateTime::from_timestamp(LAUNCH_DATE_SECONDS, 0).unwrap_or_default()
}

/// Issue of the TMTC handbook describing the science header layout.
///
/// * `< 12`: science header is the MPS record only
/// * `>= 12`: a 6 byte ICU time stamp follows the MPS record (since 15-May-2020)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TmtcIssue(pub u8);

impl Default for TmtcIssue {
    fn default() -> Self {
        TmtcIssue(12)
    }
}

impl TmtcIssue {
    #[must_use]
    pub fn has_icu_time(&self) -> bool {
        self.0 >= 12
    }

    /// Number of bytes preceding the image data in a science packet.
    #[must_use]
    pub fn science_header_len(&self) -> usize {
        if self.has_icu_time() {
            MpsRecord::LEN + Timestamp::LEN
        } else {
            MpsRecord::LEN
        }
    }
}

fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn require(record: &'static str, buf: &[u8], minimum: usize) -> Result<()> {
    if buf.len() < minimum {
        return Err(Error::SchemaMismatch {
            record,
            actual: buf.len(),
            minimum,
        });
    }
    Ok(())
}

/// Measurement parameter set as reported in the science header.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MpsRecord {
    pub icu_sw_version: u16,
    pub mps_id: u8,
    pub mps_version: u8,
    /// Detector thermistor, raw counts
    pub ts1_dem_n_t: u32,
    /// Housing thermistor, raw counts
    pub ts2_housing_n_t: u32,
    /// Radiator thermistor, raw counts
    pub ts3_radiator_n_t: u32,
    pub det_exptime: u32,
    pub det_fotlen: u16,
    pub det_offset: u16,
    pub reg_full_frame: u8,
    pub reg_cmv_outputmode: u8,
    pub reg_ncoaddframes: u8,
    pub reg_binning_table_start: u32,
}

impl MpsRecord {
    pub const LEN: usize = 32;

    /// # Errors
    /// [Error::SchemaMismatch] if `buf` holds fewer than [MpsRecord::LEN] bytes.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        require("MPS", buf, Self::LEN)?;
        Ok(MpsRecord {
            icu_sw_version: be_u16(buf, 0),
            mps_id: buf[2],
            mps_version: buf[3],
            ts1_dem_n_t: be_u32(buf, 4),
            ts2_housing_n_t: be_u32(buf, 8),
            ts3_radiator_n_t: be_u32(buf, 12),
            det_exptime: be_u32(buf, 16),
            det_fotlen: be_u16(buf, 20),
            det_offset: be_u16(buf, 22),
            reg_full_frame: buf[24],
            reg_cmv_outputmode: buf[25],
            reg_ncoaddframes: buf[26],
            // buf[27] reserved
            reg_binning_table_start: be_u32(buf, 28),
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..2].copy_from_slice(&self.icu_sw_version.to_be_bytes());
        buf[2] = self.mps_id;
        buf[3] = self.mps_version;
        buf[4..8].copy_from_slice(&self.ts1_dem_n_t.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ts2_housing_n_t.to_be_bytes());
        buf[12..16].copy_from_slice(&self.ts3_radiator_n_t.to_be_bytes());
        buf[16..20].copy_from_slice(&self.det_exptime.to_be_bytes());
        buf[20..22].copy_from_slice(&self.det_fotlen.to_be_bytes());
        buf[22..24].copy_from_slice(&self.det_offset.to_be_bytes());
        buf[24] = self.reg_full_frame;
        buf[25] = self.reg_cmv_outputmode;
        buf[26] = self.reg_ncoaddframes;
        buf[28..32].copy_from_slice(&self.reg_binning_table_start.to_be_bytes());
        buf
    }

    /// Binning table identifier; -1 for full-frame images.
    #[must_use]
    pub fn binning_table(&self) -> i32 {
        if self.reg_full_frame == 1 {
            return -1;
        }
        let offset = i64::from(self.reg_binning_table_start) - 0x8000_0000;
        (offset / 0x40_0000 + 1) as i32
    }

    /// Digital offset; `det_offset` is a 14-bit two's complement value relative to 70.
    #[must_use]
    pub fn digital_offset(&self) -> i32 {
        let raw = i32::from(self.det_offset & 0x3FFF);
        let signed = if raw >= 8192 { raw - 16384 } else { raw };
        signed + 70
    }

    /// Exposure time in seconds.
    #[must_use]
    pub fn exposure_time(&self) -> f64 {
        1.29e-5 * (0.43 * f64::from(self.det_fotlen) + f64::from(self.det_exptime))
    }

    #[must_use]
    pub fn nr_coadditions(&self) -> u16 {
        u16::from(self.reg_ncoaddframes)
    }
}

/// A decoded science packet: MPS, optional ICU time stamp, and image samples.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScienceRecord {
    pub mps: MpsRecord,
    /// Only present for TMTC issue 12 and later.
    pub icu_time: Option<Timestamp>,
    pub image: Vec<u16>,
}

impl ScienceRecord {
    /// Decode the payload of a reassembled science packet.
    ///
    /// # Errors
    /// [Error::SchemaMismatch] if the payload is shorter than the science header for
    /// `issue`, or if the image data has an odd number of bytes.
    pub fn decode(payload: &[u8], issue: TmtcIssue) -> Result<Self> {
        let header_len = issue.science_header_len();
        require("science header", payload, header_len)?;

        let mps = MpsRecord::decode(&payload[..MpsRecord::LEN])?;
        let icu_time = if issue.has_icu_time() {
            Timestamp::decode(&payload[MpsRecord::LEN..header_len])
        } else {
            None
        };

        let raw = &payload[header_len..];
        if raw.len() % 2 != 0 {
            return Err(Error::SchemaMismatch {
                record: "detector image",
                actual: raw.len(),
                minimum: raw.len() + 1,
            });
        }
        let image = raw
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();

        Ok(ScienceRecord {
            mps,
            icu_time,
            image,
        })
    }

    /// Raw science header bytes, as stored in the Level-1A detector telemetry.
    #[must_use]
    pub fn mps_bytes(&self) -> [u8; MpsRecord::LEN] {
        self.mps.to_bytes()
    }
}

/// Nominal housekeeping record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NomHkRecord {
    pub ts1_dem_n_t: u32,
    pub ts2_housing_n_t: u32,
    pub ts3_radiator_n_t: u32,
    pub icu_5v_raw: u16,
    pub icu_4v_raw: u16,
    pub heater_status: u8,
    /// Instrument software mode
    pub sw_mode: u8,
}

impl NomHkRecord {
    pub const LEN: usize = 20;

    /// Decode a NomHK payload. Bytes beyond [NomHkRecord::LEN] are ignored.
    ///
    /// # Errors
    /// [Error::SchemaMismatch] if `buf` is too short.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        require("NomHK", buf, Self::LEN)?;
        Ok(NomHkRecord {
            ts1_dem_n_t: be_u32(buf, 0),
            ts2_housing_n_t: be_u32(buf, 4),
            ts3_radiator_n_t: be_u32(buf, 8),
            icu_5v_raw: be_u16(buf, 12),
            icu_4v_raw: be_u16(buf, 14),
            heater_status: buf[16],
            sw_mode: buf[17],
        })
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..4].copy_from_slice(&self.ts1_dem_n_t.to_be_bytes());
        buf[4..8].copy_from_slice(&self.ts2_housing_n_t.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ts3_radiator_n_t.to_be_bytes());
        buf[12..14].copy_from_slice(&self.icu_5v_raw.to_be_bytes());
        buf[14..16].copy_from_slice(&self.icu_4v_raw.to_be_bytes());
        buf[16] = self.heater_status;
        buf[17] = self.sw_mode;
        buf
    }

    #[must_use]
    pub fn raw(&self, sensor: Sensor) -> u32 {
        match sensor {
            Sensor::Detector => self.ts1_dem_n_t,
            Sensor::Housing => self.ts2_housing_n_t,
            Sensor::Radiator => self.ts3_radiator_n_t,
        }
    }

    /// Calibrated temperature in Kelvin.
    #[must_use]
    pub fn temperature(&self, sensor: Sensor) -> f64 {
        sensor.to_kelvin(self.raw(sensor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn mps() -> MpsRecord {
        MpsRecord {
            icu_sw_version: 0x0129,
            mps_id: 42,
            mps_version: 3,
            ts1_dem_n_t: 3_000_000,
            ts2_housing_n_t: 2_500_000,
            ts3_radiator_n_t: 0,
            det_exptime: 1000,
            det_fotlen: 200,
            det_offset: 10,
            reg_full_frame: 2,
            reg_cmv_outputmode: 3,
            reg_ncoaddframes: 5,
            reg_binning_table_start: 0x80C0_0000,
        }
    }

    #[test]
    fn mps_bytes_decode() {
        let rec = mps();
        let decoded = MpsRecord::decode(&rec.to_bytes()).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn mps_derived_fields() {
        let rec = mps();
        assert_eq!(rec.binning_table(), 4);
        assert_eq!(rec.digital_offset(), 80);
        assert_eq!(rec.nr_coadditions(), 5);
        assert!((rec.exposure_time() - 1.29e-5 * (0.43 * 200.0 + 1000.0)).abs() < 1e-15);
    }

    #[test_case(0, 70)]
    #[test_case(8191, 8261)]
    #[test_case(8192, -8122)]
    #[test_case(16383, 69)]
    fn digital_offset_is_signed(raw: u16, expected: i32) {
        let rec = MpsRecord {
            det_offset: raw,
            ..mps()
        };
        assert_eq!(rec.digital_offset(), expected);
    }

    #[test]
    fn full_frame_binning_table() {
        let rec = MpsRecord {
            reg_full_frame: 1,
            ..mps()
        };
        assert_eq!(rec.binning_table(), -1);
    }

    #[test]
    fn mps_too_short() {
        let zult = MpsRecord::decode(&[0u8; 31]);
        assert!(matches!(
            zult,
            Err(Error::SchemaMismatch {
                actual: 31,
                minimum: 32,
                ..
            })
        ));
    }

    #[test_case(TmtcIssue(11), None)]
    #[test_case(TmtcIssue(12), Some(Timestamp { seconds: 7, subseconds: 9 }))]
    fn science_record_by_issue(issue: TmtcIssue, icu_time: Option<Timestamp>) {
        let mut payload = mps().to_bytes().to_vec();
        if let Some(ts) = icu_time {
            payload.extend(ts.to_bytes());
        }
        payload.extend([0x01, 0x02, 0xff, 0xfe]);

        let rec = ScienceRecord::decode(&payload, issue).unwrap();

        assert_eq!(rec.mps, mps());
        assert_eq!(rec.icu_time, icu_time);
        assert_eq!(rec.image, vec![0x0102, 0xfffe]);
    }

    #[test]
    fn science_record_too_short_for_issue() {
        // fine for issue 11, too short once the ICU time stamp is expected
        let payload = mps().to_bytes().to_vec();
        assert!(ScienceRecord::decode(&payload, TmtcIssue(11)).is_ok());
        assert!(matches!(
            ScienceRecord::decode(&payload, TmtcIssue(12)),
            Err(Error::SchemaMismatch { actual: 32, minimum: 38, .. })
        ));
    }

    #[test]
    fn science_record_odd_image() {
        let mut payload = mps().to_bytes().to_vec();
        payload.extend([1, 2, 3]);
        assert!(ScienceRecord::decode(&payload, TmtcIssue(11)).is_err());
    }

    #[test]
    fn launch() {
        assert_eq!(launch_date().to_rfc3339(), "2022-11-02T00:00:00+00:00");
    }

    #[test]
    fn nomhk_temperatures() {
        let rec = NomHkRecord {
            ts1_dem_n_t: 3_000_000,
            ts2_housing_n_t: 0,
            ts3_radiator_n_t: 0,
            sw_mode: 2,
            ..NomHkRecord::default()
        };
        let decoded = NomHkRecord::decode(&rec.to_bytes()).unwrap();

        assert_eq!(decoded, rec);
        assert!((decoded.temperature(Sensor::Detector) - 309.894_281_568_552_06).abs() < 1e-9);
        assert_eq!(decoded.temperature(Sensor::Housing), 293.0);
        assert_eq!(decoded.temperature(Sensor::Radiator), 294.0);
    }
}
