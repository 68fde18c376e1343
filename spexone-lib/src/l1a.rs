//! Level-1A assembly from raw SPEXone packet files.
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveTime, Utc};
use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::product::{DimSize, GlobalAttributes, Level, Product};
use crate::spacepacket::{collect_groups, read_packet_file, GroupStats, LogicalPacket};
use crate::telemetry::{
    launch_date, MpsRecord, NomHkRecord, ScienceRecord, Sensor, TmtcIssue, APID_DEMHK,
    APID_NOMHK, APID_SCIENCE, IMAGE_ID_MASK, LEAP_SECONDS,
};
use crate::{Error, Result};

#[derive(TypedBuilder, Debug, Clone)]
pub struct AssemblyOptions {
    /// Selects the science header layout.
    #[builder(default)]
    pub tmtc_issue: TmtcIssue,
    #[builder(default = LEAP_SECONDS)]
    pub leap_seconds: i64,
    /// Product path, or directory in which to create a product with a generated name.
    /// Defaults to a generated name in the current directory.
    #[builder(default, setter(strip_option, into))]
    pub output: Option<PathBuf>,
    /// Measurement identifier used in on-ground product names. Defaults to the stem of
    /// the first input file.
    #[builder(default, setter(strip_option, into))]
    pub msm_id: Option<String>,
    /// Replace an existing product.
    #[builder(default)]
    pub clobber: bool,
    #[builder(default = -1)]
    pub orbit_number: i64,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        AssemblyOptions::builder().build()
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct AssemblySummary {
    pub path: PathBuf,
    pub images: usize,
    pub hk_packets: usize,
    /// Logical packets without a time stamp or with an APID that is not written to the
    /// product.
    pub skipped: usize,
    pub dropped: GroupStats,
    pub inflight: bool,
}

/// A decoded science packet with its UTC time.
#[derive(Debug, Clone)]
pub struct ImagePacket {
    pub time: DateTime<Utc>,
    pub image_id: u16,
    pub record: ScienceRecord,
}

/// A decoded NomHK packet with its UTC time.
#[derive(Debug, Clone)]
pub struct HkPacket {
    pub time: DateTime<Utc>,
    pub record: NomHkRecord,
}

/// Seconds since `midnight` at microsecond resolution.
fn seconds_since(midnight: DateTime<Utc>, time: DateTime<Utc>) -> f64 {
    let delta = time - midnight;
    delta
        .num_microseconds()
        .map_or(delta.num_milliseconds() as f64 / 1e3, |us| us as f64 / 1e6)
}

fn midnight(time: DateTime<Utc>) -> DateTime<Utc> {
    time.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Name of the Level-1A product for a measurement starting at `start`.
///
/// In-flight products follow the PACE naming convention; on-ground measurements are named
/// after their measurement identifier.
#[must_use]
pub fn product_name(start: DateTime<Utc>, msm_id: &str, inflight: bool) -> String {
    if inflight {
        format!("PACE_SPEXONE.{}.L1A.json", start.format("%Y%m%dT%H%M%S"))
    } else {
        format!(
            "SPX1_OCAL_{msm_id}_L1A_{}.json",
            start.format("%Y%m%dT%H%M%S")
        )
    }
}

fn decode_time(logical: &LogicalPacket, leap_seconds: i64) -> Option<DateTime<Utc>> {
    logical.timestamp.map(|ts| ts.to_utc(leap_seconds))
}

/// Write science images, their telemetry and the image attributes.
///
/// Does nothing if `images` is empty.
///
/// # Errors
/// [Error::ImageSize] if the images do not all have the same number of samples, or any
/// error writing the product.
pub fn fill_science(product: &mut Product, images: &[ImagePacket], issue: TmtcIssue) -> Result<()> {
    let Some(first) = images.first() else {
        return Ok(());
    };
    let samples = first.record.image.len();
    let mut flat = Vec::with_capacity(images.len() * samples);
    let mut tlm = Vec::with_capacity(images.len() * MpsRecord::LEN);
    for img in images {
        if img.record.image.len() != samples {
            return Err(Error::ImageSize {
                expected: samples,
                actual: img.record.image.len(),
            });
        }
        flat.extend_from_slice(&img.record.image);
        tlm.extend_from_slice(&img.record.mps_bytes());
    }
    let image_err = |_| Error::ImageSize {
        expected: samples,
        actual: flat_len(images),
    };
    let flat = Array2::from_shape_vec((images.len(), samples), flat).map_err(image_err)?;
    let tlm = Array2::from_shape_vec((images.len(), MpsRecord::LEN), tlm).map_err(image_err)?;

    let epoch = product.epoch();
    product.write_variable("/science_data/detector_images", flat, None)?;
    product.write_variable("/science_data/detector_telemetry", tlm, None)?;

    product.write_variable(
        "/image_attributes/image_ID",
        images.iter().map(|i| i.image_id).collect::<Vec<u16>>(),
        None,
    )?;
    product.write_variable(
        "/image_attributes/binning_table",
        images
            .iter()
            .map(|i| i.record.mps.binning_table())
            .collect::<Vec<i32>>(),
        None,
    )?;
    product.write_variable(
        "/image_attributes/digital_offset",
        images
            .iter()
            .map(|i| i.record.mps.digital_offset())
            .collect::<Vec<i32>>(),
        None,
    )?;
    product.write_variable(
        "/image_attributes/nr_coadditions",
        images
            .iter()
            .map(|i| i.record.mps.nr_coadditions())
            .collect::<Vec<u16>>(),
        None,
    )?;
    product.write_variable(
        "/image_attributes/exposure_time",
        images
            .iter()
            .map(|i| i.record.mps.exposure_time())
            .collect::<Vec<f64>>(),
        None,
    )?;
    if issue.has_icu_time() {
        let icu: Vec<_> = images
            .iter()
            .map(|i| i.record.icu_time.unwrap_or_default())
            .collect();
        product.write_variable(
            "/image_attributes/icu_time_sec",
            icu.iter().map(|t| t.seconds).collect::<Vec<u32>>(),
            None,
        )?;
        product.write_variable(
            "/image_attributes/icu_time_subsec",
            icu.iter().map(|t| t.subseconds).collect::<Vec<u16>>(),
            None,
        )?;
    }
    product.write_variable(
        "/image_attributes/image_time",
        images
            .iter()
            .map(|i| seconds_since(epoch, i.time))
            .collect::<Vec<f64>>(),
        None,
    )?;
    Ok(())
}

fn flat_len(images: &[ImagePacket]) -> usize {
    images.iter().map(|i| i.record.image.len()).sum()
}

/// Write NomHK telemetry and the temperatures derived from it.
///
/// Does nothing if `packets` is empty.
///
/// # Errors
/// Any error writing the product.
pub fn fill_nomhk(product: &mut Product, packets: &[HkPacket]) -> Result<()> {
    if packets.is_empty() {
        return Ok(());
    }
    let mut tlm = Vec::with_capacity(packets.len() * NomHkRecord::LEN);
    for hk in packets {
        tlm.extend_from_slice(&hk.record.to_bytes());
    }
    let tlm = Array2::from_shape_vec((packets.len(), NomHkRecord::LEN), tlm).map_err(|_| {
        Error::Shape {
            name: "/engineering_data/NomHK_telemetry".to_string(),
            expected: vec![packets.len(), NomHkRecord::LEN],
            actual: vec![packets.len() * NomHkRecord::LEN],
        }
    })?;
    product.write_variable("/engineering_data/NomHK_telemetry", tlm, None)?;

    for (sensor, name) in [
        (Sensor::Detector, "/engineering_data/temp_detector"),
        (Sensor::Housing, "/engineering_data/temp_housing"),
        (Sensor::Radiator, "/engineering_data/temp_radiator"),
    ] {
        let temps: Vec<f32> = packets
            .iter()
            .map(|hk| hk.record.temperature(sensor) as f32)
            .collect();
        product.write_variable(name, temps, None)?;
    }

    let epoch = product.epoch();
    product.write_variable(
        "/engineering_data/HK_tlm_time",
        packets
            .iter()
            .map(|hk| seconds_since(epoch, hk.time))
            .collect::<Vec<f64>>(),
        None,
    )?;
    Ok(())
}

/// Read `files` in the given order, reassemble their packets and write a Level-1A product.
///
/// Files with a `.H` extension are CCSDS header files and are skipped. Returns `None` if
/// there are no packets with a time stamp to derive the product from.
///
/// # Errors
/// [Error::TruncatedPacket] if a file ends within a packet, [Error::SchemaMismatch] for a
/// science or NomHK packet too short for its layout, [Error::ImageSize] if the image size
/// changes, or any error creating or writing the product.
pub fn assemble_l1a<P: AsRef<Path>>(
    files: &[P],
    options: &AssemblyOptions,
) -> Result<Option<AssemblySummary>> {
    let mut packets = Vec::default();
    let mut input_files = Vec::default();
    for path in files {
        let path = path.as_ref();
        if path.extension().is_some_and(|ext| ext == "H") {
            info!(path = %path.display(), "skipping CCSDS header file");
            continue;
        }
        let file_packets = read_packet_file(path)?;
        debug!(path = %path.display(), packets = file_packets.len(), "read packet file");
        packets.extend(file_packets);
        input_files.push(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
    }
    if packets.is_empty() {
        warn!("no CCSDS packets found");
        return Ok(None);
    }

    let mut images = Vec::default();
    let mut hk = Vec::default();
    let mut skipped = 0;
    let mut grouper = collect_groups(packets);
    for logical in grouper.by_ref() {
        let Some(time) = decode_time(&logical, options.leap_seconds) else {
            debug!(apid = logical.apid, "skipping packet without time stamp");
            skipped += 1;
            continue;
        };
        match logical.apid {
            APID_SCIENCE => images.push(ImagePacket {
                time,
                image_id: logical.sequence_count & IMAGE_ID_MASK,
                record: ScienceRecord::decode(&logical.data, options.tmtc_issue)?,
            }),
            APID_NOMHK => hk.push(HkPacket {
                time,
                record: NomHkRecord::decode(&logical.data)?,
            }),
            APID_DEMHK => {
                debug!(apid = APID_DEMHK, "skipping DemHK packet");
                skipped += 1;
            }
            apid => {
                debug!(apid, "skipping unsupported APID");
                skipped += 1;
            }
        }
    }
    let dropped = grouper.stats();
    if dropped.dropped() > 0 {
        warn!(
            orphans = dropped.orphans,
            abandoned = dropped.abandoned,
            broken = dropped.broken,
            "packets dropped during reassembly"
        );
    }

    let Some(start) = images
        .first()
        .map(|i| i.time)
        .or_else(|| hk.first().map(|h| h.time))
    else {
        warn!("no science or housekeeping packets found");
        return Ok(None);
    };

    let inflight = start >= launch_date();
    let msm_id = options.msm_id.clone().unwrap_or_else(|| {
        files
            .first()
            .and_then(|p| p.as_ref().file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let name = product_name(start, &msm_id, inflight);
    let path = match &options.output {
        Some(out) if out.is_dir() => out.join(&name),
        Some(out) => out.clone(),
        None => PathBuf::from(&name),
    };

    let mut dims = Vec::default();
    if let Some(first) = images.first() {
        dims.push(("samples_per_image", DimSize::Fixed(first.record.image.len())));
    }
    let epoch = midnight(start);
    let mut product = if options.clobber {
        Product::create_clobber(&path, Level::L1A, epoch, &dims)?
    } else {
        Product::create(&path, Level::L1A, epoch, &dims)?
    };
    info!(
        path = %path.display(),
        images = images.len(),
        hk_packets = hk.len(),
        inflight,
        "writing Level-1A product"
    );

    fill_science(&mut product, &images, options.tmtc_issue)?;
    fill_nomhk(&mut product, &hk)?;
    product.fill_global_attrs(
        GlobalAttributes::builder()
            .product_name(name)
            .orbit_number(options.orbit_number)
            .inflight(inflight)
            .build(),
    )?;
    product.set_attr("input_files", input_files, None)?;
    product.close()?;

    Ok(Some(AssemblySummary {
        path,
        images: images.len(),
        hk_packets: hk.len(),
        skipped,
        dropped,
        inflight,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn product_names() {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(
            product_name(start, "ignored", true),
            "PACE_SPEXONE.20230301T123005.L1A.json"
        );
        assert_eq!(
            product_name(start, "DARK_001", false),
            "SPX1_OCAL_DARK_001_L1A_20230301T123005.json"
        );
    }

    #[test]
    fn seconds_since_midnight() {
        let time = Utc.with_ymd_and_hms(2023, 3, 1, 1, 0, 0).unwrap()
            + chrono::TimeDelta::microseconds(250_000);
        let midnight = midnight(time);

        assert_eq!(midnight, Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(seconds_since(midnight, time), 3600.25);
    }

    #[test]
    fn default_options() {
        let opts = AssemblyOptions::default();
        assert_eq!(opts.tmtc_issue, TmtcIssue(12));
        assert_eq!(opts.leap_seconds, 27);
        assert!(!opts.clobber);
    }
}
