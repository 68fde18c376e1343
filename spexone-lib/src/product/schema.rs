//! Static product definitions per processing level.
use std::collections::HashSet;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::values::Dtype;
use crate::{Error, Result};

/// Processing level of a SPEXone Level-1 product.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    L1A,
    L1B,
    L1C,
}

impl Level {
    #[must_use]
    pub fn schema(&self) -> &'static Schema {
        match self {
            Level::L1A => &L1A,
            Level::L1B => &L1B,
            Level::L1C => &L1C,
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Level::L1A => "L1A",
            Level::L1B => "L1B",
            Level::L1C => "L1C",
        };
        write!(f, "{name}")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DimSize {
    Fixed(usize),
    Unlimited,
}

#[derive(Debug)]
pub struct DimDecl {
    pub name: &'static str,
    pub size: DimSize,
}

#[derive(Debug)]
pub struct VarDecl {
    /// Full path, e.g., `/science_data/detector_images`
    pub path: &'static str,
    pub dtype: Dtype,
    pub dims: &'static [&'static str],
    pub units: Option<&'static str>,
    pub long_name: &'static str,
}

impl VarDecl {
    /// Group part of the path, e.g., `/science_data`.
    #[must_use]
    pub fn group(&self) -> &'static str {
        let path: &'static str = self.path;
        match path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &path[..idx],
        }
    }
}

/// Variables in `groups` (minus `exclude`) must have `dimension` rows stored.
#[derive(Debug)]
pub struct CheckSet {
    pub dimension: &'static str,
    pub groups: &'static [&'static str],
    pub exclude: &'static [&'static str],
    /// Variables never written are not reported.
    pub allow_empty: bool,
}

impl CheckSet {
    #[must_use]
    pub fn covers(&self, var: &VarDecl) -> bool {
        self.groups.contains(&var.group()) && !self.exclude.contains(&var.path)
    }
}

#[derive(Debug)]
pub struct Schema {
    pub level: Level,
    pub title: &'static str,
    pub dimensions: &'static [DimDecl],
    pub groups: &'static [&'static str],
    pub variables: &'static [VarDecl],
    /// A product with zero rows along this dimension is closed without finalizing.
    pub primary_dimension: &'static str,
    /// Seconds since the reference epoch; source of the time coverage attributes.
    pub time_variable: &'static str,
    pub checks: &'static [CheckSet],
}

impl Schema {
    #[must_use]
    pub fn variable(&self, path: &str) -> Option<&'static VarDecl> {
        self.variables.iter().find(|v| v.path == path)
    }

    #[must_use]
    pub fn dimension(&self, name: &str) -> Option<&'static DimDecl> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// Check internal consistency of the declarations.
    ///
    /// # Errors
    /// [Error::Format] naming the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for var in self.variables {
            if !seen.insert(var.path) {
                return Err(Error::Format(format!("duplicate variable {}", var.path)));
            }
            if !self.groups.contains(&var.group()) {
                return Err(Error::Format(format!(
                    "variable {} in undeclared group {}",
                    var.path,
                    var.group()
                )));
            }
            for (idx, dim) in var.dims.iter().enumerate() {
                let Some(decl) = self.dimension(dim) else {
                    return Err(Error::UnknownDimension((*dim).to_string()));
                };
                if idx > 0 && decl.size == DimSize::Unlimited {
                    return Err(Error::Format(format!(
                        "variable {}: only the first dimension may be unlimited",
                        var.path
                    )));
                }
            }
        }
        if self.dimension(self.primary_dimension).is_none() {
            return Err(Error::UnknownDimension(self.primary_dimension.to_string()));
        }
        if self.variable(self.time_variable).is_none() {
            return Err(Error::UnknownVariable(self.time_variable.to_string()));
        }
        for check in self.checks {
            if self.dimension(check.dimension).is_none() {
                return Err(Error::UnknownDimension(check.dimension.to_string()));
            }
        }
        Ok(())
    }
}

macro_rules! var {
    ($path:literal, $dtype:ident, [$($dim:literal),*], $units:expr, $long:literal) => {
        VarDecl {
            path: $path,
            dtype: Dtype::$dtype,
            dims: &[$($dim),*],
            units: $units,
            long_name: $long,
        }
    };
}

const SECONDS: Option<&str> = Some("seconds");
const KELVIN: Option<&str> = Some("K");
const DEGREES: Option<&str> = Some("degrees");
const NM: Option<&str> = Some("nm");
const NONE: Option<&str> = None;

pub static L1A: Schema = Schema {
    level: Level::L1A,
    title: "PACE SPEXone Level-1A data",
    dimensions: &[
        DimDecl { name: "number_of_images", size: DimSize::Unlimited },
        DimDecl { name: "samples_per_image", size: DimSize::Fixed(184_000) },
        DimDecl { name: "hk_packets", size: DimSize::Unlimited },
        DimDecl { name: "mps_bytes", size: DimSize::Fixed(32) },
        DimDecl { name: "nomhk_bytes", size: DimSize::Fixed(20) },
    ],
    groups: &["/science_data", "/image_attributes", "/engineering_data"],
    variables: &[
        var!("/science_data/detector_images", U16, ["number_of_images", "samples_per_image"], Some("counts"), "Image data from detector"),
        var!("/science_data/detector_telemetry", U8, ["number_of_images", "mps_bytes"], NONE, "SPEXone science telemetry"),
        var!("/image_attributes/binning_table", I32, ["number_of_images"], NONE, "binning table identifier"),
        var!("/image_attributes/digital_offset", I32, ["number_of_images"], Some("counts"), "digital offset"),
        var!("/image_attributes/nr_coadditions", U16, ["number_of_images"], NONE, "number of coadditions"),
        var!("/image_attributes/exposure_time", F64, ["number_of_images"], SECONDS, "exposure time"),
        var!("/image_attributes/icu_time_sec", U32, ["number_of_images"], SECONDS, "ICU time stamp (seconds)"),
        var!("/image_attributes/icu_time_subsec", U16, ["number_of_images"], NONE, "ICU time stamp (sub-seconds)"),
        var!("/image_attributes/image_time", F64, ["number_of_images"], SECONDS, "image time"),
        var!("/image_attributes/image_ID", U16, ["number_of_images"], NONE, "image counter from power-up"),
        var!("/engineering_data/NomHK_telemetry", U8, ["hk_packets", "nomhk_bytes"], NONE, "SPEXone nominal housekeeping telemetry"),
        var!("/engineering_data/temp_detector", F32, ["hk_packets"], KELVIN, "detector temperature"),
        var!("/engineering_data/temp_housing", F32, ["hk_packets"], KELVIN, "housing temperature"),
        var!("/engineering_data/temp_radiator", F32, ["hk_packets"], KELVIN, "radiator temperature"),
        var!("/engineering_data/HK_tlm_time", F64, ["hk_packets"], SECONDS, "HK telemetry packet time"),
    ],
    primary_dimension: "number_of_images",
    time_variable: "/image_attributes/image_time",
    checks: &[
        CheckSet {
            dimension: "number_of_images",
            groups: &["/science_data", "/image_attributes"],
            exclude: &[],
            allow_empty: true,
        },
        CheckSet {
            dimension: "hk_packets",
            groups: &["/engineering_data"],
            exclude: &[],
            allow_empty: true,
        },
    ],
};

pub static L1B: Schema = Schema {
    level: Level::L1B,
    title: "PACE SPEXone Level-1B data",
    dimensions: &[
        DimDecl { name: "bins_along_track", size: DimSize::Unlimited },
        DimDecl { name: "spatial_samples_per_image", size: DimSize::Fixed(200) },
        DimDecl { name: "intensity_bands_per_view", size: DimSize::Fixed(400) },
        DimDecl { name: "polarization_bands_per_view", size: DimSize::Fixed(50) },
        DimDecl { name: "number_of_views", size: DimSize::Fixed(5) },
    ],
    groups: &["/BIN_ATTRIBUTES", "/GEOLOCATION_DATA", "/OBSERVATION_DATA", "/SENSOR_VIEWS_BANDS"],
    variables: &[
        var!("/BIN_ATTRIBUTES/image_time", F64, ["bins_along_track"], SECONDS, "image time"),
        var!("/GEOLOCATION_DATA/altitude", F32, ["bins_along_track", "spatial_samples_per_image"], Some("m"), "altitude at bin locations"),
        var!("/GEOLOCATION_DATA/latitude", F32, ["bins_along_track", "spatial_samples_per_image"], Some("degrees_north"), "latitude at bin locations"),
        var!("/GEOLOCATION_DATA/longitude", F32, ["bins_along_track", "spatial_samples_per_image"], Some("degrees_east"), "longitude at bin locations"),
        var!("/GEOLOCATION_DATA/sensor_azimuth", F32, ["bins_along_track", "spatial_samples_per_image"], DEGREES, "sensor azimuth angle at bin locations"),
        var!("/GEOLOCATION_DATA/sensor_zenith", F32, ["bins_along_track", "spatial_samples_per_image"], DEGREES, "sensor zenith angle at bin locations"),
        var!("/GEOLOCATION_DATA/solar_azimuth", F32, ["bins_along_track", "spatial_samples_per_image"], DEGREES, "solar azimuth angle at bin locations"),
        var!("/GEOLOCATION_DATA/solar_zenith", F32, ["bins_along_track", "spatial_samples_per_image"], DEGREES, "solar zenith angle at bin locations"),
        var!("/OBSERVATION_DATA/I", F32, ["bins_along_track", "spatial_samples_per_image", "intensity_bands_per_view"], Some("W.m-2.sr-1.um-1"), "I Stokes vector component"),
        var!("/OBSERVATION_DATA/I_noise", F32, ["bins_along_track", "spatial_samples_per_image", "intensity_bands_per_view"], Some("W.m-2.sr-1.um-1"), "noise in I"),
        var!("/OBSERVATION_DATA/AoLP", F32, ["bins_along_track", "spatial_samples_per_image", "polarization_bands_per_view"], DEGREES, "angle of linear polarization"),
        var!("/OBSERVATION_DATA/AoLP_noise", F32, ["bins_along_track", "spatial_samples_per_image", "polarization_bands_per_view"], DEGREES, "noise in AoLP"),
        var!("/OBSERVATION_DATA/DoLP", F32, ["bins_along_track", "spatial_samples_per_image", "polarization_bands_per_view"], NONE, "degree of linear polarization"),
        var!("/OBSERVATION_DATA/DoLP_noise", F32, ["bins_along_track", "spatial_samples_per_image", "polarization_bands_per_view"], NONE, "noise in DoLP"),
        var!("/OBSERVATION_DATA/Q_over_I", F32, ["bins_along_track", "spatial_samples_per_image", "polarization_bands_per_view"], NONE, "Q over I"),
        var!("/OBSERVATION_DATA/Q_over_I_noise", F32, ["bins_along_track", "spatial_samples_per_image", "polarization_bands_per_view"], NONE, "noise in Q over I"),
        var!("/OBSERVATION_DATA/U_over_I", F32, ["bins_along_track", "spatial_samples_per_image", "polarization_bands_per_view"], NONE, "U over I"),
        var!("/OBSERVATION_DATA/U_over_I_noise", F32, ["bins_along_track", "spatial_samples_per_image", "polarization_bands_per_view"], NONE, "noise in U over I"),
        var!("/SENSOR_VIEWS_BANDS/viewport_index", U8, ["spatial_samples_per_image"], NONE, "viewport of each spatial sample"),
        var!("/SENSOR_VIEWS_BANDS/intensity_wavelengths", F32, ["number_of_views", "intensity_bands_per_view"], NM, "intensity band center wavelengths"),
        var!("/SENSOR_VIEWS_BANDS/intensity_bandpasses", F32, ["number_of_views", "intensity_bands_per_view"], NM, "intensity band bandpasses"),
        var!("/SENSOR_VIEWS_BANDS/intensity_F0", F32, ["number_of_views", "intensity_bands_per_view"], Some("W.m-2.um-1"), "intensity band solar irradiance"),
        var!("/SENSOR_VIEWS_BANDS/polarization_wavelengths", F32, ["number_of_views", "polarization_bands_per_view"], NM, "polarization band center wavelengths"),
        var!("/SENSOR_VIEWS_BANDS/polarization_bandpasses", F32, ["number_of_views", "polarization_bands_per_view"], NM, "polarization band bandpasses"),
        var!("/SENSOR_VIEWS_BANDS/polarization_F0", F32, ["number_of_views", "polarization_bands_per_view"], Some("W.m-2.um-1"), "polarization band solar irradiance"),
        var!("/SENSOR_VIEWS_BANDS/view_angles", F32, ["number_of_views"], DEGREES, "along-track view angles"),
    ],
    primary_dimension: "bins_along_track",
    time_variable: "/BIN_ATTRIBUTES/image_time",
    checks: &[
        CheckSet {
            dimension: "number_of_views",
            groups: &["/SENSOR_VIEWS_BANDS"],
            exclude: &["/SENSOR_VIEWS_BANDS/viewport_index"],
            allow_empty: false,
        },
        CheckSet {
            dimension: "bins_along_track",
            groups: &["/BIN_ATTRIBUTES", "/GEOLOCATION_DATA", "/OBSERVATION_DATA"],
            exclude: &[],
            allow_empty: false,
        },
    ],
};

pub static L1C: Schema = Schema {
    level: Level::L1C,
    title: "PACE SPEXone Level-1C data",
    dimensions: &[
        DimDecl { name: "bins_along_track", size: DimSize::Unlimited },
        DimDecl { name: "bins_across_track", size: DimSize::Fixed(25) },
        DimDecl { name: "number_of_views", size: DimSize::Fixed(5) },
        DimDecl { name: "intensity_bands_per_view", size: DimSize::Fixed(400) },
        DimDecl { name: "polarization_bands_per_view", size: DimSize::Fixed(50) },
    ],
    groups: &["/BIN_ATTRIBUTES", "/GEOLOCATION_DATA", "/OBSERVATION_DATA", "/SENSOR_VIEWS_BANDS"],
    variables: &[
        var!("/BIN_ATTRIBUTES/nadir_view_time", F64, ["bins_along_track"], SECONDS, "time bin was viewed at nadir view"),
        var!("/BIN_ATTRIBUTES/view_time_offsets", F64, ["bins_along_track", "bins_across_track", "number_of_views"], SECONDS, "time offsets of views from nadir view"),
        var!("/GEOLOCATION_DATA/latitude", F32, ["bins_along_track", "bins_across_track"], Some("degrees_north"), "latitude at bin locations"),
        var!("/GEOLOCATION_DATA/longitude", F32, ["bins_along_track", "bins_across_track"], Some("degrees_east"), "longitude at bin locations"),
        var!("/GEOLOCATION_DATA/altitude", F32, ["bins_along_track", "bins_across_track"], Some("m"), "altitude at bin locations"),
        var!("/GEOLOCATION_DATA/altitude_variability", F32, ["bins_along_track", "bins_across_track"], Some("m"), "RMS variability of altitude"),
        var!("/GEOLOCATION_DATA/sensor_azimuth", F32, ["bins_along_track", "bins_across_track", "number_of_views"], DEGREES, "sensor azimuth angle"),
        var!("/GEOLOCATION_DATA/sensor_zenith", F32, ["bins_along_track", "bins_across_track", "number_of_views"], DEGREES, "sensor zenith angle"),
        var!("/GEOLOCATION_DATA/solar_azimuth", F32, ["bins_along_track", "bins_across_track", "number_of_views"], DEGREES, "solar azimuth angle"),
        var!("/GEOLOCATION_DATA/solar_zenith", F32, ["bins_along_track", "bins_across_track", "number_of_views"], DEGREES, "solar zenith angle"),
        var!("/OBSERVATION_DATA/obs_per_view", U16, ["bins_along_track", "bins_across_track", "number_of_views"], NONE, "observations contributing to bin from each view"),
        var!("/OBSERVATION_DATA/AoLP", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], DEGREES, "angle of linear polarization"),
        var!("/OBSERVATION_DATA/AoLP_noise", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], DEGREES, "noise in AoLP"),
        var!("/OBSERVATION_DATA/DoLP", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], NONE, "degree of linear polarization"),
        var!("/OBSERVATION_DATA/DoLP_noise", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], NONE, "noise in DoLP"),
        var!("/OBSERVATION_DATA/I", F32, ["bins_along_track", "bins_across_track", "number_of_views", "intensity_bands_per_view"], Some("W.m-2.sr-1.um-1"), "I Stokes vector component"),
        var!("/OBSERVATION_DATA/I_noise", F32, ["bins_along_track", "bins_across_track", "number_of_views", "intensity_bands_per_view"], Some("W.m-2.sr-1.um-1"), "noise in I"),
        var!("/OBSERVATION_DATA/I_polsample", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], Some("W.m-2.sr-1.um-1"), "I at polarimetric sampling"),
        var!("/OBSERVATION_DATA/I_polsample_noise", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], Some("W.m-2.sr-1.um-1"), "noise in I at polarimetric sampling"),
        var!("/OBSERVATION_DATA/QC", U8, ["bins_along_track", "bins_across_track"], NONE, "quality indicator"),
        var!("/OBSERVATION_DATA/QC_bitwise", U32, ["bins_along_track", "bins_across_track"], NONE, "bitwise quality indicator"),
        var!("/OBSERVATION_DATA/QC_polsample", U8, ["bins_along_track", "bins_across_track"], NONE, "quality indicator at polarimetric sampling"),
        var!("/OBSERVATION_DATA/QC_polsample_bitwise", U32, ["bins_along_track", "bins_across_track"], NONE, "bitwise quality indicator at polarimetric sampling"),
        var!("/OBSERVATION_DATA/Q_over_I", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], NONE, "Q over I"),
        var!("/OBSERVATION_DATA/Q_over_I_noise", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], NONE, "noise in Q over I"),
        var!("/OBSERVATION_DATA/U_over_I", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], NONE, "U over I"),
        var!("/OBSERVATION_DATA/U_over_I_noise", F32, ["bins_along_track", "bins_across_track", "number_of_views", "polarization_bands_per_view"], NONE, "noise in U over I"),
        var!("/SENSOR_VIEWS_BANDS/intensity_bandpasses", F32, ["number_of_views", "intensity_bands_per_view"], NM, "intensity band bandpasses"),
        var!("/SENSOR_VIEWS_BANDS/intensity_wavelengths", F32, ["number_of_views", "intensity_bands_per_view"], NM, "intensity band center wavelengths"),
        var!("/SENSOR_VIEWS_BANDS/intensity_F0", F32, ["number_of_views", "intensity_bands_per_view"], Some("W.m-2.um-1"), "intensity band solar irradiance"),
        var!("/SENSOR_VIEWS_BANDS/polarization_bandpasses", F32, ["number_of_views", "polarization_bands_per_view"], NM, "polarization band bandpasses"),
        var!("/SENSOR_VIEWS_BANDS/polarization_wavelengths", F32, ["number_of_views", "polarization_bands_per_view"], NM, "polarization band center wavelengths"),
        var!("/SENSOR_VIEWS_BANDS/polarization_F0", F32, ["number_of_views", "polarization_bands_per_view"], Some("W.m-2.um-1"), "polarization band solar irradiance"),
        var!("/SENSOR_VIEWS_BANDS/view_angles", F32, ["number_of_views"], DEGREES, "along-track view angles"),
    ],
    primary_dimension: "bins_along_track",
    time_variable: "/BIN_ATTRIBUTES/nadir_view_time",
    checks: &[
        CheckSet {
            dimension: "number_of_views",
            groups: &["/SENSOR_VIEWS_BANDS"],
            exclude: &["/SENSOR_VIEWS_BANDS/viewport_index"],
            allow_empty: false,
        },
        CheckSet {
            dimension: "bins_along_track",
            groups: &["/BIN_ATTRIBUTES", "/GEOLOCATION_DATA", "/OBSERVATION_DATA"],
            exclude: &[],
            allow_empty: false,
        },
    ],
};
