//! Thermistor read-out calibration.
use serde::{Deserialize, Serialize};

/// Coefficients `r0..r4` of the fractional polynomial converting thermistor counts to
/// Kelvin (P. Tol, 2020-10-21).
pub const FRAC_POLY_COEFS: [f64; 5] = [
    273.15 + 21.19,
    6.97828e+7,
    -3.53275e-25,
    7.79625e-31,
    -4.6505e-32,
];

/// `r0 + r1/x + r2 x^4 + (r3 + r4 ln x) x^5`
///
/// Diverges for `x == 0`; see [Sensor::to_kelvin] for the guarded conversion.
#[must_use]
pub fn frac_poly(x: f64, coefs: &[f64; 5]) -> f64 {
    coefs[0] + coefs[1] / x + coefs[2] * x.powi(4) + (coefs[3] + coefs[4] * x.ln()) * x.powi(5)
}

/// Temperature sensors reported in NomHK telemetry.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    Detector,
    Housing,
    Radiator,
}

impl Sensor {
    pub const ALL: [Sensor; 3] = [Sensor::Detector, Sensor::Housing, Sensor::Radiator];

    /// Temperature used when a sensor reads zero, i.e., is absent or unpowered.
    #[must_use]
    pub fn fallback(&self) -> f64 {
        match self {
            Sensor::Detector => 273.0,
            Sensor::Housing => 293.0,
            Sensor::Radiator => 294.0,
        }
    }

    /// Convert a raw thermistor count to Kelvin.
    #[must_use]
    pub fn to_kelvin(&self, raw: u32) -> f64 {
        if raw == 0 {
            return self.fallback();
        }
        frac_poly(f64::from(raw), &FRAC_POLY_COEFS)
    }
}
