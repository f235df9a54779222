//! Descriptive metadata attached to every output product

use crate::core::acquisition::EarthSunDistance;
use crate::core::calibrate::BandCalibration;
use crate::core::reflectance::SolarGeometry;
use crate::types::OutputKind;
use serde::Serialize;

/// Conversion equations, reported on request
pub const FORMULAS: &str = "Spectral Radiance = K * DN / Effective Bandwidth | \
Reflectance = (Pi * Radiance * ESD^2) / (ESUN * cos(SZA))";

/// Reference for the calibration constants and equations
pub const CALIBRATION_SOURCE: &str =
    "Radiometric Use of WorldView-2 Imagery, Technical Note (2010), T. Updike & C. Comp";

pub const RADIANCE_UNITS: &str = "W / sq.m. / μm / ster";
pub const REFLECTANCE_UNITS: &str = "Unitless planetary reflectance";

/// Default output suffixes for reflectance and radiance products
pub const DEFAULT_SUFFIX: &str = "toar";
pub const RADIANCE_SUFFIX: &str = "rad";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMetadata {
    pub band: String,
    pub kind: OutputKind,
    pub title: String,
    pub units: String,
    pub description: String,
    pub source: String,
    pub history: String,
}

impl ProductMetadata {
    pub fn radiance(calibration: &BandCalibration) -> Self {
        Self {
            band: calibration.label.clone(),
            kind: OutputKind::Radiance,
            title: format!("{} band (Top of Atmosphere Radiance)", calibration.label),
            units: RADIANCE_UNITS.to_string(),
            description: format!(
                "Top-of-Atmosphere {} band spectral Radiance [W/m^2/sr/μm]",
                calibration.label
            ),
            source: CALIBRATION_SOURCE.to_string(),
            history: format!(
                "K={:.9}; Bandwidth={:.4}",
                calibration.abs_cal_factor, calibration.effective_bandwidth
            ),
        }
    }

    pub fn reflectance(
        calibration: &BandCalibration,
        earth_sun_distance: EarthSunDistance,
        geometry: &SolarGeometry,
    ) -> Self {
        Self {
            band: calibration.label.clone(),
            kind: OutputKind::Reflectance,
            title: format!("{} band (Top of Atmosphere Reflectance)", calibration.label),
            units: REFLECTANCE_UNITS.to_string(),
            description: format!(
                "Top of Atmosphere {} band spectral Reflectance",
                calibration.label
            ),
            source: CALIBRATION_SOURCE.to_string(),
            history: format!(
                "K={:.9}; Bandwidth={:.4}; ESD={:.6}; Esun={:.2}; SZA={:.2}",
                calibration.abs_cal_factor,
                calibration.effective_bandwidth,
                earth_sun_distance.au(),
                calibration.esun,
                geometry.zenith()
            ),
        }
    }
}

/// Name of the product written for `band`: `<band>.<suffix>`, mapset qualifier dropped
pub fn output_name(band: &str, suffix: &str) -> String {
    let base = band.split('@').next().unwrap_or(band);
    format!("{}.{}", base, suffix)
}
