use crate::core::acquisition::EarthSunDistance;
use crate::core::calibrate::BandCalibration;
use crate::core::quality::BandQuality;
use crate::types::{is_nodata_value, OutputKind, ToarError, ToarImage, ToarResult};
use ndarray::Zip;
use std::f64::consts::PI;

/// Solar geometry derived from the mean sun elevation angle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarGeometry {
    sun_elevation: f64,
    cos_zenith: f64,
}

impl SolarGeometry {
    /// Valid for elevations in (0, 90] degrees.
    ///
    /// At or below the horizon cos(zenith) is zero or negative and the
    /// reflectance would be infinite or negative.
    pub fn from_sun_elevation(sun_elevation: f64) -> ToarResult<Self> {
        if !(sun_elevation.is_finite() && sun_elevation > 0.0 && sun_elevation <= 90.0) {
            return Err(ToarError::InvalidGeometry { sun_elevation });
        }
        let zenith = 90.0 - sun_elevation;
        Ok(Self {
            sun_elevation,
            cos_zenith: zenith.to_radians().cos(),
        })
    }

    pub fn sun_elevation(&self) -> f64 {
        self.sun_elevation
    }

    /// Solar zenith angle in degrees
    pub fn zenith(&self) -> f64 {
        90.0 - self.sun_elevation
    }

    pub fn cos_zenith(&self) -> f64 {
        self.cos_zenith
    }
}

/// Planetary reflectance: ρ = π * L * d² / (ESUN * cos θz)
pub fn to_reflectance(
    radiance: f64,
    calibration: &BandCalibration,
    earth_sun_distance: EarthSunDistance,
    geometry: &SolarGeometry,
) -> f64 {
    PI * radiance * earth_sun_distance.squared() / (calibration.esun * geometry.cos_zenith)
}

/// Radiance to top-of-atmosphere reflectance for one band.
///
/// Output is not clipped to [0, 1]; bright or specular targets legitimately
/// exceed 1 and are only counted.
pub struct ReflectanceConverter<'a> {
    calibration: &'a BandCalibration,
    earth_sun_distance: EarthSunDistance,
    geometry: SolarGeometry,
}

impl<'a> ReflectanceConverter<'a> {
    pub fn new(
        calibration: &'a BandCalibration,
        earth_sun_distance: EarthSunDistance,
        geometry: SolarGeometry,
    ) -> Self {
        Self {
            calibration,
            earth_sun_distance,
            geometry,
        }
    }

    pub fn convert(&self, radiance: &ToarImage, quality: &mut BandQuality) -> ToarResult<ToarImage> {
        let label = self.calibration.label.as_str();
        if radiance.kind != OutputKind::Radiance {
            return Err(ToarError::StructuralMismatch(format!(
                "band {}: reflectance needs a radiance surface, got {}",
                label, radiance.kind
            )));
        }

        log::info!("Converting {} to top-of-atmosphere reflectance", label);
        log::debug!(
            "Band {}: ESUN={:.2}, ESD={:.6}, SZA={:.2}",
            label,
            self.calibration.esun,
            self.earth_sun_distance.au(),
            self.geometry.zenith()
        );

        let nodata = radiance.nodata;
        let (row0, col0) = radiance.origin;
        let mut collision: Option<(usize, usize)> = None;
        quality.reset_range();

        let reflectance = Zip::indexed(&radiance.data).map_collect(|(r, c), &l| {
            if is_nodata_value(l, nodata) {
                return nodata;
            }
            let rho = to_reflectance(l, self.calibration, self.earth_sun_distance, &self.geometry);
            if collision.is_none() && is_nodata_value(rho, nodata) {
                collision = Some((row0 + r, col0 + c));
            }
            if rho > 1.0 {
                quality.reflectance_above_one += 1;
            }
            quality.record_value(rho);
            rho
        });

        if let Some((row, col)) = collision {
            log::error!("Band {}: reflectance at ({}, {}) equals no-data value {}", label, row, col, nodata);
            return Err(ToarError::NoDataCollision {
                band: label.to_string(),
                row,
                col,
                nodata,
            });
        }

        if quality.reflectance_above_one > 0 {
            log::warn!(
                "Band {}: {} cells with reflectance above 1 (kept as computed)",
                label,
                quality.reflectance_above_one
            );
        }

        Ok(ToarImage {
            kind: OutputKind::Reflectance,
            data: reflectance,
            nodata,
            origin: radiance.origin,
        })
    }
}
