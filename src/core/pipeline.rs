/*!
 * Conversion pipeline: request validation, per-band fan-out and reporting.
 *
 * States: Configured -> Running -> Completed, or Failed.
 * - Every request-level check happens before any pixel is touched; a failure
 *   there leaves no partial output.
 * - Bands are independent and run on the rayon pool with the `parallel`
 *   feature, sequentially otherwise.
 * - A band that fails on its own (no-data collision) is reported and its
 *   siblings still complete. Structural problems abort the request.
 */

use crate::core::acquisition::{AcquisitionMoment, EarthSunDistance};
use crate::core::calibrate::{BandCalibration, CalibrationTable, SensorProfile};
use crate::core::provenance::ProductMetadata;
use crate::core::quality::{BandQuality, ConversionSummary, FailedBand};
use crate::core::radiance::RadianceConverter;
use crate::core::reflectance::{ReflectanceConverter, SolarGeometry};
use crate::types::{DigitalNumber, ErrorKind, OutputKind, RasterBand, Region, ToarError, ToarImage, ToarResult};

/// One requested band: its label and the borrowed raster
#[derive(Debug, Clone, Copy)]
pub struct BandInput<'a, T> {
    pub label: &'a str,
    pub raster: &'a RasterBand<T>,
}

/// Everything needed for one conversion run
#[derive(Debug, Clone)]
pub struct ConversionRequest<'a, T> {
    pub bands: Vec<BandInput<'a, T>>,
    pub region: Option<Region>,
    pub acquisition: AcquisitionMoment,
    pub sun_elevation: Option<f64>,
    pub output_kind: OutputKind,
}

impl<'a, T: DigitalNumber> ConversionRequest<'a, T> {
    pub fn new(acquisition: AcquisitionMoment, output_kind: OutputKind) -> Self {
        Self {
            bands: Vec::new(),
            region: None,
            acquisition,
            sun_elevation: None,
            output_kind,
        }
    }

    pub fn band(mut self, label: &'a str, raster: &'a RasterBand<T>) -> Self {
        self.bands.push(BandInput { label, raster });
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn sun_elevation(mut self, degrees: f64) -> Self {
        self.sun_elevation = Some(degrees);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Configured,
    Running,
    Completed,
    Failed(ErrorKind),
}

/// Validated request: resolved calibrations, per-band windows and request scalars
#[derive(Debug)]
pub struct ConversionPlan<'t, 'a, T> {
    bands: Vec<PlannedBand<'t, 'a, T>>,
    sensor: &'t SensorProfile,
    output_kind: OutputKind,
    acquisition: AcquisitionMoment,
    earth_sun_distance: EarthSunDistance,
    geometry: Option<SolarGeometry>,
}

#[derive(Debug)]
struct PlannedBand<'t, 'a, T> {
    label: &'a str,
    calibration: &'t BandCalibration,
    raster: &'a RasterBand<T>,
    region: Region,
}

impl<'t, 'a, T> ConversionPlan<'t, 'a, T> {
    pub fn earth_sun_distance(&self) -> EarthSunDistance {
        self.earth_sun_distance
    }

    pub fn geometry(&self) -> Option<SolarGeometry> {
        self.geometry
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Windows that will be processed, in request order
    pub fn regions(&self) -> Vec<Region> {
        self.bands.iter().map(|b| b.region).collect()
    }
}

/// Converted band with its report
#[derive(Debug)]
pub struct BandProduct {
    /// Label as requested
    pub label: String,
    /// Canonical label of the calibration table
    pub band: String,
    pub image: ToarImage,
    pub metadata: ProductMetadata,
    pub quality: BandQuality,
    /// Set when cells exceeded the sensor bit depth; those cells hold no-data
    pub value_range_error: Option<ToarError>,
}

/// Band that produced no output
#[derive(Debug)]
pub struct BandFailure {
    pub label: String,
    pub error: ToarError,
}

/// Result of a completed run
#[derive(Debug)]
pub struct ConversionOutput {
    pub products: Vec<BandProduct>,
    pub failures: Vec<BandFailure>,
    pub summary: ConversionSummary,
}

impl ConversionOutput {
    /// Product by requested or canonical label
    pub fn product(&self, label: &str) -> Option<&BandProduct> {
        self.products
            .iter()
            .find(|p| p.label == label || p.band == label)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Radiometric conversion driver
pub struct ConversionPipeline<'t> {
    table: &'t CalibrationTable,
    state: PipelineState,
}

impl<'t> ConversionPipeline<'t> {
    pub fn new(table: &'t CalibrationTable) -> Self {
        Self {
            table,
            state: PipelineState::Configured,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn table(&self) -> &CalibrationTable {
        self.table
    }

    /// Check a request without converting anything
    pub fn validate<'a, T: DigitalNumber>(
        &mut self,
        request: &ConversionRequest<'a, T>,
    ) -> ToarResult<ConversionPlan<'t, 'a, T>> {
        self.state = PipelineState::Configured;
        match self.build_plan(request) {
            Ok(plan) => Ok(plan),
            Err(e) => {
                log::error!("Conversion request rejected: {}", e);
                self.state = PipelineState::Failed(e.kind());
                Err(e)
            }
        }
    }

    fn build_plan<'a, T: DigitalNumber>(
        &self,
        request: &ConversionRequest<'a, T>,
    ) -> ToarResult<ConversionPlan<'t, 'a, T>> {
        if request.bands.is_empty() {
            return Err(ToarError::MissingParameter("no bands requested".to_string()));
        }

        let calibrations = request
            .bands
            .iter()
            .map(|input| self.table.lookup(input.label))
            .collect::<ToarResult<Vec<_>>>()?;

        if let Some(region) = request.region {
            // One region is only meaningful when every band shares its coordinate space
            let extent = request.bands[0].raster.dim();
            if let Some(other) = request.bands.iter().find(|b| b.raster.dim() != extent) {
                return Err(ToarError::StructuralMismatch(format!(
                    "band {} is {}x{} but band {} is {}x{}; a shared region needs equal extents",
                    request.bands[0].label,
                    extent.0,
                    extent.1,
                    other.label,
                    other.raster.dim().0,
                    other.raster.dim().1
                )));
            }
            region.validate_within(extent.0, extent.1)?;
        }

        let geometry = match (request.output_kind, request.sun_elevation) {
            (OutputKind::Reflectance, Some(sea)) => Some(SolarGeometry::from_sun_elevation(sea)?),
            (OutputKind::Reflectance, None) => {
                return Err(ToarError::MissingParameter(
                    "sun elevation is required for reflectance output".to_string(),
                ))
            }
            (OutputKind::Radiance, sea) => {
                if sea.is_some() {
                    log::debug!("Sun elevation ignored for radiance output");
                }
                None
            }
        };

        let earth_sun_distance = request.acquisition.earth_sun_distance();
        log::info!(
            "Earth-Sun distance {:.6} AU from {} (DOY {})",
            earth_sun_distance.au(),
            request.acquisition.source(),
            request.acquisition.day_of_year()
        );

        let bands = request
            .bands
            .iter()
            .zip(calibrations)
            .map(|(input, calibration)| PlannedBand {
                label: input.label,
                calibration,
                raster: input.raster,
                region: request.region.unwrap_or_else(|| input.raster.full_region()),
            })
            .collect();

        Ok(ConversionPlan {
            bands,
            sensor: self.table.sensor(),
            output_kind: request.output_kind,
            acquisition: request.acquisition,
            earth_sun_distance,
            geometry,
        })
    }

    /// Validate and convert every requested band
    pub fn run<'a, T: DigitalNumber>(
        &mut self,
        request: &ConversionRequest<'a, T>,
    ) -> ToarResult<ConversionOutput> {
        let plan = self.validate(request)?;
        self.execute(plan)
    }

    /// Convert a validated plan
    pub fn execute<T: DigitalNumber>(
        &mut self,
        plan: ConversionPlan<'t, '_, T>,
    ) -> ToarResult<ConversionOutput> {
        self.state = PipelineState::Running;
        log::info!(
            "Converting {} band(s) of {} to {}",
            plan.bands.len(),
            plan.sensor.name,
            plan.output_kind
        );

        let results = convert_all(&plan);

        let mut summary = ConversionSummary::new(
            plan.output_kind,
            plan.acquisition.source(),
            plan.acquisition.day_of_year().get(),
            plan.earth_sun_distance.au(),
            plan.geometry.map(|g| g.sun_elevation()),
        );
        let mut products = Vec::new();
        let mut failures = Vec::new();

        for (planned, result) in plan.bands.iter().zip(results) {
            match result {
                Ok(product) => {
                    summary.bands.push(product.quality.clone());
                    products.push(product);
                }
                Err(error) if error.is_structural() => {
                    log::error!("Band {}: {}; aborting request", planned.label, error);
                    self.state = PipelineState::Failed(error.kind());
                    return Err(error);
                }
                Err(error) => {
                    log::warn!("Band {} failed: {}", planned.label, error);
                    summary.failed_bands.push(FailedBand {
                        band: planned.label.to_string(),
                        reason: error.to_string(),
                    });
                    failures.push(BandFailure {
                        label: planned.label.to_string(),
                        error,
                    });
                }
            }
        }

        self.state = PipelineState::Completed;
        log::info!(
            "Conversion completed: {} product(s), {} failed band(s)",
            products.len(),
            failures.len()
        );

        Ok(ConversionOutput {
            products,
            failures,
            summary,
        })
    }
}

#[cfg(feature = "parallel")]
fn convert_all<T: DigitalNumber>(plan: &ConversionPlan<'_, '_, T>) -> Vec<ToarResult<BandProduct>> {
    use rayon::prelude::*;

    plan.bands
        .par_iter()
        .map(|band| convert_band(band, plan))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn convert_all<T: DigitalNumber>(plan: &ConversionPlan<'_, '_, T>) -> Vec<ToarResult<BandProduct>> {
    plan.bands.iter().map(|band| convert_band(band, plan)).collect()
}

fn convert_band<T: DigitalNumber>(
    band: &PlannedBand<'_, '_, T>,
    plan: &ConversionPlan<'_, '_, T>,
) -> ToarResult<BandProduct> {
    let radiance = RadianceConverter::new(band.calibration, plan.sensor);
    let (image, mut quality) = radiance.convert(band.raster, &band.region)?;
    let value_range_error = quality.value_range_error(radiance.max_dn());

    let (image, metadata) = match plan.geometry {
        Some(geometry) => {
            let reflectance =
                ReflectanceConverter::new(band.calibration, plan.earth_sun_distance, geometry);
            let image = reflectance.convert(&image, &mut quality)?;
            let metadata =
                ProductMetadata::reflectance(band.calibration, plan.earth_sun_distance, &geometry);
            (image, metadata)
        }
        None => (image, ProductMetadata::radiance(band.calibration)),
    };

    Ok(BandProduct {
        label: band.label.to_string(),
        band: band.calibration.label.clone(),
        image,
        metadata,
        quality,
        value_range_error,
    })
}
