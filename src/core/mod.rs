//! Core radiometric conversion modules

pub mod acquisition;
pub mod calibrate;
pub mod pipeline;
pub mod provenance;
pub mod quality;
pub mod radiance;
pub mod reflectance;

// Re-export main types
pub use acquisition::{earth_sun_distance_au, AcquisitionMoment, DayOfYear, DistanceSource, EarthSunDistance};
pub use calibrate::{BandCalibration, CalibrationTable, CalibrationTableBuilder, SensorProfile};
pub use pipeline::{
    BandFailure, BandInput, BandProduct, ConversionOutput, ConversionPipeline, ConversionPlan,
    ConversionRequest, PipelineState,
};
pub use provenance::{output_name, ProductMetadata};
pub use quality::{BandQuality, ConversionSummary, FailedBand};
pub use radiance::{to_radiance, RadianceConverter};
pub use reflectance::{to_reflectance, ReflectanceConverter, SolarGeometry};
