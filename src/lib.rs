//! toar: top-of-atmosphere radiance and reflectance for WorldView-2 imagery
//!
//! Converts Digital Numbers of multispectral and panchromatic bands into
//! at-sensor spectral radiance and unitless planetary reflectance, using the
//! absolute calibration factors and effective bandwidths of the sensor, the
//! Earth-Sun distance on the day of acquisition and the mean sun elevation.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    DigitalNumber, ErrorKind, OutputKind, RasterBand, Region, ToarArray, ToarError, ToarImage,
    ToarResult,
};

pub use crate::core::{
    earth_sun_distance_au, AcquisitionMoment, CalibrationTable, ConversionOutput,
    ConversionPipeline, ConversionRequest, ConversionSummary, PipelineState,
};

pub use io::{convert_from_store, ConversionOptions, ImdMetadata, MemoryRasterStore, RasterStore};
