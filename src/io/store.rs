//! Hand-off to the external raster store.
//!
//! The store owns persistence; this crate only reads DN bands from it and
//! hands converted products back together with their metadata.

use crate::core::calibrate::CalibrationTable;
use crate::core::pipeline::{ConversionOutput, ConversionPipeline};
use crate::core::provenance::{output_name, ProductMetadata, FORMULAS};
use crate::io::options::ConversionOptions;
use crate::types::{DigitalNumber, RasterBand, ToarError, ToarImage, ToarResult};
use std::collections::HashMap;

/// Raster store seam
pub trait RasterStore {
    type Sample: DigitalNumber;

    fn read_band(&self, name: &str) -> ToarResult<RasterBand<Self::Sample>>;

    /// True when a raster or product called `name` is already stored
    fn exists(&self, name: &str) -> bool;

    fn write_product(&mut self, name: &str, image: &ToarImage, metadata: &ProductMetadata) -> ToarResult<()>;
}

/// Product as handed to the store
#[derive(Debug, Clone)]
pub struct StoredProduct {
    pub image: ToarImage,
    pub metadata: ProductMetadata,
}

/// In-memory store, for tests and for callers that manage I/O themselves
#[derive(Debug, Clone)]
pub struct MemoryRasterStore<T = u16> {
    bands: HashMap<String, RasterBand<T>>,
    products: HashMap<String, StoredProduct>,
}

impl<T: DigitalNumber> Default for MemoryRasterStore<T> {
    fn default() -> Self {
        Self {
            bands: HashMap::new(),
            products: HashMap::new(),
        }
    }
}

impl<T: DigitalNumber> MemoryRasterStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_band(&mut self, name: &str, band: RasterBand<T>) {
        self.bands.insert(name.to_string(), band);
    }

    pub fn product(&self, name: &str) -> Option<&StoredProduct> {
        self.products.get(name)
    }

    /// Names of written products, sorted
    pub fn product_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.products.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<T: DigitalNumber> RasterStore for MemoryRasterStore<T> {
    type Sample = T;

    fn read_band(&self, name: &str) -> ToarResult<RasterBand<T>> {
        self.bands
            .get(name)
            .cloned()
            .ok_or_else(|| ToarError::Store(format!("raster {} not found", name)))
    }

    fn exists(&self, name: &str) -> bool {
        self.bands.contains_key(name) || self.products.contains_key(name)
    }

    fn write_product(&mut self, name: &str, image: &ToarImage, metadata: &ProductMetadata) -> ToarResult<()> {
        if self.exists(name) {
            return Err(ToarError::Store(format!("raster {} already exists", name)));
        }
        self.products.insert(
            name.to_string(),
            StoredProduct {
                image: image.clone(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }
}

/// Read every requested band from `store`, convert, and write one product per converted band.
///
/// Products are named `<band>.<suffix>`. Nothing is written when the request
/// fails validation, hits a structural error or would overwrite an existing raster.
pub fn convert_from_store<S: RasterStore>(
    store: &mut S,
    options: &ConversionOptions,
    table: &CalibrationTable,
) -> ToarResult<ConversionOutput> {
    let suffix = options.resolved_suffix()?;
    if options.print_formulas {
        log::info!("{}", FORMULAS);
    }

    let targets: Vec<String> = options
        .bands
        .iter()
        .map(|name| output_name(name, &suffix))
        .collect();
    if let Some(taken) = targets.iter().find(|name| store.exists(name)) {
        return Err(ToarError::Store(format!("raster {} already exists", taken)));
    }
    if let Some((i, twice)) = targets.iter().enumerate().find(|(i, name)| targets[..*i].contains(*name)) {
        return Err(ToarError::Store(format!(
            "product {} would be written twice (band {})",
            twice, options.bands[i]
        )));
    }

    let rasters = options
        .bands
        .iter()
        .map(|name| store.read_band(name).map(|raster| (name.as_str(), raster)))
        .collect::<ToarResult<Vec<_>>>()?;

    let request = options.request(rasters.iter().map(|(name, raster)| (*name, raster)))?;
    let output = ConversionPipeline::new(table).run(&request)?;

    for product in &output.products {
        let name = output_name(&product.label, &suffix);
        store.write_product(&name, &product.image, &product.metadata)?;
        log::info!("Wrote {} ({})", name, product.metadata.units);
    }

    Ok(output)
}
