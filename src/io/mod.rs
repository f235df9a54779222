//! Input/output: job configuration, product metadata and the raster store hand-off

pub mod imd;
pub mod options;
pub mod store;

pub use imd::{ImdBand, ImdMetadata};
pub use options::ConversionOptions;
pub use store::{convert_from_store, MemoryRasterStore, RasterStore, StoredProduct};
