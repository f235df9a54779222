/*!
 * Data-quality observations collected while converting bands.
 *
 * Nothing here alters pixel values; the counters record what the converters
 * saw so the caller can decide whether a product is usable:
 * - no-data cells passed through
 * - negative DN (physically invalid, converted anyway)
 * - DN above the sensor bit depth (masked as no-data)
 * - non-finite samples (masked as no-data)
 * - reflectance above 1 (kept, never clipped)
 */

use crate::core::acquisition::DistanceSource;
use crate::types::{OutputKind, ToarError, ToarResult};
use serde::Serialize;

/// Per-band counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BandQuality {
    pub band: String,
    pub total_cells: usize,
    pub nodata_cells: usize,
    pub negative_dn_cells: usize,
    pub out_of_range_cells: usize,
    /// First cell above the sensor maximum, input raster coordinates
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_cell")]
    pub first_out_of_range: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_out_of_range_dn: Option<f64>,
    pub non_finite_cells: usize,
    pub reflectance_above_one: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

/// `row,col`, a flat value for XML output
fn serialize_cell<S: serde::Serializer>(cell: &Option<(usize, usize)>, serializer: S) -> Result<S::Ok, S::Error> {
    match cell {
        Some((row, col)) => serializer.serialize_str(&format!("{},{}", row, col)),
        None => serializer.serialize_none(),
    }
}

impl BandQuality {
    pub fn new(band: &str) -> Self {
        Self {
            band: band.to_string(),
            ..Default::default()
        }
    }

    /// Cells that went through the physical formula
    pub fn converted_cells(&self) -> usize {
        self.total_cells - self.nodata_cells - self.out_of_range_cells - self.non_finite_cells
    }

    pub fn has_observations(&self) -> bool {
        self.negative_dn_cells > 0
            || self.out_of_range_cells > 0
            || self.non_finite_cells > 0
            || self.reflectance_above_one > 0
    }

    pub(crate) fn record_out_of_range(&mut self, row: usize, col: usize, dn: f64) {
        self.out_of_range_cells += 1;
        if self.first_out_of_range.is_none() {
            self.first_out_of_range = Some((row, col));
            self.first_out_of_range_dn = Some(dn);
        }
    }

    pub(crate) fn record_value(&mut self, value: f64) {
        self.min_value = Some(self.min_value.map_or(value, |m| m.min(value)));
        self.max_value = Some(self.max_value.map_or(value, |m| m.max(value)));
    }

    /// Reset the output range before a second conversion stage fills it again
    pub(crate) fn reset_range(&mut self) {
        self.min_value = None;
        self.max_value = None;
    }

    /// The per-cell range error for this band, if any cell exceeded the sensor maximum
    pub fn value_range_error(&self, max_dn: f64) -> Option<ToarError> {
        self.first_out_of_range.map(|(row, col)| ToarError::ValueRange {
            band: self.band.clone(),
            row,
            col,
            value: self.first_out_of_range_dn.unwrap_or(f64::NAN),
            max: max_dn,
        })
    }
}

/// Report of a finished conversion request
#[derive(Debug, Clone, Serialize)]
pub struct ConversionSummary {
    pub output_kind: String,
    pub distance_source: String,
    pub day_of_year: u16,
    pub earth_sun_distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sun_elevation: Option<f64>,
    pub bands: Vec<BandQuality>,
    pub failed_bands: Vec<FailedBand>,
}

/// Band that produced no output
#[derive(Debug, Clone, Serialize)]
pub struct FailedBand {
    pub band: String,
    pub reason: String,
}

impl ConversionSummary {
    pub fn new(
        output_kind: OutputKind,
        distance_source: DistanceSource,
        day_of_year: u16,
        earth_sun_distance: f64,
        sun_elevation: Option<f64>,
    ) -> Self {
        Self {
            output_kind: output_kind.to_string(),
            distance_source: distance_source.to_string(),
            day_of_year,
            earth_sun_distance,
            sun_elevation,
            bands: Vec::new(),
            failed_bands: Vec::new(),
        }
    }

    pub fn band(&self, label: &str) -> Option<&BandQuality> {
        self.bands.iter().find(|q| q.band == label)
    }

    pub fn total_negative_dn(&self) -> usize {
        self.bands.iter().map(|q| q.negative_dn_cells).sum()
    }

    pub fn total_out_of_range(&self) -> usize {
        self.bands.iter().map(|q| q.out_of_range_cells).sum()
    }

    /// Structured form of the report
    pub fn to_xml(&self) -> ToarResult<String> {
        quick_xml::se::to_string(self)
            .map_err(|e| ToarError::Config(format!("Cannot serialize summary: {}", e)))
    }
}

impl std::fmt::Display for ConversionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Top-of-atmosphere {} conversion", self.output_kind)?;
        writeln!(
            f,
            "  Earth-Sun distance: {:.6} AU (DOY {}, from {})",
            self.earth_sun_distance, self.day_of_year, self.distance_source
        )?;
        if let Some(sea) = self.sun_elevation {
            writeln!(f, "  Sun elevation: {:.2} deg, zenith {:.2} deg", sea, 90.0 - sea)?;
        }
        for q in &self.bands {
            write!(
                f,
                "  {}: {} cells, {} no-data, {} negative DN, {} above sensor maximum, {} non-finite",
                q.band,
                q.total_cells,
                q.nodata_cells,
                q.negative_dn_cells,
                q.out_of_range_cells,
                q.non_finite_cells
            )?;
            if q.reflectance_above_one > 0 {
                write!(f, ", {} reflectance > 1", q.reflectance_above_one)?;
            }
            if let (Some(lo), Some(hi)) = (q.min_value, q.max_value) {
                write!(f, ", range {:.4} to {:.4}", lo, hi)?;
            }
            writeln!(f)?;
        }
        for failed in &self.failed_bands {
            writeln!(f, "  {}: FAILED ({})", failed.band, failed.reason)?;
        }
        Ok(())
    }
}
