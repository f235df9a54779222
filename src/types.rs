use ndarray::{Array2, ArrayView2, s};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Floating point output surface (radiance or reflectance)
pub type ToarArray = Array2<f64>;

/// Sample type accepted as a Digital Number.
///
/// Anything primitive and numeric works: `u8`/`u16` products straight from the
/// raster store as well as `f32`/`f64` rasters that were rescaled upstream.
pub trait DigitalNumber: Copy + PartialEq + ToPrimitive + Debug + Send + Sync {}

impl<T> DigitalNumber for T where T: Copy + PartialEq + ToPrimitive + Debug + Send + Sync {}

/// Product kind requested from the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    /// Top-of-atmosphere spectral radiance [W/m²/sr/μm]
    Radiance,
    /// Unitless planetary reflectance
    Reflectance,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Radiance => write!(f, "radiance"),
            OutputKind::Reflectance => write!(f, "reflectance"),
        }
    }
}

impl std::str::FromStr for OutputKind {
    type Err = ToarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "radiance" | "rad" => Ok(OutputKind::Radiance),
            "reflectance" | "toar" => Ok(OutputKind::Reflectance),
            other => Err(ToarError::Config(format!("Unknown output kind: {}", other))),
        }
    }
}

/// Rectangular region of interest, half-open on both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl Region {
    pub fn new(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Self {
        Self {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    /// Region covering a whole `rows x cols` extent
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, rows, 0, cols)
    }

    pub fn rows(&self) -> usize {
        self.row_end.saturating_sub(self.row_start)
    }

    pub fn cols(&self) -> usize {
        self.col_end.saturating_sub(self.col_start)
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0 || self.cols() == 0
    }

    /// Check that the region is non-empty and lies inside a `rows x cols` extent
    pub fn validate_within(&self, rows: usize, cols: usize) -> ToarResult<()> {
        if self.is_empty() || self.row_end > rows || self.col_end > cols {
            return Err(ToarError::RegionOutOfBounds {
                region: *self,
                rows,
                cols,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rows {}..{}, cols {}..{}",
            self.row_start, self.row_end, self.col_start, self.col_end
        )
    }
}

/// Single band of Digital Numbers handed over by the raster store
#[derive(Debug, Clone)]
pub struct RasterBand<T = u16> {
    data: Array2<T>,
    nodata: Option<T>,
}

impl<T: DigitalNumber> RasterBand<T> {
    pub fn new(data: Array2<T>) -> Self {
        Self { data, nodata: None }
    }

    pub fn with_nodata(data: Array2<T>, nodata: T) -> Self {
        Self {
            data,
            nodata: Some(nodata),
        }
    }

    /// Build a band from row-major samples
    pub fn from_shape_vec(rows: usize, cols: usize, samples: Vec<T>) -> ToarResult<Self> {
        let len = samples.len();
        let data = Array2::from_shape_vec((rows, cols), samples).map_err(|_| {
            ToarError::StructuralMismatch(format!(
                "{} samples cannot fill a {}x{} raster",
                len, rows, cols
            ))
        })?;
        Ok(Self::new(data))
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn full_region(&self) -> Region {
        let (rows, cols) = self.dim();
        Region::full(rows, cols)
    }

    /// Borrow the samples of `region`; the region must already be validated
    pub fn window(&self, region: &Region) -> ArrayView2<'_, T> {
        self.data
            .slice(s![region.row_start..region.row_end, region.col_start..region.col_end])
    }

    /// Sentinel match; a NaN sentinel matches NaN samples
    pub fn is_nodata(&self, value: T) -> bool {
        self.nodata.map_or(false, |nd| match (value.to_f64(), nd.to_f64()) {
            (Some(v), Some(n)) => is_nodata_value(v, n),
            _ => nd == value,
        })
    }

    /// Output no-data value: the input sentinel as f64, NaN when the band has none
    pub fn output_nodata(&self) -> f64 {
        self.nodata
            .and_then(|nd| nd.to_f64())
            .unwrap_or(f64::NAN)
    }
}

/// Converted raster surface handed back to the raster store
#[derive(Debug, Clone)]
pub struct ToarImage {
    pub kind: OutputKind,
    pub data: ToarArray,
    pub nodata: f64,
    /// Position of `data[[0, 0]]` in the input raster
    pub origin: (usize, usize),
}

impl ToarImage {
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// True for cells carrying the output no-data value
    pub fn is_nodata(&self, value: f64) -> bool {
        is_nodata_value(value, self.nodata)
    }

    /// Value at input-raster coordinates, None outside the converted window
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let r = row.checked_sub(self.origin.0)?;
        let c = col.checked_sub(self.origin.1)?;
        self.data.get((r, c)).copied()
    }

    /// (min, max) over valid cells
    pub fn valid_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .filter(|v| !self.is_nodata(**v) && v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// No-data comparison that also matches a NaN sentinel
pub(crate) fn is_nodata_value(value: f64, nodata: f64) -> bool {
    if nodata.is_nan() {
        value.is_nan()
    } else {
        value == nodata
    }
}

/// Error types for radiometric conversion
#[derive(Debug, thiserror::Error)]
pub enum ToarError {
    #[error("Cannot parse acquisition time '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("Day of year {0} is outside 1..=366")]
    Range(i64),

    #[error("Unknown band '{0}' for this calibration table")]
    UnknownBand(String),

    #[error("Band {band}: DN {value} at (row {row}, col {col}) exceeds sensor maximum {max}")]
    ValueRange {
        band: String,
        row: usize,
        col: usize,
        value: f64,
        max: f64,
    },

    #[error("Invalid solar geometry: sun elevation {sun_elevation} deg must be in (0, 90]")]
    InvalidGeometry { sun_elevation: f64 },

    #[error("Region {region} is outside the {rows}x{cols} raster extent")]
    RegionOutOfBounds {
        region: Region,
        rows: usize,
        cols: usize,
    },

    #[error("Structural mismatch: {0}")]
    StructuralMismatch(String),

    #[error("Band {band}: converted value at (row {row}, col {col}) collides with the no-data value {nodata}")]
    NoDataCollision {
        band: String,
        row: usize,
        col: usize,
        nodata: f64,
    },

    #[error("Invalid calibration for band {band}: {reason}")]
    InvalidCalibration { band: String, reason: String },

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Raster store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fieldless discriminant of [`ToarError`], kept by a failed pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Range,
    UnknownBand,
    ValueRange,
    InvalidGeometry,
    RegionOutOfBounds,
    StructuralMismatch,
    NoDataCollision,
    InvalidCalibration,
    MissingParameter,
    Config,
    Store,
    Io,
}

impl ToarError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToarError::Parse { .. } => ErrorKind::Parse,
            ToarError::Range(_) => ErrorKind::Range,
            ToarError::UnknownBand(_) => ErrorKind::UnknownBand,
            ToarError::ValueRange { .. } => ErrorKind::ValueRange,
            ToarError::InvalidGeometry { .. } => ErrorKind::InvalidGeometry,
            ToarError::RegionOutOfBounds { .. } => ErrorKind::RegionOutOfBounds,
            ToarError::StructuralMismatch(_) => ErrorKind::StructuralMismatch,
            ToarError::NoDataCollision { .. } => ErrorKind::NoDataCollision,
            ToarError::InvalidCalibration { .. } => ErrorKind::InvalidCalibration,
            ToarError::MissingParameter(_) => ErrorKind::MissingParameter,
            ToarError::Config(_) => ErrorKind::Config,
            ToarError::Store(_) => ErrorKind::Store,
            ToarError::Io(_) => ErrorKind::Io,
        }
    }

    /// Errors that invalidate the whole request rather than a single band
    pub fn is_structural(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::StructuralMismatch | ErrorKind::RegionOutOfBounds
        )
    }
}

/// Result type for conversion operations
pub type ToarResult<T> = Result<T, ToarError>;
