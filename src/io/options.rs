use crate::core::acquisition::AcquisitionMoment;
use crate::core::pipeline::ConversionRequest;
use crate::core::provenance::{DEFAULT_SUFFIX, RADIANCE_SUFFIX};
use crate::types::{DigitalNumber, OutputKind, RasterBand, Region, ToarError, ToarResult};
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conversion job as read from an XML job file or built in code.
///
/// ```xml
/// <toar>
///   <band>BAND_2</band>
///   <band>Red</band>
///   <utc_time>2010-06-23T10:55:46.5Z</utc_time>
///   <sun_elevation>53.8</sun_elevation>
///   <output_kind>reflectance</output_kind>
/// </toar>
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    #[serde(rename = "band")]
    pub bands: Vec<String>,
    /// Acquisition time, UTC
    pub utc_time: Option<String>,
    /// Day of year; takes precedence over `utc_time`
    pub doy: Option<i64>,
    /// Mean sun elevation in degrees, required for reflectance
    pub sun_elevation: Option<f64>,
    pub region: Option<Region>,
    /// `radiance` or `reflectance`
    pub output_kind: String,
    pub output_suffix: String,
    pub print_formulas: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            bands: Vec::new(),
            utc_time: None,
            doy: None,
            sun_elevation: None,
            region: None,
            output_kind: OutputKind::Reflectance.to_string(),
            output_suffix: DEFAULT_SUFFIX.to_string(),
            print_formulas: false,
        }
    }
}

impl ConversionOptions {
    pub fn from_xml_str(xml: &str) -> ToarResult<Self> {
        from_str::<ConversionOptions>(xml)
            .map_err(|e| ToarError::Config(format!("Failed to parse job XML: {}", e)))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> ToarResult<Self> {
        let path = path.as_ref();
        log::debug!("Reading conversion job from {}", path.display());
        let xml = std::fs::read_to_string(path)?;
        Self::from_xml_str(&xml)
    }

    pub fn output_kind(&self) -> ToarResult<OutputKind> {
        self.output_kind.parse()
    }

    /// Suffix for product names; the reflectance default turns into `rad` for radiance
    pub fn resolved_suffix(&self) -> ToarResult<String> {
        let suffix = self.output_suffix.trim();
        if suffix.is_empty() {
            return Err(ToarError::Config("output suffix must not be empty".to_string()));
        }
        match self.output_kind()? {
            OutputKind::Radiance if suffix == DEFAULT_SUFFIX => Ok(RADIANCE_SUFFIX.to_string()),
            _ => Ok(suffix.to_string()),
        }
    }

    /// Acquisition moment; an explicit `doy` overrides the day of year of `utc_time`
    pub fn acquisition(&self) -> ToarResult<AcquisitionMoment> {
        let utc_time = self
            .utc_time
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (utc_time, self.doy) {
            // The timestamp is only kept for reference once a day of year is given
            (Some(utc), Some(doy)) => match AcquisitionMoment::from_utc_str(utc) {
                Ok(moment) => {
                    log::warn!(
                        "Both UTC time and day of year given: DOY {} overrides DOY {} of {}",
                        doy,
                        moment.day_of_year(),
                        utc
                    );
                    moment.with_day_of_year_override(doy)
                }
                Err(e) => {
                    log::warn!("Ignoring UTC time, day of year {} takes precedence: {}", doy, e);
                    AcquisitionMoment::from_day_of_year(doy)
                }
            },
            (Some(utc), None) => AcquisitionMoment::from_utc_str(utc),
            (None, Some(doy)) => {
                log::info!("Using day of year {} for the Earth-Sun distance", doy);
                AcquisitionMoment::from_day_of_year(doy)
            }
            (None, None) => Err(ToarError::MissingParameter(
                "either utc_time or doy is required".to_string(),
            )),
        }
    }

    /// Build a pipeline request from `(label, raster)` pairs
    pub fn request<'a, T, I>(&self, rasters: I) -> ToarResult<ConversionRequest<'a, T>>
    where
        T: DigitalNumber,
        I: IntoIterator<Item = (&'a str, &'a RasterBand<T>)>,
    {
        let mut request = ConversionRequest::new(self.acquisition()?, self.output_kind()?);
        for (label, raster) in rasters {
            request = request.band(label, raster);
        }
        if let Some(region) = self.region {
            request = request.region(region);
        }
        if let Some(sea) = self.sun_elevation {
            request = request.sun_elevation(sea);
        }
        Ok(request)
    }
}
