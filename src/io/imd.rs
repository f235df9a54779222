//! Reader for DigitalGlobe `.IMD` image metadata files.
//!
//! Only the fields needed for radiometric conversion are scraped: the
//! acquisition time, the mean sun elevation and the per-band absolute
//! calibration factor and effective bandwidth.

use crate::core::acquisition::AcquisitionMoment;
use crate::core::calibrate::CalibrationTable;
use crate::io::options::ConversionOptions;
use crate::types::{ToarError, ToarResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

static BAND_GROUP: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?s)BEGIN_GROUP\s*=\s*(BAND_\w+)(.*?)END_GROUP"));

/// Calibration values of one `BEGIN_GROUP = BAND_x` block
#[derive(Debug, Clone, PartialEq)]
pub struct ImdBand {
    pub label: String,
    pub abs_cal_factor: f64,
    pub effective_bandwidth: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImdMetadata {
    /// `firstLineTime`, falling back to `earliestAcqTime`
    pub acquisition_time: Option<String>,
    pub mean_sun_elevation: Option<f64>,
    pub bands: Vec<ImdBand>,
}

impl ImdMetadata {
    pub fn parse(text: &str) -> ToarResult<Self> {
        let group_pattern = BAND_GROUP
            .as_ref()
            .map_err(|e| ToarError::Config(format!("Regex error: {}", e)))?;

        let mut bands = Vec::new();
        for captures in group_pattern.captures_iter(text) {
            let (Some(label), Some(block)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            let label = label.as_str();
            let k = numeric_field(block.as_str(), "absCalFactor")?;
            let bandwidth = numeric_field(block.as_str(), "effectiveBandwidth")?;
            match (k, bandwidth) {
                (Some(abs_cal_factor), Some(effective_bandwidth)) => {
                    log::debug!(
                        "IMD band {}: absCalFactor={}, effectiveBandwidth={}",
                        label,
                        abs_cal_factor,
                        effective_bandwidth
                    );
                    bands.push(ImdBand {
                        label: label.to_string(),
                        abs_cal_factor,
                        effective_bandwidth,
                    });
                }
                _ => log::warn!("IMD group {} has no calibration values, skipped", label),
            }
        }

        let acquisition_time = field(text, "firstLineTime")?
            .or(field(text, "earliestAcqTime")?)
            .map(str::to_string);
        let mean_sun_elevation = numeric_field(text, "meanSunEl")?;

        log::info!(
            "IMD metadata: {} calibrated band(s), acquisition {}, mean sun elevation {}",
            bands.len(),
            acquisition_time.as_deref().unwrap_or("unknown"),
            mean_sun_elevation.map_or("unknown".to_string(), |v| format!("{:.2}", v))
        );

        Ok(Self {
            acquisition_time,
            mean_sun_elevation,
            bands,
        })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> ToarResult<Self> {
        let path = path.as_ref();
        log::debug!("Reading IMD metadata from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn acquisition(&self) -> ToarResult<AcquisitionMoment> {
        match &self.acquisition_time {
            Some(time) => AcquisitionMoment::from_utc_str(time),
            None => Err(ToarError::MissingParameter(
                "IMD has no firstLineTime or earliestAcqTime".to_string(),
            )),
        }
    }

    /// `reference` with K and bandwidth replaced by the values of this product
    pub fn calibration_table(&self, reference: &CalibrationTable) -> ToarResult<CalibrationTable> {
        reference.with_overrides(
            self.bands
                .iter()
                .map(|b| (b.label.as_str(), b.abs_cal_factor, b.effective_bandwidth)),
        )
    }

    /// Fill acquisition time, sun elevation and band list where the job left them unset
    pub fn apply_to(&self, options: &mut ConversionOptions) {
        if options.utc_time.is_none() {
            options.utc_time = self.acquisition_time.clone();
        }
        if options.sun_elevation.is_none() {
            options.sun_elevation = self.mean_sun_elevation;
        }
        if options.bands.is_empty() {
            options.bands = self.bands.iter().map(|b| b.label.clone()).collect();
        }
    }
}

/// Raw value of `key = value;` inside `text`
fn field<'t>(text: &'t str, key: &str) -> ToarResult<Option<&'t str>> {
    let pattern = Regex::new(&format!(r"(?m)^\s*{}\s*=\s*([^;\r\n]+)", regex::escape(key)))
        .map_err(|e| ToarError::Config(format!("Regex error: {}", e)))?;
    Ok(pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().trim_matches('"')))
}

fn numeric_field(text: &str, key: &str) -> ToarResult<Option<f64>> {
    match field(text, key)? {
        Some(raw) => raw.parse::<f64>().map(Some).map_err(|e| ToarError::Parse {
            input: raw.to_string(),
            reason: format!("{} is not a number: {}", key, e),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const IMD: &str = r#"version = "28.4";
BEGIN_GROUP = BAND_B
	ULLon =  23.71234567;
	absCalFactor = 1.260825e-02;
	effectiveBandwidth = 5.430000e-02;
END_GROUP = BAND_B
BEGIN_GROUP = BAND_N
	absCalFactor = 9.295654e-03;
	effectiveBandwidth = 9.890000e-02;
END_GROUP = BAND_N
BEGIN_GROUP = IMAGE_1
	satId = "WV02";
	firstLineTime = 2010-06-23T10:55:46.500000Z;
	meanSunEl =  53.8;
END_GROUP = IMAGE_1
END;
"#;

    #[test]
    fn test_parse_imd() {
        let imd = ImdMetadata::parse(IMD).unwrap();
        assert_eq!(imd.acquisition_time.as_deref(), Some("2010-06-23T10:55:46.500000Z"));
        assert_eq!(imd.mean_sun_elevation, Some(53.8));
        assert_eq!(imd.bands.len(), 2);
        assert_eq!(imd.bands[0].label, "BAND_B");
        assert_relative_eq!(imd.bands[0].abs_cal_factor, 0.01260825);
        assert_relative_eq!(imd.bands[1].effective_bandwidth, 0.0989);

        let moment = imd.acquisition().unwrap();
        assert_eq!(moment.day_of_year().get(), 174);
    }

    #[test]
    fn test_overrides_keep_esun() {
        let imd = ImdMetadata::parse(IMD).unwrap();
        let reference = CalibrationTable::worldview2();
        let table = imd.calibration_table(&reference).unwrap();

        let nir = table.lookup("BAND_7").unwrap();
        assert_relative_eq!(nir.abs_cal_factor, 0.009295654);
        assert_eq!(nir.esun, reference.lookup("BAND_7").unwrap().esun);
        // Bands absent from the IMD keep the reference values
        assert_eq!(table.lookup("BAND_5").unwrap(), reference.lookup("BAND_5").unwrap());
    }

    #[test]
    fn test_earliest_acq_time_fallback() {
        let imd = ImdMetadata::parse("earliestAcqTime = 2011-02-01T09:00:00.000000Z;\n").unwrap();
        assert_eq!(imd.acquisition().unwrap().day_of_year().get(), 32);
        assert!(imd.bands.is_empty());
        assert!(imd.mean_sun_elevation.is_none());
    }

    #[test]
    fn test_bad_number_is_parse_error() {
        let result = ImdMetadata::parse("meanSunEl = high;\n");
        assert!(matches!(result, Err(ToarError::Parse { .. })));
    }

    #[test]
    fn test_apply_to_keeps_job_values() {
        let imd = ImdMetadata::parse(IMD).unwrap();
        let mut options = ConversionOptions {
            sun_elevation: Some(40.0),
            ..Default::default()
        };
        imd.apply_to(&mut options);
        assert_eq!(options.sun_elevation, Some(40.0));
        assert_eq!(options.utc_time.as_deref(), Some("2010-06-23T10:55:46.500000Z"));
        assert_eq!(options.bands, vec!["BAND_B".to_string(), "BAND_N".to_string()]);
    }
}
