use crate::types::{ToarError, ToarResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Radiometric constants of one spectral band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandCalibration {
    pub label: String,
    /// Absolute radiometric calibration factor K [W/m²/sr/count]
    pub abs_cal_factor: f64,
    /// Effective bandwidth Δλ [μm]
    pub effective_bandwidth: f64,
    /// Band-averaged exo-atmospheric solar irradiance ESUN [W/m²/μm]
    pub esun: f64,
}

impl BandCalibration {
    pub fn new(
        label: impl Into<String>,
        abs_cal_factor: f64,
        effective_bandwidth: f64,
        esun: f64,
    ) -> ToarResult<Self> {
        let calibration = Self {
            label: label.into(),
            abs_cal_factor,
            effective_bandwidth,
            esun,
        };
        calibration.validate()?;
        Ok(calibration)
    }

    fn validate(&self) -> ToarResult<()> {
        let invalid = |reason: String| ToarError::InvalidCalibration {
            band: self.label.clone(),
            reason,
        };

        if !(self.abs_cal_factor.is_finite() && self.abs_cal_factor >= 0.0) {
            return Err(invalid(format!("K must be >= 0, got {}", self.abs_cal_factor)));
        }
        if !(self.effective_bandwidth.is_finite() && self.effective_bandwidth > 0.0) {
            return Err(invalid(format!(
                "effective bandwidth must be > 0, got {}",
                self.effective_bandwidth
            )));
        }
        if !(self.esun.is_finite() && self.esun > 0.0) {
            return Err(invalid(format!("ESUN must be > 0, got {}", self.esun)));
        }
        Ok(())
    }

    /// Radiance per DN, K / Δλ
    pub fn radiance_gain(&self) -> f64 {
        self.abs_cal_factor / self.effective_bandwidth
    }
}

/// Sensor characteristics shared by every band of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProfile {
    pub name: String,
    pub bit_depth: u32,
}

impl SensorProfile {
    /// Largest DN the sensor can record, 2^bits - 1
    pub fn max_dn(&self) -> f64 {
        2f64.powi(self.bit_depth as i32) - 1.0
    }
}

/// Fixed per-sensor lookup of band calibration constants.
///
/// Labels resolve case-insensitively, through aliases, and with any GRASS
/// style `@mapset` suffix removed. The table is immutable once built; share it
/// by reference between workers.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    sensor: SensorProfile,
    bands: BTreeMap<String, BandCalibration>,
    aliases: BTreeMap<String, String>,
}

impl CalibrationTable {
    pub fn builder(sensor: &str, bit_depth: u32) -> CalibrationTableBuilder {
        CalibrationTableBuilder {
            sensor: SensorProfile {
                name: sensor.to_string(),
                bit_depth,
            },
            bands: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// WorldView-2 constants from "Radiometric Use of WorldView-2 Imagery",
    /// Technical Note (2010), T. Updike & C. Comp
    pub fn worldview2() -> Self {
        #[rustfmt::skip]
        const WORLDVIEW2: [(&str, &[&str], f64, f64, f64); 9] = [
            // label     aliases                               K            Δλ       ESUN
            ("BAND_P", &["Pan", "P"],                          0.056783450, 0.2846, 1580.8140),
            ("BAND_1", &["Coastal", "BAND_C", "C"],            0.009295654, 0.0473, 1758.2229),
            ("BAND_2", &["Blue", "BAND_B", "B"],               0.012608250, 0.0543, 1974.2416),
            ("BAND_3", &["Green", "BAND_G", "G"],              0.009713071, 0.0630, 1856.4104),
            ("BAND_4", &["Yellow", "BAND_Y", "Y"],             0.005829815, 0.0374, 1738.4791),
            ("BAND_5", &["Red", "BAND_R", "R"],                0.011036230, 0.0574, 1559.4555),
            ("BAND_6", &["RedEdge", "BAND_RE", "RE"],          0.005188136, 0.0393, 1342.0695),
            ("BAND_7", &["NIR1", "BAND_N", "N"],               0.012243800, 0.0989, 1069.7302),
            ("BAND_8", &["NIR2", "BAND_N2", "N2"],             0.009042234, 0.0996,  861.2866),
        ];

        let mut builder = CalibrationTable::builder("WorldView-2", 11);
        for (label, aliases, k, bandwidth, esun) in WORLDVIEW2 {
            builder = builder.band(label, k, bandwidth, esun);
            for alias in aliases {
                builder = builder.alias(alias, label);
            }
        }

        match builder.build() {
            Ok(table) => table,
            Err(e) => unreachable!("bundled WorldView-2 table is invalid: {}", e),
        }
    }

    pub fn sensor(&self) -> &SensorProfile {
        &self.sensor
    }

    /// Calibration for `label`, [`ToarError::UnknownBand`] if the table has none
    pub fn lookup(&self, label: &str) -> ToarResult<&BandCalibration> {
        let key = normalize_label(label);
        let canonical = self.aliases.get(&key).unwrap_or(&key);
        self.bands
            .get(canonical)
            .ok_or_else(|| ToarError::UnknownBand(label.to_string()))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.lookup(label).is_ok()
    }

    /// Canonical band labels in table order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.bands.values().map(|cal| cal.label.as_str())
    }

    /// New table whose K and Δλ come from product metadata; ESUN stays the reference value.
    ///
    /// The absolute calibration factor depends on TDI level, line rate and bit
    /// depth of the delivered product, so the values in a product's `.IMD` file win
    /// over the generic table.
    pub fn with_overrides<'a, I>(&self, overrides: I) -> ToarResult<Self>
    where
        I: IntoIterator<Item = (&'a str, f64, f64)>,
    {
        let mut table = self.clone();
        for (label, k, bandwidth) in overrides {
            let reference = self.lookup(label)?;
            let updated = BandCalibration::new(reference.label.clone(), k, bandwidth, reference.esun)?;
            log::debug!(
                "Band {}: K {} -> {}, bandwidth {} -> {}",
                updated.label,
                reference.abs_cal_factor,
                updated.abs_cal_factor,
                reference.effective_bandwidth,
                updated.effective_bandwidth
            );
            table.bands.insert(normalize_label(&updated.label), updated);
        }
        Ok(table)
    }
}

/// Builder for sensor tables other than the bundled one, and for test fixtures
pub struct CalibrationTableBuilder {
    sensor: SensorProfile,
    bands: Vec<(String, f64, f64, f64)>,
    aliases: Vec<(String, String)>,
}

impl CalibrationTableBuilder {
    pub fn band(mut self, label: &str, abs_cal_factor: f64, effective_bandwidth: f64, esun: f64) -> Self {
        self.bands
            .push((label.to_string(), abs_cal_factor, effective_bandwidth, esun));
        self
    }

    pub fn alias(mut self, alias: &str, label: &str) -> Self {
        self.aliases.push((alias.to_string(), label.to_string()));
        self
    }

    pub fn build(self) -> ToarResult<CalibrationTable> {
        let mut bands = BTreeMap::new();
        for (label, k, bandwidth, esun) in self.bands {
            let calibration = BandCalibration::new(label, k, bandwidth, esun)?;
            bands.insert(normalize_label(&calibration.label), calibration);
        }

        let mut aliases = BTreeMap::new();
        for (alias, label) in self.aliases {
            let target = normalize_label(&label);
            if !bands.contains_key(&target) {
                return Err(ToarError::UnknownBand(label));
            }
            aliases.insert(normalize_label(&alias), target);
        }

        Ok(CalibrationTable {
            sensor: self.sensor,
            bands,
            aliases,
        })
    }
}

fn normalize_label(label: &str) -> String {
    let name = label.split('@').next().unwrap_or(label);
    name.trim().to_uppercase()
}
