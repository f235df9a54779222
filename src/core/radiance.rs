use crate::core::calibrate::{BandCalibration, SensorProfile};
use crate::core::quality::BandQuality;
use crate::types::{is_nodata_value, DigitalNumber, OutputKind, RasterBand, Region, ToarArray, ToarError, ToarImage, ToarResult};
use ndarray::Zip;

/// Spectral radiance of a single DN: L = K * DN / Δλ
pub fn to_radiance(dn: f64, calibration: &BandCalibration) -> f64 {
    calibration.abs_cal_factor * dn / calibration.effective_bandwidth
}

/// DN to top-of-atmosphere spectral radiance for one band
pub struct RadianceConverter<'a> {
    calibration: &'a BandCalibration,
    max_dn: f64,
}

impl<'a> RadianceConverter<'a> {
    pub fn new(calibration: &'a BandCalibration, sensor: &SensorProfile) -> Self {
        Self {
            calibration,
            max_dn: sensor.max_dn(),
        }
    }

    pub fn calibration(&self) -> &BandCalibration {
        self.calibration
    }

    pub fn max_dn(&self) -> f64 {
        self.max_dn
    }

    /// Convert the cells of `region`.
    ///
    /// No-data cells keep the sentinel. DN above the sensor maximum and
    /// non-finite samples are written as no-data and counted; negative DN go
    /// through the formula and are counted. A valid cell whose radiance equals
    /// the no-data value fails the band with [`ToarError::NoDataCollision`].
    pub fn convert<T: DigitalNumber>(
        &self,
        band: &RasterBand<T>,
        region: &Region,
    ) -> ToarResult<(ToarImage, BandQuality)> {
        let label = self.calibration.label.as_str();
        let (rows, cols) = band.dim();
        region.validate_within(rows, cols)?;

        log::info!(
            "Converting {} to spectral radiance | K={}, bandwidth={:.4}",
            label,
            self.calibration.abs_cal_factor,
            self.calibration.effective_bandwidth
        );
        log::debug!("Band {} extent {}x{}, processing {}", label, rows, cols, region);

        let window = band.window(region);
        let nodata = band.output_nodata();
        let mut quality = BandQuality::new(label);
        quality.total_cells = window.len();

        let mut collision: Option<(usize, usize)> = None;
        let mut radiance = ToarArray::zeros(window.dim());

        Zip::indexed(&window)
            .and(&mut radiance)
            .for_each(|(r, c), &dn, out| {
                let (row, col) = (region.row_start + r, region.col_start + c);

                if band.is_nodata(dn) {
                    quality.nodata_cells += 1;
                    *out = nodata;
                    return;
                }

                match dn.to_f64() {
                    Some(value) if value.is_finite() => {
                        if value > self.max_dn {
                            quality.record_out_of_range(row, col, value);
                            *out = nodata;
                            return;
                        }
                        if value < 0.0 {
                            quality.negative_dn_cells += 1;
                        }

                        let l = to_radiance(value, self.calibration);
                        if collision.is_none() && is_nodata_value(l, nodata) {
                            collision = Some((row, col));
                        }
                        quality.record_value(l);
                        *out = l;
                    }
                    _ => {
                        quality.non_finite_cells += 1;
                        *out = nodata;
                    }
                }
            });

        if let Some((row, col)) = collision {
            log::error!("Band {}: radiance at ({}, {}) equals no-data value {}", label, row, col, nodata);
            return Err(ToarError::NoDataCollision {
                band: label.to_string(),
                row,
                col,
                nodata,
            });
        }

        if quality.negative_dn_cells > 0 {
            log::warn!("Band {}: {} cells with negative DN", label, quality.negative_dn_cells);
        }
        if quality.out_of_range_cells > 0 {
            log::warn!(
                "Band {}: {} cells above sensor maximum DN {} masked as no-data",
                label,
                quality.out_of_range_cells,
                self.max_dn
            );
        }
        if let (Some(lo), Some(hi)) = (quality.min_value, quality.max_value) {
            log::info!("Band {} radiance range: {:.4} to {:.4}", label, lo, hi);
        }

        let image = ToarImage {
            kind: OutputKind::Radiance,
            data: radiance,
            nodata,
            origin: (region.row_start, region.col_start),
        };
        Ok((image, quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibrate::CalibrationTable;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn fixture() -> CalibrationTable {
        CalibrationTable::builder("test sensor", 11)
            .band("BAND_1", 1.2, 0.05, 1800.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_single_cell_scenario() {
        let table = fixture();
        let converter = RadianceConverter::new(table.lookup("BAND_1").unwrap(), table.sensor());
        let band = RasterBand::new(array![[100u16]]);

        let (image, quality) = converter.convert(&band, &band.full_region()).unwrap();
        assert_relative_eq!(image.data[[0, 0]], 2400.0, epsilon = 1e-9);
        assert_eq!(quality.converted_cells(), 1);
        assert_eq!(image.kind, OutputKind::Radiance);
    }

    #[test]
    fn test_linear_and_monotonic() {
        let table = fixture();
        let cal = table.lookup("BAND_1").unwrap();
        let mut previous = to_radiance(0.0, cal);
        assert_eq!(previous, 0.0);
        for dn in 1..=2047 {
            let l = to_radiance(dn as f64, cal);
            assert!(l >= previous);
            assert_relative_eq!(l, dn as f64 * cal.radiance_gain(), max_relative = 1e-12);
            previous = l;
        }
        assert_relative_eq!(
            to_radiance(300.0, cal),
            to_radiance(100.0, cal) + to_radiance(200.0, cal),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_nodata_propagates() {
        let table = fixture();
        let converter = RadianceConverter::new(table.lookup("BAND_1").unwrap(), table.sensor());
        let band = RasterBand::with_nodata(array![[0u16, 10], [20, 0]], 0);

        let (image, quality) = converter.convert(&band, &band.full_region()).unwrap();
        assert_eq!(image.data[[0, 0]], 0.0);
        assert_eq!(image.data[[1, 1]], 0.0);
        assert_relative_eq!(image.data[[0, 1]], 240.0, epsilon = 1e-9);
        assert_eq!(quality.nodata_cells, 2);
    }

    #[test]
    fn test_negative_dn_passes_through() {
        let table = fixture();
        let converter = RadianceConverter::new(table.lookup("BAND_1").unwrap(), table.sensor());
        let band = RasterBand::new(array![[-5.0f32, 5.0]]);

        let (image, quality) = converter.convert(&band, &band.full_region()).unwrap();
        assert_relative_eq!(image.data[[0, 0]], -120.0, epsilon = 1e-6);
        assert_eq!(quality.negative_dn_cells, 1);
        assert!(quality.has_observations());
    }

    #[test]
    fn test_out_of_range_cells_are_masked() {
        let table = fixture();
        let converter = RadianceConverter::new(table.lookup("BAND_1").unwrap(), table.sensor());
        let band = RasterBand::with_nodata(array![[65535u16, 2047], [2048, 1]], 65535);

        let (image, quality) = converter.convert(&band, &band.full_region()).unwrap();
        assert_eq!(quality.nodata_cells, 1);
        assert_eq!(quality.out_of_range_cells, 1);
        assert_eq!(quality.first_out_of_range, Some((1, 0)));
        assert_eq!(image.data[[1, 0]], 65535.0);
        assert!(matches!(
            quality.value_range_error(converter.max_dn()),
            Some(ToarError::ValueRange { row: 1, col: 0, .. })
        ));
    }

    #[test]
    fn test_non_finite_samples() {
        let table = fixture();
        let converter = RadianceConverter::new(table.lookup("BAND_1").unwrap(), table.sensor());
        let band = RasterBand::new(array![[f64::NAN, f64::INFINITY, 1.0]]);

        let (image, quality) = converter.convert(&band, &band.full_region()).unwrap();
        assert_eq!(quality.non_finite_cells, 2);
        assert!(image.is_nodata(image.data[[0, 1]]));
        assert_relative_eq!(image.data[[0, 2]], 24.0, epsilon = 1e-9);
    }

    #[test]
    fn test_nan_sentinel_counts_as_nodata() {
        let table = fixture();
        let converter = RadianceConverter::new(table.lookup("BAND_1").unwrap(), table.sensor());
        let band = RasterBand::with_nodata(array![[f32::NAN, 100.0], [f32::NAN, 5.0]], f32::NAN);

        let (image, quality) = converter.convert(&band, &band.full_region()).unwrap();
        assert_eq!(quality.nodata_cells, 2);
        assert_eq!(quality.non_finite_cells, 0);
        assert!(!quality.has_observations());
        assert!(image.data[[0, 0]].is_nan());
        assert_relative_eq!(image.data[[0, 1]], 2400.0, epsilon = 1e-6);
    }

    #[test]
    fn test_region_restricts_output() {
        let table = fixture();
        let converter = RadianceConverter::new(table.lookup("BAND_1").unwrap(), table.sensor());
        let band = RasterBand::new(Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as u16));

        let (image, quality) = converter.convert(&band, &Region::new(2, 4, 0, 2)).unwrap();
        assert_eq!(image.dim(), (2, 2));
        assert_eq!(image.origin, (2, 0));
        assert_eq!(quality.total_cells, 4);
        assert_relative_eq!(image.get(3, 1).unwrap(), 31.0 * 24.0, epsilon = 1e-9);

        let outside = converter.convert(&band, &Region::new(8, 12, 0, 2));
        assert!(matches!(outside, Err(ToarError::RegionOutOfBounds { .. })));
    }

    #[test]
    fn test_collision_with_sentinel_fails_band() {
        let table = CalibrationTable::builder("test sensor", 11)
            .band("DARK", 0.0, 0.05, 1800.0)
            .build()
            .unwrap();
        let converter = RadianceConverter::new(table.lookup("DARK").unwrap(), table.sensor());
        let band = RasterBand::with_nodata(array![[0u16, 7]], 0);

        let result = converter.convert(&band, &band.full_region());
        assert!(matches!(
            result,
            Err(ToarError::NoDataCollision { row: 0, col: 1, .. })
        ));
    }
}
