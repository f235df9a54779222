use approx::assert_relative_eq;
use ndarray::Array2;
use std::f64::consts::PI;
use toar::core::acquisition::{AcquisitionMoment, DistanceSource, EarthSunDistance};
use toar::core::calibrate::CalibrationTable;
use toar::core::pipeline::{ConversionPipeline, ConversionRequest, PipelineState};
use toar::core::radiance::RadianceConverter;
use toar::core::reflectance::{ReflectanceConverter, SolarGeometry};
use toar::{earth_sun_distance_au, ErrorKind, OutputKind, RasterBand, Region, ToarError};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn reference_table() -> CalibrationTable {
    CalibrationTable::builder("reference", 11)
        .band("BAND_1", 1.2, 0.05, 1800.0)
        .build()
        .expect("Failed to build reference table")
}

fn ramp(rows: usize, cols: usize) -> RasterBand<u16> {
    RasterBand::new(Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c + 1) as u16))
}

#[test]
fn test_radiance_then_reflectance_reference_values() {
    init_logging();

    let table = reference_table();
    let band = RasterBand::new(Array2::from_elem((1, 1), 100u16));
    let calibration = table.lookup("BAND_1").unwrap();

    let (radiance, mut quality) = RadianceConverter::new(calibration, table.sensor())
        .convert(&band, &band.full_region())
        .expect("Radiance conversion failed");
    assert_relative_eq!(radiance.data[[0, 0]], 2400.0, epsilon = 1e-9);

    let geometry = SolarGeometry::from_sun_elevation(60.0).unwrap();
    let reflectance = ReflectanceConverter::new(calibration, EarthSunDistance::from_au(0.99), geometry)
        .convert(&radiance, &mut quality)
        .expect("Reflectance conversion failed");

    let expected = PI * 2400.0 * 0.99 * 0.99 / (1800.0 * 30f64.to_radians().cos());
    assert_relative_eq!(reflectance.data[[0, 0]], expected, max_relative = 1e-12);
    assert_eq!(quality.reflectance_above_one, 1);
}

#[test]
fn test_day_of_year_overrides_timestamp() {
    init_logging();

    let table = reference_table();
    let band = ramp(4, 4);
    let utc = AcquisitionMoment::from_utc_str("2010-01-04 10:30:00").unwrap();
    let overridden = utc.with_day_of_year_override(185).unwrap();

    let mut pipeline = ConversionPipeline::new(&table);
    let from_utc = pipeline
        .run(
            &ConversionRequest::new(utc, OutputKind::Reflectance)
                .band("BAND_1", &band)
                .sun_elevation(45.0),
        )
        .unwrap();
    let from_doy = pipeline
        .run(
            &ConversionRequest::new(overridden, OutputKind::Reflectance)
                .band("BAND_1", &band)
                .sun_elevation(45.0),
        )
        .unwrap();

    assert_eq!(from_doy.summary.day_of_year, 185);
    assert_eq!(from_doy.summary.distance_source, DistanceSource::DayOfYearOverride.to_string());
    assert!(from_doy.summary.earth_sun_distance > from_utc.summary.earth_sun_distance);

    // Same DOY given directly gives the same distance as the override
    let plain = AcquisitionMoment::from_day_of_year(185).unwrap();
    assert_eq!(earth_sun_distance_au(&plain).to_bits(), earth_sun_distance_au(&overridden).to_bits());

    let a = from_utc.product("BAND_1").unwrap().image.data[[1, 1]];
    let b = from_doy.product("BAND_1").unwrap().image.data[[1, 1]];
    assert!(b > a);
}

#[test]
fn test_region_output_is_two_by_two() {
    init_logging();

    let table = reference_table();
    let band = ramp(10, 10);
    let request = ConversionRequest::new(AcquisitionMoment::from_day_of_year(200).unwrap(), OutputKind::Radiance)
        .band("BAND_1", &band)
        .region(Region::new(2, 4, 0, 2));

    let output = ConversionPipeline::new(&table).run(&request).unwrap();
    let image = &output.product("BAND_1").unwrap().image;

    assert_eq!(image.dim(), (2, 2));
    assert_eq!(image.origin, (2, 0));
    // Cell (2, 0) of the ramp holds DN 21
    assert_relative_eq!(image.get(2, 0).unwrap(), 21.0 * 24.0, epsilon = 1e-9);
    assert_eq!(output.summary.bands[0].total_cells, 4);
}

#[test]
fn test_sun_elevation_bounds() {
    init_logging();

    let table = reference_table();
    let band = ramp(3, 3);
    let moment = AcquisitionMoment::from_day_of_year(4).unwrap();
    let mut pipeline = ConversionPipeline::new(&table);

    let horizon = ConversionRequest::new(moment, OutputKind::Reflectance)
        .band("BAND_1", &band)
        .sun_elevation(0.0);
    assert!(matches!(pipeline.run(&horizon), Err(ToarError::InvalidGeometry { .. })));
    assert_eq!(pipeline.state(), PipelineState::Failed(ErrorKind::InvalidGeometry));

    let zenith = ConversionRequest::new(moment, OutputKind::Reflectance)
        .band("BAND_1", &band)
        .sun_elevation(90.0);
    let output = pipeline.run(&zenith).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Completed);

    // Overhead sun: ρ = π·L·d²/ESUN
    let d = moment.earth_sun_distance().au();
    let expected = PI * 24.0 * d * d / 1800.0;
    assert_relative_eq!(output.products[0].image.data[[0, 0]], expected, max_relative = 1e-12);
}

#[test]
fn test_nodata_survives_both_stages() {
    init_logging();

    let table = reference_table();
    let mut data = Array2::from_elem((5, 5), 500u16);
    data[[0, 0]] = 0;
    data[[4, 3]] = 0;
    let band = RasterBand::with_nodata(data, 0u16);
    let moment = AcquisitionMoment::from_day_of_year(120).unwrap();
    let mut pipeline = ConversionPipeline::new(&table);

    for kind in [OutputKind::Radiance, OutputKind::Reflectance] {
        let request = ConversionRequest::new(moment, kind)
            .band("BAND_1", &band)
            .sun_elevation(35.0);
        let output = pipeline.run(&request).unwrap();
        let product = output.product("BAND_1").unwrap();

        assert_eq!(product.image.kind, kind);
        assert_eq!(product.image.nodata, 0.0);
        assert_eq!(product.image.data[[0, 0]], 0.0);
        assert_eq!(product.image.data[[4, 3]], 0.0);
        assert!(product.image.data[[2, 2]] > 0.0);
        assert_eq!(product.quality.nodata_cells, 2);
    }
}

#[test]
fn test_out_of_range_dn_is_reported_per_band() {
    init_logging();

    let table = CalibrationTable::worldview2();
    let mut data = Array2::from_elem((3, 3), 1000u16);
    data[[1, 2]] = 4095;
    let band = RasterBand::with_nodata(data, 0u16);
    let request = ConversionRequest::new(AcquisitionMoment::from_day_of_year(60).unwrap(), OutputKind::Radiance)
        .band("Red", &band);

    let output = ConversionPipeline::new(&table).run(&request).unwrap();
    let product = output.product("BAND_5").unwrap();

    assert_eq!(product.image.data[[1, 2]], 0.0);
    assert_eq!(product.quality.out_of_range_cells, 1);
    assert!(matches!(
        product.value_range_error,
        Some(ToarError::ValueRange { row: 1, col: 2, max, .. }) if max == 2047.0
    ));
    assert_eq!(output.summary.total_out_of_range(), 1);
}

#[test]
fn test_all_worldview2_bands() {
    init_logging();

    let table = CalibrationTable::worldview2();
    let labels: Vec<String> = table.labels().map(str::to_string).collect();
    assert_eq!(labels.len(), 9);

    let band = ramp(16, 16);
    let mut request = ConversionRequest::new(
        AcquisitionMoment::from_utc_str("2010-06-23T10:55:46.5Z").unwrap(),
        OutputKind::Reflectance,
    )
    .sun_elevation(53.8)
    .region(Region::new(4, 12, 4, 12));
    for label in &labels {
        request = request.band(label, &band);
    }

    let output = ConversionPipeline::new(&table).run(&request).unwrap();
    assert!(output.is_complete());
    assert_eq!(output.products.len(), 9);
    assert_eq!(output.summary.bands.len(), 9);

    // Products come back in request order
    for (product, label) in output.products.iter().zip(&labels) {
        assert_eq!(&product.band, label);
        assert_eq!(product.image.dim(), (8, 8));
        let (lo, hi) = product.image.valid_range().unwrap();
        assert!(lo > 0.0 && hi > lo);
    }

    let report = output.summary.to_string();
    assert!(report.contains("BAND_P"));
    assert!(report.contains("DOY 174"));
    let xml = output.summary.to_xml().unwrap();
    assert!(xml.contains("BAND_8"));
}

#[test]
fn test_day_of_year_limits() {
    assert!(AcquisitionMoment::from_day_of_year(1).is_ok());
    assert!(AcquisitionMoment::from_day_of_year(366).is_ok());
    assert!(matches!(AcquisitionMoment::from_day_of_year(0), Err(ToarError::Range(0))));
    assert!(matches!(AcquisitionMoment::from_day_of_year(367), Err(ToarError::Range(367))));

    for doy in [1, 4, 100, 185, 366] {
        let moment = AcquisitionMoment::from_day_of_year(doy).unwrap();
        assert_eq!(earth_sun_distance_au(&moment).to_bits(), earth_sun_distance_au(&moment).to_bits());
        let d = earth_sun_distance_au(&moment);
        assert!((0.98326..=1.01674).contains(&d));
    }
}

#[test]
fn test_quality_is_fresh_per_run() {
    let table = reference_table();
    let band = ramp(2, 2);
    let request = ConversionRequest::new(AcquisitionMoment::from_day_of_year(10).unwrap(), OutputKind::Radiance)
        .band("BAND_1", &band);
    let mut pipeline = ConversionPipeline::new(&table);

    let first = pipeline.run(&request).unwrap();
    let second = pipeline.run(&request).unwrap();
    let quality = &first.summary.bands[0];

    assert_eq!(quality.total_cells, 4);
    assert!(!quality.has_observations());
    assert_relative_eq!(quality.min_value.unwrap(), 24.0, epsilon = 1e-9);
    assert_relative_eq!(quality.max_value.unwrap(), 96.0, epsilon = 1e-9);
    assert_eq!(second.summary.bands[0], *quality);
}
