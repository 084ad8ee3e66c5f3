use proptest::prelude::*;
use tempdir::TempDir;

use mq135::adc::{FixedSource, FULL_SCALE};
use mq135::sensor::{Mq135, SensorModel, SensorParameters};
use mq135::{Error, Result};

fn model() -> SensorModel<f64> {
    SensorModel::new(SensorParameters::default())
}

proptest! {
    #[test]
    fn resistance_is_finite_and_decreasing(code in 1..FULL_SCALE) {
        let model = model();
        let lower = model.resistance(code).unwrap();
        let upper = model.resistance(code + 1).unwrap();

        prop_assert!(lower.is_finite() && upper.is_finite());
        prop_assert!(upper < lower);
    }

    #[test]
    fn concentration_falls_as_resistance_rises(r in 0.1..1000.0f64, factor in 1.001..10.0f64) {
        let model = model();
        prop_assert!(model.concentration(r * factor).unwrap() < model.concentration(r).unwrap());
    }

    #[test]
    fn concentration_rises_with_code(code in 1..FULL_SCALE) {
        let model = model();
        let cleaner = model.concentration(model.resistance(code).unwrap()).unwrap();
        let dirtier = model.concentration(model.resistance(code + 1).unwrap()).unwrap();
        prop_assert!(dirtier > cleaner);
    }

    #[test]
    fn humidity_term_vanishes_at_reference_humidity(t in -20.0..50.0f64) {
        let p = SensorParameters::<f64>::default();
        let expected = p.cora * t * t - p.corb * t + p.corc;
        approx::assert_relative_eq!(model().correction_factor(t, 33.0), expected, max_relative = 1e-12);
    }
}

#[test]
fn driver_reads_through_the_converter() -> Result<()> {
    let source = FixedSource::new().with_channel(3, [8192, 16384]);
    let mut sensor = Mq135::<_, f64>::new(source, 3, SensorParameters::default());
    let model = *sensor.model();

    approx::assert_relative_eq!(sensor.read_resistance()?, model.resistance(8192)?);
    approx::assert_relative_eq!(
        sensor.read_concentration()?,
        model.concentration(model.resistance(16384)?)?
    );

    Ok(())
}

#[test]
fn driver_applies_ambient_correction() -> Result<()> {
    let source = FixedSource::new().with_channel(0, [12000]);
    let mut sensor = Mq135::<_, f64>::new(source, 0, SensorParameters::default());
    let model = *sensor.model();
    let (t, h) = (28.0, 55.0);

    approx::assert_relative_eq!(
        sensor.read_corrected_resistance(t, h)?,
        model.corrected_resistance(t, h, model.resistance(12000)?)?
    );
    approx::assert_relative_eq!(
        sensor.read_corrected_concentration(t, h)?,
        model.corrected_concentration(t, h, 12000)?
    );
    approx::assert_relative_eq!(
        sensor.read_reference_resistance()?,
        model.reference_resistance(model.resistance(12000)?)
    );
    approx::assert_relative_eq!(
        sensor.read_corrected_reference_resistance(t, h)?,
        model.corrected_reference_resistance(t, h, model.resistance(12000)?)?
    );

    Ok(())
}

#[test]
fn driver_debug_output_names_its_channel() {
    let source = FixedSource::new().with_channel(5, [1000]);
    let sensor: Mq135<_> = Mq135::new(source, 5, SensorParameters::default());

    assert!(format!("{sensor:?}").contains("channel: 5"));
}

#[test]
fn zero_reading_from_the_converter_is_rejected() {
    let source = FixedSource::new().with_channel(1, [0]);
    let mut sensor: Mq135<_> = Mq135::new(source, 1, SensorParameters::default());

    assert!(matches!(
        sensor.read_concentration(),
        Err(Error::InvalidReading { code: 0, .. })
    ));
}

#[test]
fn converter_failures_carry_the_channel() {
    let mut source = FixedSource::new().with_channel(1, [100]);
    let mut sensor: Mq135<_> = Mq135::new(&mut source, 2, SensorParameters::default());

    assert!(matches!(
        sensor.read_code(),
        Err(Error::Adc { channel: 2, .. })
    ));
}

#[test]
fn parameters_load_from_toml_with_defaults_for_missing_keys() -> Result<()> {
    let tmp_dir = TempDir::new("parameters_load_from_toml")?;
    let path = tmp_dir.path().join("sensor.toml");
    std::fs::write(&path, "rzero = 42.568\npara = 110.93\nparb = 2.762\n")?;

    let parameters = SensorParameters::<f32>::from_file(&path)?;

    approx::assert_relative_eq!(parameters.rzero, 42.568);
    approx::assert_relative_eq!(parameters.para, 110.93);
    approx::assert_relative_eq!(parameters.parb, 2.762);
    approx::assert_relative_eq!(parameters.rload, 10.0);
    approx::assert_relative_eq!(parameters.atmo_co2, 397.13);

    Ok(())
}
