//! Conversion of MQ135 readings into resistance and gas concentration.
//!
//! The sensor forms a voltage divider with a load resistor `rload`. The sensing resistance Rs
//! follows from the converter code, and the concentration from the datasheet power law
//! `ppm = para * (Rs / rzero)^(-parb)`. Rs depends on ambient temperature and humidity; the
//! correction polynomial normalises it to reference conditions.
use std::fmt::Debug;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use num_traits::Float;
use serde::Deserialize;

use crate::adc::{AnalogSource, FULL_SCALE};
use crate::calibration::PowerLawFit;
use crate::math::{inverse_power_law, power_law};
use crate::{Error, Result};

/// Relative humidity at which the correction polynomial carries no humidity term
pub const REFERENCE_HUMIDITY: f64 = 33.0;

fn constant<F: Float>(value: f64) -> F {
    F::from(value).unwrap_or_else(F::nan)
}

fn to_f64<F: Float>(value: F) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Fixed per-unit constants of a sensor
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorParameters<F> {
    /// Load resistance on the board in kOhm
    pub rload: F,
    /// Sensor resistance in kOhm at the atmospheric CO2 level
    pub rzero: F,
    /// Scale of the concentration curve
    pub para: F,
    /// Magnitude of the (negative) exponent of the concentration curve
    pub parb: F,
    /// Quadratic temperature coefficient of the correction factor
    pub cora: F,
    /// Linear temperature coefficient of the correction factor
    pub corb: F,
    /// Correction factor at 0 °C and the reference humidity
    pub corc: F,
    /// Change of the correction factor per %RH away from the reference humidity
    pub cord: F,
    /// Atmospheric CO2 in ppm used when backing out `rzero`
    pub atmo_co2: F,
    /// Supply voltage as a multiple of the converter full scale voltage
    pub supply_ratio: F,
}

impl<F: Float> Default for SensorParameters<F> {
    fn default() -> Self {
        Self {
            rload: constant(10.0),
            rzero: constant(76.63),
            para: constant(116.602_068_2),
            parb: constant(2.769_034_857),
            cora: constant(0.000_35),
            corb: constant(0.027_18),
            corc: constant(1.395_38),
            cord: constant(0.001_8),
            atmo_co2: constant(397.13),
            supply_ratio: constant(5.0),
        }
    }
}

impl<F: Float + for<'de> Deserialize<'de>> SensorParameters<F> {
    /// Read parameters from a TOML file, missing keys take their default
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or holds invalid values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

impl<F: Float> SensorParameters<F> {
    /// Replace the concentration curve with a fitted ppm-from-ratio power law
    ///
    /// The fitted exponent is negative; it is stored as its magnitude.
    #[must_use]
    pub fn with_fit(self, fit: &PowerLawFit) -> Self {
        Self {
            para: constant(fit.a),
            parb: constant(-fit.b),
            ..self
        }
    }

    #[must_use]
    pub fn with_rzero(self, rzero: F) -> Self {
        Self { rzero, ..self }
    }
}

/// Stateless conversion from converter codes to concentration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorModel<F> {
    parameters: SensorParameters<F>,
}

impl<F: Float + Debug> Default for SensorModel<F> {
    fn default() -> Self {
        Self::new(SensorParameters::default())
    }
}

impl<F: Float + Debug> SensorModel<F> {
    pub const fn new(parameters: SensorParameters<F>) -> Self {
        Self { parameters }
    }

    pub const fn parameters(&self) -> &SensorParameters<F> {
        &self.parameters
    }

    /// Sensor resistance in kOhm for a converter code
    ///
    /// # Errors
    /// Returns [`Error::InvalidReading`] if `code` is zero or above full scale.
    pub fn resistance(&self, code: u16) -> Result<F> {
        if code == 0 || code > FULL_SCALE {
            return Err(Error::InvalidReading {
                code,
                max: FULL_SCALE,
            });
        }
        let full_scale: F = constant(f64::from(FULL_SCALE));
        let code: F = constant(f64::from(code));
        Ok(((full_scale / code) * self.parameters.supply_ratio - F::one()) * self.parameters.rload)
    }

    /// Temperature and humidity dependence of the sensor resistance
    ///
    /// `temperature` is in °C and `humidity` in %RH.
    pub fn correction_factor(&self, temperature: F, humidity: F) -> F {
        let p = &self.parameters;
        p.cora * temperature * temperature - p.corb * temperature + p.corc
            - (humidity - constant(REFERENCE_HUMIDITY)) * p.cord
    }

    /// Resistance normalised for ambient conditions
    ///
    /// # Errors
    /// Returns [`Error::DegenerateCorrection`] if the correction factor is not positive.
    pub fn corrected_resistance(&self, temperature: F, humidity: F, resistance: F) -> Result<F> {
        let factor = self.correction_factor(temperature, humidity);
        if !(factor > F::zero() && factor.is_finite()) {
            warn!("correction factor {factor:?} at {temperature:?} °C, {humidity:?} %RH");
            return Err(Error::DegenerateCorrection {
                temperature: to_f64(temperature),
                humidity: to_f64(humidity),
                factor: to_f64(factor),
            });
        }
        Ok(resistance / factor)
    }

    /// Gas concentration in ppm for a sensor resistance in kOhm
    ///
    /// # Errors
    /// Returns [`Error::InvalidResistance`] if `resistance` is not positive and finite.
    pub fn concentration(&self, resistance: F) -> Result<F> {
        if !(resistance > F::zero() && resistance.is_finite()) {
            return Err(Error::InvalidResistance(to_f64(resistance)));
        }
        let p = &self.parameters;
        Ok(power_law(p.para, -p.parb, resistance / p.rzero))
    }

    /// Gas concentration in ppm for a converter code taken at the given conditions
    ///
    /// # Errors
    /// Returns an error if the code is invalid or the correction factor is degenerate.
    pub fn corrected_concentration(&self, temperature: F, humidity: F, code: u16) -> Result<F> {
        let resistance = self.resistance(code)?;
        let corrected = self.corrected_resistance(temperature, humidity, resistance)?;
        self.concentration(corrected)
    }

    /// Reference resistance implied by a resistance measured in the reference atmosphere
    pub fn reference_resistance(&self, resistance: F) -> F {
        let p = &self.parameters;
        resistance / inverse_power_law(p.para, -p.parb, p.atmo_co2)
    }

    /// [`SensorModel::reference_resistance`] of the resistance normalised for conditions
    ///
    /// # Errors
    /// Returns [`Error::DegenerateCorrection`] if the correction factor is not positive.
    pub fn corrected_reference_resistance(
        &self,
        temperature: F,
        humidity: F,
        resistance: F,
    ) -> Result<F> {
        let corrected = self.corrected_resistance(temperature, humidity, resistance)?;
        Ok(self.reference_resistance(corrected))
    }
}

/// An MQ135 wired to one channel of a converter
#[derive(Debug)]
pub struct Mq135<A, F = f32> {
    source: A,
    channel: u8,
    model: SensorModel<F>,
}

impl<A: AnalogSource, F: Float + Debug> Mq135<A, F> {
    pub const fn new(source: A, channel: u8, parameters: SensorParameters<F>) -> Self {
        Self {
            source,
            channel,
            model: SensorModel::new(parameters),
        }
    }

    pub const fn model(&self) -> &SensorModel<F> {
        &self.model
    }

    pub fn release(self) -> A {
        self.source
    }

    /// Take one raw reading from the converter
    ///
    /// # Errors
    /// Returns [`Error::Adc`] if the converter fails.
    pub fn read_code(&mut self) -> Result<u16> {
        let code = self
            .source
            .read_single_ended(self.channel)
            .map_err(|err| Error::Adc {
                channel: self.channel,
                source: Box::new(err),
            })?;
        debug!("channel {} read {code}", self.channel);
        Ok(code)
    }

    /// # Errors
    /// Returns an error if the converter fails or reports an invalid code.
    pub fn read_resistance(&mut self) -> Result<F> {
        let code = self.read_code()?;
        self.model.resistance(code)
    }

    /// # Errors
    /// Returns an error if the reading is invalid or the correction factor is degenerate.
    pub fn read_corrected_resistance(&mut self, temperature: F, humidity: F) -> Result<F> {
        let resistance = self.read_resistance()?;
        self.model
            .corrected_resistance(temperature, humidity, resistance)
    }

    /// # Errors
    /// Returns an error if the converter fails or reports an invalid code.
    pub fn read_concentration(&mut self) -> Result<F> {
        let resistance = self.read_resistance()?;
        self.model.concentration(resistance)
    }

    /// # Errors
    /// Returns an error if the reading is invalid or the correction factor is degenerate.
    pub fn read_corrected_concentration(&mut self, temperature: F, humidity: F) -> Result<F> {
        let code = self.read_code()?;
        self.model
            .corrected_concentration(temperature, humidity, code)
    }

    /// Commissioning reading, taken with the sensor in the reference atmosphere
    ///
    /// # Errors
    /// Returns an error if the converter fails or reports an invalid code.
    pub fn read_reference_resistance(&mut self) -> Result<F> {
        let resistance = self.read_resistance()?;
        Ok(self.model.reference_resistance(resistance))
    }

    /// # Errors
    /// Returns an error if the reading is invalid or the correction factor is degenerate.
    pub fn read_corrected_reference_resistance(
        &mut self,
        temperature: F,
        humidity: F,
    ) -> Result<F> {
        let resistance = self.read_resistance()?;
        self.model
            .corrected_reference_resistance(temperature, humidity, resistance)
    }
}
