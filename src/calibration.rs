use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, warn};
use serde::Deserialize;

use crate::math::{inverse_power_law, power_law, power_law_through};
use crate::minimisation::PowerLawProblem;
use crate::{Error, Result};

/// Solver settings for the power law regression
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: u64,
    /// Convergence is declared once the residual norm changes by less than this
    pub tolerance: f64,
    /// Fraction of each Gauss-Newton step taken, in `(0, 1]`
    pub step_length: f64,
    /// Trace every iteration to the terminal
    pub verbose: bool,
}

impl SolverConfig {
    /// Check the settings are usable by the solver
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the step length is outside `(0, 1]` or the tolerance
    /// is negative or not finite.
    pub fn validate(&self) -> Result<()> {
        if !(self.step_length > 0.0 && self.step_length <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "step length {} must be in (0, 1]",
                self.step_length
            )));
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "tolerance {} must be finite and non-negative",
                self.tolerance
            )));
        }
        Ok(())
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: f64::EPSILON.sqrt(),
            step_length: 1.0,
            verbose: false,
        }
    }
}

/// Inputs of a calibration run
///
/// Each of the scalar fields disables its derived output when left at zero.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Path to the datasheet points, relative to the config file when loaded with
    /// [`FitConfig::from_file`]
    pub data: Option<PathBuf>,
    /// Lowest detectable concentration in ppm
    pub min_ppm: f64,
    /// Highest detectable concentration in ppm
    pub max_ppm: f64,
    /// Sensor resistance measured in a known atmosphere
    pub measured_resistance: f64,
    /// Concentration in ppm of the atmosphere `measured_resistance` was taken in
    pub measured_concentration: f64,
    pub solver: SolverConfig,
}

impl FitConfig {
    /// Read a config from a TOML file
    ///
    /// A relative `data` path is resolved against the directory holding the config.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid config.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.solver.validate()?;
        if let (Some(data), Some(parent)) = (&config.data, path.parent()) {
            if data.is_relative() {
                config.data = Some(parent.join(data));
            }
        }
        Ok(config)
    }
}

fn enabled(value: f64) -> Option<f64> {
    (value != 0.0).then_some(value)
}

/// A digitised point on a datasheet response curve
///
/// `x` is the gas concentration in ppm and `y` the resistance ratio Rs/Ro, or the other way
/// round for swapped data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Deserialize)]
struct Row(f64, f64);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationData {
    points: Vec<CalibrationPoint>,
}

impl CalibrationData {
    pub fn new(points: Vec<CalibrationPoint>) -> Self {
        Self { points }
    }

    /// Create a `CalibrationData` from an on-disk representation
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a line is not an `x, y` pair.
    pub fn from_file(filepath: &Path) -> Result<Self> {
        let file = fs::read(filepath)?;
        Self::from_reader(&file[..])
    }

    /// Parse comma separated `x, y` pairs, one per line, without a header
    ///
    /// # Errors
    /// Returns an error if a record does not hold exactly two numbers.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut points = vec![];
        for result in rdr.deserialize() {
            let record: Row = result?;
            points.push(CalibrationPoint {
                x: record.0,
                y: record.1,
            });
        }

        Ok(Self { points })
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// The same points with the axes exchanged
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            points: self
                .points
                .iter()
                .map(|point| CalibrationPoint {
                    x: point.y,
                    y: point.x,
                })
                .collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.points.len() < 2 {
            return Err(Error::InsufficientData(self.points.len()));
        }
        if let Some((index, point)) = self
            .points
            .iter()
            .find_position(|point| !(point.x > 0.0 && point.y > 0.0))
        {
            return Err(Error::InvalidCalibrationPoint {
                index,
                x: point.x,
                y: point.y,
                reason: "coordinates must be positive to take logarithms",
            });
        }
        Ok(())
    }

    /// Closed form power law through the first and last points
    ///
    /// # Errors
    /// Returns an error if there are fewer than two points, any coordinate is not positive or
    /// the endpoints share an abscissa.
    pub fn initial_guess(&self) -> Result<(f64, f64)> {
        self.validate()?;
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::InsufficientData(self.points.len())),
        };

        let (a, b) = power_law_through((first.x, first.y), (last.x, last.y));
        if !(a.is_finite() && b.is_finite()) {
            return Err(Error::InvalidCalibrationPoint {
                index: self.points.len() - 1,
                x: last.x,
                y: last.y,
                reason: "first and last points must have distinct abscissae",
            });
        }
        Ok((a, b))
    }

    /// Least squares fit of `y = a * x^b`, seeded from [`CalibrationData::initial_guess`]
    ///
    /// # Errors
    /// Returns an error if the initial guess cannot be formed or the solver does not converge.
    pub fn fit(&self, config: &SolverConfig) -> Result<PowerLawFit> {
        config.validate()?;
        let initial = self.initial_guess()?;
        debug!("initial guess a = {}, b = {}", initial.0, initial.1);

        let fit = PowerLawProblem::new(&self.points)
            .solve(initial, config)
            .map_err(|err| {
                warn!("power law fit over {} points failed: {err}", self.points.len());
                err
            })?;
        debug!(
            "converged to a = {}, b = {} after {} iterations",
            fit.a, fit.b, fit.iterations
        );
        Ok(fit)
    }
}

/// Coefficients of `y = a * x^b`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerLawFit {
    pub a: f64,
    pub b: f64,
    /// Solver iterations taken to converge
    pub iterations: u64,
}

impl PowerLawFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        power_law(self.a, self.b, x)
    }

    pub fn solve_for_x(&self, y: f64) -> f64 {
        inverse_power_law(self.a, self.b, y)
    }
}

/// Outcome of a calibration run
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationReport {
    /// Rs/Ro as a function of ppm, the curve as drawn on the datasheet
    pub forward: PowerLawFit,
    /// ppm as a function of Rs/Ro, the curve the sensor model evaluates
    pub inverse: PowerLawFit,
    /// Rs/Ro at the highest detectable concentration
    pub min_rs_ro: Option<f64>,
    /// Rs/Ro at the lowest detectable concentration
    pub max_rs_ro: Option<f64>,
    /// Reference resistance implied by the manual measurement
    pub ro: Option<f64>,
}

/// Fit both curves to `data` and derive the constants enabled in `config`
///
/// # Errors
/// Returns an error if either fit fails.
pub fn calibrate(data: &CalibrationData, config: &FitConfig) -> Result<CalibrationReport> {
    let forward = data.fit(&config.solver)?;
    let inverse = data.swapped().fit(&config.solver)?;

    // The exponent is negative, so the ppm bounds map to the opposite ratio bounds
    let min_rs_ro = enabled(config.max_ppm).map(|ppm| inverse.solve_for_x(ppm));
    let max_rs_ro = enabled(config.min_ppm).map(|ppm| inverse.solve_for_x(ppm));
    let ro = enabled(config.measured_resistance)
        .zip(enabled(config.measured_concentration))
        .map(|(resistance, ppm)| resistance / inverse.solve_for_x(ppm));

    debug!("min Rs/Ro = {min_rs_ro:?}, max Rs/Ro = {max_rs_ro:?}, Ro = {ro:?}");

    Ok(CalibrationReport {
        forward,
        inverse,
        min_rs_ro,
        max_rs_ro,
        ro,
    })
}

/// Load the data named in `config` and calibrate against it
///
/// # Errors
/// Returns an error if `config` names no data file, the file cannot be parsed or a fit fails.
pub fn build(config: &FitConfig) -> Result<CalibrationReport> {
    let path = config.data.as_deref().ok_or(Error::MissingData)?;
    debug!("reading calibration points from {path:?}");
    let data = CalibrationData::from_file(path)?;
    calibrate(&data, config)
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let derived = [
            ("minRsRo", self.min_rs_ro),
            ("maxRsRo", self.max_rs_ro),
            ("Ro", self.ro),
        ];

        writeln!(f, "a = {}", self.inverse.a)?;
        write!(f, "b = {}", self.inverse.b)?;
        for (label, value) in derived
            .iter()
            .filter_map(|(label, value)| value.map(|value| (label, value)))
        {
            write!(f, "\n{label} = {value}")?;
        }
        Ok(())
    }
}
