use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The converter returned a code the resistance formula cannot use
    #[error("raw reading {code} is outside the valid range 1..={max}")]
    InvalidReading { code: u16, max: u16 },

    /// The temperature / humidity polynomial is not strictly positive
    #[error("correction factor {factor} at t = {temperature}, h = {humidity} is not positive")]
    DegenerateCorrection {
        temperature: f64,
        humidity: f64,
        factor: f64,
    },

    #[error("sensor resistance {0} kOhm must be positive and finite")]
    InvalidResistance(f64),

    #[error("no calibration data file configured")]
    MissingData,

    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),

    #[error("power law fit did not converge: {0}")]
    FitConvergenceFailure(String),

    #[error("at least 2 calibration points are required, found {0}")]
    InsufficientData(usize),

    #[error("calibration point {index} ({x}, {y}) cannot be used: {reason}")]
    InvalidCalibrationPoint {
        index: usize,
        x: f64,
        y: f64,
        reason: &'static str,
    },

    #[error("failed to read channel {channel}: {source}")]
    Adc {
        channel: u8,
        source: Box<dyn ::std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] ::std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
