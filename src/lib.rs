#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

// BLAS backend for ndarray's `blas` feature
extern crate blas_src;

pub mod adc;
pub mod calibration;
pub mod error;
pub mod math;
pub(crate) mod minimisation;
pub mod sensor;

pub use error::{Error, Result};
