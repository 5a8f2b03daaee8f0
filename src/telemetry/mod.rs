//! Simulated solar-panel telemetry
//!
//! - [`reading`] - the reading record and its JSON wire form
//! - [`generator`] - realistic and steady reading generators

pub mod generator;
pub mod reading;

pub use generator::{generator_for, ReadingGenerator, RealisticGenerator, SteadyGenerator};
pub use reading::SensorReading;
