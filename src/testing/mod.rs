//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the connection
//! manager and publication loop without an MQTT broker.

pub mod mocks;

pub use mocks::*;
