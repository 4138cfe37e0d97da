//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod clock;
pub mod config;
pub mod host_bridge;
pub mod host_bus;
pub mod persistence;
pub mod ports;
