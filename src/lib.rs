//! Machine failure prediction service.
//!
//! Reconciles sensor readings against a classifier's feature schema, runs
//! inference through a capability-aware adapter and raises a warning when
//! the aggregate failure risk crosses a threshold.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;

pub use error::{AppError, Result};
