//! # ECG Common Library
//!
//! Shared code for the ECG replay service:
//! - Observation record schema
//! - Series Store (canonical artifact loading)
//! - Transform Pipeline (per-second dedup)
//! - Configuration loading
//! - Error types

pub mod config;
pub mod error;
pub mod observation;
pub mod series_store;
pub mod transform;

pub use error::{Error, Result};
pub use observation::{RawObservation, Series, ValueQuantity};
pub use series_store::SeriesStore;
pub use transform::{transform, TransformedSample};
