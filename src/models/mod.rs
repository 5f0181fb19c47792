// src/models/mod.rs

//! Domain models for the aggregator.
//!
//! Operator configuration, normalized user settings, listing records as
//! returned by instances, and the display shape handed back to callers.

mod config;
mod display;
mod listing;
pub mod settings;

// Re-export all public types
pub use config::{
    AggregationConfig, Config, HealthConfig, HttpConfig, LoggingConfig, RetryConfig,
};
pub use display::{DisplayItem, DisplayMapper, ItemMapper};
pub use listing::{
    AggregatedResult, Language, ListingKind, ListingPage, ListingQuery, ListingRecord,
};
pub use settings::{RawSetting, Settings};
