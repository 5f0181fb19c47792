// src/lib.rs

//! fedtube: aggregated listings across federated video instances

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{AppError, FetchError, Result};
pub use pipeline::Aggregator;
