//! Request pipeline.
//!
//! - `AggregationPipeline`: fan out to hosts, then merge into one page
//! - `Aggregator`: owns settings and caches across requests

pub mod aggregate;
pub mod aggregator;

pub use aggregate::{AggregationPipeline, DEFAULT_PAGE_SIZE, Fetched, language_allowed};
pub use aggregator::{Aggregator, ProbeReport};
