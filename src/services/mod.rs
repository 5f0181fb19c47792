//! Service layer for the aggregator.
//!
//! This module contains the stateful pieces a request goes through:
//! - Host health tracking (`InstanceHealthCache`)
//! - Host sampling (`InstanceSelector`)
//! - Per-host listing calls (`ListingFetcher`)
//! - Cross-request recency (`SeenIdHistory`)

mod fetcher;
mod health;
mod seen;
mod selector;

pub use fetcher::{ListingFetcher, ListingSource};
pub use health::{DEFAULT_COOLDOWN, InstanceHealthCache};
pub use seen::SeenIdHistory;
pub use selector::InstanceSelector;
