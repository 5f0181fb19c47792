//! Instance health cache.
//!
//! Hosts that fail a fetch or probe are kept out of selection for a fixed
//! cooldown. There is no background sweep: an entry is only looked at when
//! the host is consulted, and an expired entry is evicted on that lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::utils::{Clock, SystemClock};

/// Default cooldown for a failed host.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(600);

/// Process-wide record of hosts currently considered failing.
pub struct InstanceHealthCache {
    cooldown: chrono::Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InstanceHealthCache {
    /// Create a cache on the wall clock.
    pub fn new(cooldown: Duration) -> Self {
        Self::with_clock(cooldown, Arc::new(SystemClock))
    }

    /// Create a cache on a custom clock.
    pub fn with_clock(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldown: chrono::Duration::from_std(cooldown)
                .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_COOLDOWN.as_secs() as i64)),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Start (or restart) the cooldown for `host`.
    pub fn mark_unhealthy(&self, host: &str, reason: &str) {
        let until = self
            .clock
            .now()
            .checked_add_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        log::warn!(
            "Marking {} unhealthy until {}: {}",
            host,
            until.format("%H:%M:%S"),
            reason
        );
        self.entries().insert(host.to_string(), until);
    }

    /// Forget any cooldown for `host`.
    pub fn mark_healthy(&self, host: &str) {
        if self.entries().remove(host).is_some() {
            log::info!("{host} is healthy again");
        }
    }

    /// Whether `host` is inside its cooldown. Evicts the entry once expired.
    pub fn is_unhealthy(&self, host: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.get(host) {
            Some(until) if now < *until => true,
            Some(_) => {
                entries.remove(host);
                log::debug!("Cooldown for {host} elapsed");
                false
            }
            None => false,
        }
    }

    /// Live entries, sorted by host. Expired entries are dropped.
    pub fn snapshot(&self) -> Vec<(String, DateTime<Utc>)> {
        let now = self.clock.now();
        let mut entries = self.entries();
        entries.retain(|_, until| now < *until);

        let mut live: Vec<_> = entries
            .iter()
            .map(|(host, until)| (host.clone(), *until))
            .collect();
        live.sort();
        live
    }

    /// Load persisted entries, skipping any whose cooldown already elapsed.
    pub fn restore<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, DateTime<Utc>)>,
    {
        let now = self.clock.now();
        let mut current = self.entries();
        for (host, until) in entries {
            if now < until {
                current.insert(host, until);
            } else {
                log::debug!("Dropping elapsed cooldown for {host}");
            }
        }
    }

    /// Number of entries held, expired or not.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InstanceHealthCache {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl std::fmt::Debug for InstanceHealthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceHealthCache")
            .field("cooldown", &self.cooldown)
            .field("entries", &*self.entries())
            .finish()
    }
}
