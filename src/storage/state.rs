// src/storage/state.rs

//! State blob (de)serialization.
//!
//! The blob is private to this crate: callers hand back whatever string
//! [`PersistedState::save`] produced. Loading never fails; a missing or
//! corrupt blob starts a fresh state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::SeenIdHistory;

/// Everything carried from one process invocation to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub server_version: String,
    pub seen: SeenIdHistory,
    /// Host to end of its cooldown
    pub unhealthy_hosts: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireState {
    #[serde(default)]
    server_version: String,
    #[serde(default)]
    seen_ids: Vec<String>,
    #[serde(default)]
    unhealthy_hosts: BTreeMap<String, DateTime<Utc>>,
}

impl PersistedState {
    /// Decode a blob.
    ///
    /// Seen ids are capped at `seen_max`; cooldowns that ended before `now`
    /// are dropped.
    pub fn load(blob: Option<&str>, seen_max: usize, now: DateTime<Utc>) -> Self {
        let blob = match blob.map(str::trim) {
            Some(blob) if !blob.is_empty() => blob,
            _ => {
                log::debug!("No saved state, starting fresh");
                return Self::empty(seen_max);
            }
        };

        let wire: WireState = match serde_json::from_str(blob) {
            Ok(wire) => wire,
            Err(e) => {
                log::warn!("Saved state is corrupt, starting fresh: {e}");
                return Self::empty(seen_max);
            }
        };

        let before = wire.unhealthy_hosts.len();
        let unhealthy_hosts: BTreeMap<_, _> = wire
            .unhealthy_hosts
            .into_iter()
            .filter(|(_, until)| now < *until)
            .collect();
        if unhealthy_hosts.len() < before {
            log::debug!(
                "Dropped {} elapsed cooldown(s) from saved state",
                before - unhealthy_hosts.len()
            );
        }

        Self {
            server_version: wire.server_version,
            seen: SeenIdHistory::from_ids(wire.seen_ids, seen_max),
            unhealthy_hosts,
        }
    }

    /// Encode to a blob. Falls back to `"{}"`, which loads as a fresh state.
    pub fn save(&self) -> String {
        let wire = WireState {
            server_version: self.server_version.clone(),
            seen_ids: self.seen.iter().map(str::to_string).collect(),
            unhealthy_hosts: self.unhealthy_hosts.clone(),
        };
        serde_json::to_string(&wire).unwrap_or_else(|e| {
            log::error!("Failed to serialize state: {e}");
            "{}".to_string()
        })
    }

    fn empty(seen_max: usize) -> Self {
        Self {
            seen: SeenIdHistory::new(seen_max),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn sample() -> PersistedState {
        let mut seen = SeenIdHistory::new(10);
        seen.push("a");
        seen.push("b");
        PersistedState {
            server_version: "6.3.0".to_string(),
            seen,
            unhealthy_hosts: BTreeMap::from([(
                "https://down.example".to_string(),
                now() + Duration::seconds(300),
            )]),
        }
    }

    #[test]
    fn test_round_trip() {
        let state = sample();
        let loaded = PersistedState::load(Some(&state.save()), 10, now());
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_missing_or_corrupt_blob_is_fresh() {
        for blob in [None, Some(""), Some("   "), Some("not json"), Some("[1,2]")] {
            let state = PersistedState::load(blob, 7, now());
            assert_eq!(state.server_version, "");
            assert!(state.seen.is_empty());
            assert_eq!(state.seen.capacity(), 7);
            assert!(state.unhealthy_hosts.is_empty());
        }
    }

    #[test]
    fn test_partial_blob_uses_defaults() {
        let state = PersistedState::load(Some(r#"{"seenIds":["x"]}"#), 10, now());
        assert_eq!(state.seen.iter().collect::<Vec<_>>(), vec!["x"]);
        assert_eq!(state.server_version, "");
    }

    #[test]
    fn test_elapsed_cooldowns_are_dropped() {
        let blob = sample().save();
        let later = now() + Duration::seconds(301);
        let state = PersistedState::load(Some(&blob), 10, later);
        assert!(state.unhealthy_hosts.is_empty());
        assert_eq!(state.server_version, "6.3.0");
    }

    #[test]
    fn test_seen_ids_truncated_to_cap() {
        let blob = r#"{"seenIds":["a","b","c","d"]}"#;
        let state = PersistedState::load(Some(blob), 2, now());
        assert_eq!(state.seen.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_state_saves_to_loadable_blob() {
        let blob = PersistedState::default().save();
        let state = PersistedState::load(Some(&blob), 5, now());
        assert!(state.seen.is_empty());
    }
}
