//! Instance sampling.

use indexmap::IndexSet;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::models::Settings;
use crate::services::InstanceHealthCache;
use crate::utils::url::normalize_host;

/// Picks which instances a request fans out to.
#[derive(Debug, Clone, Default)]
pub struct InstanceSelector {
    fallback: Vec<String>,
}

impl InstanceSelector {
    /// Create a selector with extra candidates appended after the user's
    /// instances. Entries that do not normalize are ignored.
    pub fn new<I, S>(fallback: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fallback = fallback
            .into_iter()
            .filter_map(|host| normalize_host(host.as_ref()))
            .collect();
        Self { fallback }
    }

    /// User instances followed by fallbacks, deduplicated.
    pub fn candidates(&self, settings: &Settings) -> Vec<String> {
        settings
            .instances
            .iter()
            .chain(self.fallback.iter())
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    /// Select hosts with the thread-local RNG.
    pub fn select(&self, settings: &Settings, health: &InstanceHealthCache) -> Vec<String> {
        self.select_with_rng(settings, health, &mut rand::rng())
    }

    /// Select at most `sample_size` hosts.
    ///
    /// Unhealthy hosts are skipped. When every candidate is unhealthy the
    /// first `sample_size` candidates are returned anyway, so a request
    /// always attempts at least one fetch.
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        settings: &Settings,
        health: &InstanceHealthCache,
        rng: &mut R,
    ) -> Vec<String> {
        let candidates = self.candidates(settings);
        let take = settings.sample_size;

        let mut healthy: Vec<String> = candidates
            .iter()
            .filter(|host| !health.is_unhealthy(host))
            .cloned()
            .collect();

        if healthy.is_empty() {
            log::warn!(
                "All {} candidate instance(s) are cooling down, trying them anyway",
                candidates.len()
            );
            return candidates.into_iter().take(take).collect();
        }

        if settings.randomize {
            healthy.shuffle(rng);
        }
        healthy.truncate(take);
        healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    fn settings(instances: &[&str], sample_size: usize, randomize: bool) -> Settings {
        Settings::normalize(&json!({
            "instances": instances,
            "sampleSize": sample_size,
            "randomize": randomize,
        }))
    }

    #[test]
    fn test_ordered_selection_takes_prefix() {
        let settings = settings(&["a.example", "b.example", "c.example"], 2, false);
        let health = InstanceHealthCache::default();
        assert_eq!(
            InstanceSelector::default().select(&settings, &health),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_unhealthy_hosts_are_skipped() {
        let settings = settings(&["a.example", "b.example", "c.example"], 2, false);
        let health = InstanceHealthCache::default();
        health.mark_unhealthy("https://a.example", "test");
        assert_eq!(
            InstanceSelector::default().select(&settings, &health),
            vec!["https://b.example", "https://c.example"]
        );
    }

    #[test]
    fn test_all_unhealthy_falls_back_to_original_order() {
        let settings = settings(&["a.example", "b.example", "c.example"], 2, true);
        let health = InstanceHealthCache::default();
        for host in ["https://a.example", "https://b.example", "https://c.example"] {
            health.mark_unhealthy(host, "test");
        }
        assert_eq!(
            InstanceSelector::default().select(&settings, &health),
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_sample_size_larger_than_candidates() {
        let settings = settings(&["a.example", "b.example"], 10, false);
        let health = InstanceHealthCache::default();
        assert_eq!(InstanceSelector::default().select(&settings, &health).len(), 2);
    }

    #[test]
    fn test_fallbacks_are_appended_and_deduplicated() {
        let settings = settings(&["a.example"], 5, false);
        let selector = InstanceSelector::new(["https://a.example/", "z.example", "::bad::"]);
        assert_eq!(
            selector.candidates(&settings),
            vec!["https://a.example", "https://z.example"]
        );
    }

    #[test]
    fn test_randomized_selection_is_a_seeded_permutation() {
        let hosts: Vec<String> = (0..8).map(|i| format!("h{i}.example")).collect();
        let host_refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
        let settings = settings(&host_refs, 8, true);
        let health = InstanceHealthCache::default();
        let selector = InstanceSelector::default();

        let first = selector.select_with_rng(&settings, &health, &mut StdRng::seed_from_u64(7));
        let again = selector.select_with_rng(&settings, &health, &mut StdRng::seed_from_u64(7));
        assert_eq!(first, again);

        let mut sorted = first.clone();
        sorted.sort();
        let mut expected = selector.candidates(&settings);
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_randomized_selection_varies_across_seeds() {
        let hosts: Vec<String> = (0..8).map(|i| format!("h{i}.example")).collect();
        let host_refs: Vec<&str> = hosts.iter().map(String::as_str).collect();
        let settings = settings(&host_refs, 1, true);
        let health = InstanceHealthCache::default();
        let selector = InstanceSelector::default();

        let picks: IndexSet<String> = (0..64)
            .map(|seed| {
                selector.select_with_rng(&settings, &health, &mut StdRng::seed_from_u64(seed))[0]
                    .clone()
            })
            .collect();
        assert!(picks.len() > 1);
    }
}
