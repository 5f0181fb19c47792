// src/pipeline/aggregate.rs

//! Fan-out and merge.
//!
//! Every selected host is fetched independently; a failing host only loses
//! its own contribution. The surviving records are flattened in host order
//! and run through one sequential filter pass:
//!
//! 1. drop an id already accepted in this pass
//! 2. drop an id in the seen history
//! 3. drop a record whose language matches none of the preferred tags
//! 4. drop a record once its author reached the per-channel quota
//!
//! Accepted records are appended until the page is full.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::models::{AggregatedResult, Config, ItemMapper, ListingQuery, ListingRecord, Settings};
use crate::services::{ListingSource, SeenIdHistory};

/// Default cap on items in one aggregated page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// A record together with the host that served it.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub host: String,
    pub record: ListingRecord,
}

/// Counters for one merge pass, logged at the end.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeStats {
    pub candidates: usize,
    pub duplicates: usize,
    pub seen: usize,
    pub language: usize,
    pub quota: usize,
    pub accepted: usize,
}

/// Fetches from several hosts and merges the results into one page.
#[derive(Clone)]
pub struct AggregationPipeline {
    source: Arc<dyn ListingSource>,
    page_size: usize,
    max_concurrent: usize,
}

impl AggregationPipeline {
    pub fn new(source: Arc<dyn ListingSource>) -> Self {
        Self {
            source,
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrent: 4,
        }
    }

    pub fn from_config(source: Arc<dyn ListingSource>, config: &Config) -> Self {
        Self::new(source)
            .with_page_size(config.aggregation.page_size)
            .with_max_concurrent(config.http.max_concurrent)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Fetch and merge in one go.
    pub async fn aggregate<T, M>(
        &self,
        hosts: &[String],
        query: &ListingQuery,
        settings: &Settings,
        seen: &mut SeenIdHistory,
        mapper: &M,
    ) -> AggregatedResult<T>
    where
        M: ItemMapper<T> + ?Sized,
    {
        let fetched = self.fetch_all(hosts, query).await;
        self.merge(fetched, settings, seen, mapper)
    }

    /// Fetch every host, at most `max_concurrent` at once.
    ///
    /// Results come back in host order regardless of completion order.
    /// Failed hosts contribute nothing.
    pub async fn fetch_all(&self, hosts: &[String], query: &ListingQuery) -> Vec<Fetched> {
        let source = self.source.as_ref();
        let pages: Vec<_> = stream::iter(hosts)
            .map(|host| async move { (host, source.fetch(host, query).await) })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut fetched = Vec::new();
        let mut failures = 0;
        for (host, page) in pages {
            match page {
                Ok(page) => fetched.extend(page.records.into_iter().map(|record| Fetched {
                    host: host.clone(),
                    record,
                })),
                Err(e) => {
                    failures += 1;
                    log::warn!("No records from {}: {}", host, e);
                }
            }
        }

        log::debug!(
            "Fetched {} record(s) from {} host(s), {} failed",
            fetched.len(),
            hosts.len(),
            failures
        );
        fetched
    }

    /// Run the filter pass over already fetched records.
    ///
    /// Accepted ids are pushed into `seen` and each accepted record is
    /// mapped exactly once.
    pub fn merge<T, M>(
        &self,
        fetched: Vec<Fetched>,
        settings: &Settings,
        seen: &mut SeenIdHistory,
        mapper: &M,
    ) -> AggregatedResult<T>
    where
        M: ItemMapper<T> + ?Sized,
    {
        let mut stats = MergeStats {
            candidates: fetched.len(),
            ..MergeStats::default()
        };
        let mut taken: HashSet<String> = HashSet::new();
        let mut per_author: HashMap<String, usize> = HashMap::new();
        let mut accepted: Vec<Fetched> = Vec::new();

        for item in fetched {
            if accepted.len() >= self.page_size {
                break;
            }
            let record = &item.record;

            if taken.contains(&record.id) {
                stats.duplicates += 1;
                continue;
            }
            if seen.contains(&record.id) {
                stats.seen += 1;
                continue;
            }
            if !language_allowed(record, settings) {
                stats.language += 1;
                continue;
            }
            let count = per_author.entry(record.author_key.clone()).or_insert(0);
            if *count >= settings.max_per_channel {
                stats.quota += 1;
                continue;
            }
            *count += 1;

            taken.insert(record.id.clone());
            accepted.push(item);
        }

        for item in &accepted {
            seen.push(&item.record.id);
        }
        stats.accepted = accepted.len();

        log::info!(
            "Merged {} of {} candidate(s) (duplicate: {}, seen: {}, language: {}, quota: {})",
            stats.accepted,
            stats.candidates,
            stats.duplicates,
            stats.seen,
            stats.language,
            stats.quota
        );

        AggregatedResult::new(
            accepted
                .iter()
                .map(|item| mapper.map(&item.host, &item.record))
                .collect(),
        )
    }
}

/// Whether `record` passes the preferred-language filter.
///
/// Records without language metadata always pass.
pub fn language_allowed(record: &ListingRecord, settings: &Settings) -> bool {
    if settings.preferred_languages.is_empty() {
        return true;
    }
    let Some(language) = &record.language else {
        return true;
    };
    language.candidates().iter().any(|candidate| {
        settings
            .preferred_languages
            .iter()
            .any(|tag| candidate.contains(tag.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::{HttpConfig, ListingPage};
    use crate::services::{InstanceHealthCache, ListingFetcher};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serves canned records per host; unknown hosts fail.
    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<String, Vec<Value>>,
    }

    impl FakeSource {
        fn with(mut self, host: &str, records: Vec<Value>) -> Self {
            self.pages.insert(host.to_string(), records);
            self
        }
    }

    #[async_trait]
    impl ListingSource for FakeSource {
        async fn fetch(
            &self,
            host: &str,
            _query: &ListingQuery,
        ) -> std::result::Result<ListingPage, FetchError> {
            match self.pages.get(host) {
                Some(records) => Ok(ListingPage {
                    records: records
                        .iter()
                        .cloned()
                        .filter_map(ListingRecord::from_value)
                        .collect(),
                    total: records.len() as u64,
                    has_more: false,
                }),
                None => Err(FetchError::bad_response(host, 500)),
            }
        }
    }

    fn video(id: &str, channel: &str) -> Value {
        json!({ "uuid": id, "name": id, "channel": { "name": channel, "host": "origin.example" } })
    }

    fn video_in(id: &str, channel: &str, language: &str) -> Value {
        let mut value = video(id, channel);
        value["language"] = json!({ "id": language, "label": null });
        value
    }

    fn settings(raw: Value) -> Settings {
        Settings::normalize(&raw)
    }

    fn id_mapper(_host: &str, record: &ListingRecord) -> String {
        record.id.clone()
    }

    async fn run(
        source: FakeSource,
        hosts: &[&str],
        settings: &Settings,
        seen: &mut SeenIdHistory,
    ) -> AggregatedResult<String> {
        let hosts: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
        AggregationPipeline::new(Arc::new(source))
            .aggregate(&hosts, &ListingQuery::home(20), settings, seen, &id_mapper)
            .await
    }

    #[tokio::test]
    async fn test_quota_accepts_two_of_five() {
        let source = FakeSource::default().with(
            "https://a.example",
            (0..5).map(|i| video(&format!("v{i}"), "solo")).collect(),
        );
        let settings = settings(json!({ "maxPerChannel": 2 }));
        let mut seen = SeenIdHistory::new(100);

        let result = run(source, &["https://a.example"], &settings, &mut seen).await;
        assert_eq!(result.items, vec!["v0", "v1"]);
        assert!(!result.has_more);
    }

    #[tokio::test]
    async fn test_language_filter() {
        let records = vec![video_in("fr1", "c", "fr")];
        let mut seen = SeenIdHistory::new(100);

        let en = settings(json!({ "preferredLanguages": ["en"] }));
        let source = FakeSource::default().with("https://a.example", records.clone());
        let result = run(source, &["https://a.example"], &en, &mut seen).await;
        assert!(result.is_empty());

        let any = settings(json!({ "preferredLanguages": [] }));
        let source = FakeSource::default().with("https://a.example", records);
        let result = run(source, &["https://a.example"], &any, &mut seen).await;
        assert_eq!(result.items, vec!["fr1"]);
    }

    #[tokio::test]
    async fn test_missing_language_always_passes() {
        let source = FakeSource::default().with(
            "https://a.example",
            vec![video("plain", "c"), video_in("en1", "c", "en-US")],
        );
        let settings = settings(json!({ "preferredLanguages": "en" }));
        let mut seen = SeenIdHistory::new(100);

        let result = run(source, &["https://a.example"], &settings, &mut seen).await;
        assert_eq!(result.items, vec!["plain", "en1"]);
    }

    #[tokio::test]
    async fn test_results_are_unique_and_in_host_order() {
        let source = FakeSource::default()
            .with("https://a.example", vec![video("x", "a"), video("y", "a")])
            .with("https://b.example", vec![video("y", "b"), video("z", "b")]);
        let settings = settings(json!({}));
        let mut seen = SeenIdHistory::new(100);

        let result = run(
            source,
            &["https://a.example", "https://b.example"],
            &settings,
            &mut seen,
        )
        .await;
        assert_eq!(result.items, vec!["x", "y", "z"]);
        assert_eq!(seen.iter().collect::<Vec<_>>(), vec!["z", "y", "x"]);
    }

    #[tokio::test]
    async fn test_rejected_copy_does_not_block_later_copy() {
        let source = FakeSource::default()
            .with("https://a.example", vec![video("p1", "solo"), video("shared", "solo")])
            .with("https://b.example", vec![video("shared", "other")]);
        let settings = settings(json!({ "maxPerChannel": 1 }));
        let mut seen = SeenIdHistory::new(100);

        let result = run(
            source,
            &["https://a.example", "https://b.example"],
            &settings,
            &mut seen,
        )
        .await;
        assert_eq!(result.items, vec!["p1", "shared"]);
    }

    #[tokio::test]
    async fn test_seen_ids_are_skipped() {
        let source = FakeSource::default()
            .with("https://a.example", vec![video("old", "a"), video("new", "a")]);
        let settings = settings(json!({}));
        let mut seen = SeenIdHistory::new(100);
        seen.push("old");

        let result = run(source, &["https://a.example"], &settings, &mut seen).await;
        assert_eq!(result.items, vec!["new"]);
    }

    #[tokio::test]
    async fn test_failed_host_does_not_abort_others() {
        let source = FakeSource::default().with("https://b.example", vec![video("b1", "b")]);
        let settings = settings(json!({}));
        let mut seen = SeenIdHistory::new(100);

        let result = run(
            source,
            &["https://down.example", "https://b.example"],
            &settings,
            &mut seen,
        )
        .await;
        assert_eq!(result.items, vec!["b1"]);
    }

    #[tokio::test]
    async fn test_page_size_caps_result() {
        let source = FakeSource::default().with(
            "https://a.example",
            (0..10).map(|i| video(&format!("v{i}"), &format!("c{i}"))).collect(),
        );
        let settings = settings(json!({}));
        let mut seen = SeenIdHistory::new(100);

        let hosts = vec!["https://a.example".to_string()];
        let result: AggregatedResult<String> = AggregationPipeline::new(Arc::new(source))
            .with_page_size(4)
            .aggregate(&hosts, &ListingQuery::home(20), &settings, &mut seen, &id_mapper)
            .await;
        assert_eq!(result.len(), 4);
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn test_mapper_called_once_per_accepted_item() {
        let source = FakeSource::default().with(
            "https://a.example",
            vec![video("a", "c"), video("a", "c"), video("b", "c")],
        );
        let settings = settings(json!({}));
        let mut seen = SeenIdHistory::new(100);
        let calls = Mutex::new(Vec::new());
        let mapper = |host: &str, record: &ListingRecord| {
            calls.lock().unwrap().push(format!("{host}/{}", record.id));
        };

        let hosts = vec!["https://a.example".to_string()];
        let result = AggregationPipeline::new(Arc::new(source))
            .aggregate(&hosts, &ListingQuery::home(20), &settings, &mut seen, &mapper)
            .await;
        assert_eq!(result.len(), 2);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["https://a.example/a", "https://a.example/b"]
        );
    }

    #[tokio::test]
    async fn test_all_hosts_failing_yields_empty_and_unhealthy() {
        let first = MockServer::start().await;
        let second = MockServer::start().await;
        for server in [&first, &second] {
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(500))
                .mount(server)
                .await;
        }

        let health = Arc::new(InstanceHealthCache::default());
        let fetcher = ListingFetcher::from_config(&HttpConfig::default(), health.clone()).unwrap();
        let hosts = vec![first.uri(), second.uri()];
        let settings = settings(json!({}));
        let mut seen = SeenIdHistory::new(100);

        let result = AggregationPipeline::new(Arc::new(fetcher))
            .aggregate(&hosts, &ListingQuery::home(20), &settings, &mut seen, &id_mapper)
            .await;

        assert!(result.is_empty());
        assert!(!result.has_more);
        assert!(health.is_unhealthy(&first.uri()));
        assert!(health.is_unhealthy(&second.uri()));
    }
}
