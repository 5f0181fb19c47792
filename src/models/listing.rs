//! Listing records as returned by one instance, and the query sent to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One video as listed by an instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRecord {
    /// Stable identifier (uuid when present)
    pub id: String,

    /// Short identifier used in `/w/` links
    pub short_id: Option<String>,

    pub title: String,

    /// `channel@host`, used for the per-channel quota
    pub author_key: String,

    /// Channel display name
    pub author_name: String,

    pub published_at: Option<DateTime<Utc>>,

    pub language: Option<Language>,

    pub is_live: bool,

    pub duration_secs: u64,

    pub views: u64,

    pub thumbnail_path: Option<String>,

    /// Canonical URL on the origin instance
    pub url: Option<String>,

    /// Original JSON object, for the display mapping
    #[serde(skip)]
    pub raw: Value,
}

/// Language metadata attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Language {
    pub id: String,
    pub label: Option<String>,
}

impl Language {
    /// Lowercased strings a preferred tag is matched against.
    pub fn candidates(&self) -> Vec<String> {
        std::iter::once(self.id.as_str())
            .chain(self.label.as_deref())
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    }
}

impl ListingRecord {
    /// Build a record from one element of a listing's `data` array.
    ///
    /// Returns `None` when the element has no usable identifier.
    pub fn from_value(value: Value) -> Option<Self> {
        let wire: WireVideo = match serde_json::from_value(value.clone()) {
            Ok(wire) => wire,
            Err(e) => {
                log::debug!("Skipping unparsable listing entry: {e}");
                return None;
            }
        };

        let id = non_empty(wire.uuid)
            .or_else(|| non_empty(wire.short_uuid.clone()))
            .or_else(|| wire.id.as_ref().and_then(value_to_id))?;

        let author = wire.channel.as_ref().or(wire.account.as_ref());
        let author_key = author.map(Actor::key).unwrap_or_default();
        let author_name = author.map(Actor::display).unwrap_or_default();

        let language = wire.language.and_then(|lang| {
            non_empty(lang.id).map(|id| Language {
                id,
                label: non_empty(lang.label),
            })
        });

        let published_at = wire
            .published_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Some(Self {
            id,
            short_id: non_empty(wire.short_uuid),
            title: wire.name.unwrap_or_default().trim().to_string(),
            author_key,
            author_name,
            published_at,
            language,
            is_live: wire.is_live.unwrap_or(false),
            duration_secs: wire.duration.unwrap_or(0),
            views: wire.views.unwrap_or(0),
            thumbnail_path: non_empty(wire.thumbnail_path),
            url: non_empty(wire.url),
            raw: value,
        })
    }
}

/// One page of records from a single instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    pub records: Vec<ListingRecord>,
    /// Total reported by the instance
    pub total: u64,
    /// More records exist past `start + count`
    pub has_more: bool,
}

impl ListingPage {
    /// Parse a `{ "total": n, "data": [...] }` payload.
    pub fn parse(body: &str, query: &ListingQuery) -> serde_json::Result<Self> {
        let wire: WirePage = serde_json::from_str(body)?;
        let total = wire.total.unwrap_or(wire.data.len() as u64);
        let received = wire.data.len();

        let records: Vec<ListingRecord> = wire
            .data
            .into_iter()
            .filter_map(ListingRecord::from_value)
            .collect();

        if records.len() < received {
            log::debug!(
                "Dropped {} of {} listing entries without an identifier",
                received - records.len(),
                received
            );
        }

        Ok(Self {
            records,
            total,
            has_more: total > (query.start + query.count) as u64,
        })
    }
}

/// What to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingKind {
    /// Recent videos
    Home,
    /// Full-text search
    Search(String),
}

/// Query sent to every selected instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub kind: ListingKind,
    pub start: usize,
    pub count: usize,
    pub sort: String,
    /// Sent as repeated `languageOneOf`
    pub languages: Vec<String>,
    pub is_live: Option<bool>,
    pub nsfw: Option<String>,
}

impl ListingQuery {
    pub fn home(count: usize) -> Self {
        Self {
            kind: ListingKind::Home,
            start: 0,
            count,
            sort: "-publishedAt".to_string(),
            languages: Vec::new(),
            is_live: None,
            nsfw: None,
        }
    }

    pub fn search(text: impl Into<String>, count: usize) -> Self {
        Self {
            kind: ListingKind::Search(text.into()),
            ..Self::home(count)
        }
    }

    /// API path relative to the instance root.
    pub fn path(&self) -> &'static str {
        match self.kind {
            ListingKind::Home => "/api/v1/videos",
            ListingKind::Search(_) => "/api/v1/search/videos",
        }
    }

    /// Query-string parameters, in a stable order.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("start", self.start.to_string()),
            ("count", self.count.to_string()),
            ("sort", self.sort.clone()),
        ];
        if let ListingKind::Search(text) = &self.kind {
            params.push(("search", text.clone()));
        }
        for lang in &self.languages {
            params.push(("languageOneOf", lang.clone()));
        }
        if let Some(is_live) = self.is_live {
            params.push(("isLive", is_live.to_string()));
        }
        if let Some(nsfw) = &self.nsfw {
            params.push(("nsfw", nsfw.clone()));
        }
        params
    }
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult<T> {
    pub items: Vec<T>,
    /// Always false: aggregation re-samples on every request
    pub has_more: bool,
}

impl<T> AggregatedResult<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            has_more: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// --- Wire format ---

#[derive(Debug, Deserialize)]
struct WirePage {
    #[serde(default)]
    total: Option<u64>,
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVideo {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default, rename = "shortUUID")]
    short_uuid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    language: Option<WireLanguage>,
    #[serde(default)]
    is_live: Option<bool>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    views: Option<u64>,
    #[serde(default)]
    thumbnail_path: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    channel: Option<Actor>,
    #[serde(default)]
    account: Option<Actor>,
}

#[derive(Debug, Deserialize)]
struct WireLanguage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Actor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    host: Option<String>,
}

impl Actor {
    fn key(&self) -> String {
        match (self.name.as_deref(), self.host.as_deref()) {
            (Some(name), Some(host)) => format!("{name}@{host}").to_lowercase(),
            (Some(name), None) => name.to_lowercase(),
            _ => String::new(),
        }
    }

    fn display(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_default()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => non_empty(Some(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn video(uuid: &str) -> Value {
        json!({
            "id": 17,
            "uuid": uuid,
            "shortUUID": "s-".to_string() + uuid,
            "name": "  A video ",
            "publishedAt": "2026-02-01T10:00:00.000Z",
            "language": { "id": "en", "label": "English" },
            "isLive": false,
            "duration": 93,
            "views": 4,
            "thumbnailPath": "/static/thumbnails/x.jpg",
            "url": "https://origin.example/videos/watch/abc",
            "channel": { "name": "Chan", "displayName": "The Channel", "host": "Origin.Example" },
            "account": { "name": "acct", "host": "origin.example" }
        })
    }

    #[test]
    fn test_record_from_full_entry() {
        let record = ListingRecord::from_value(video("abc")).unwrap();
        assert_eq!(record.id, "abc");
        assert_eq!(record.short_id.as_deref(), Some("s-abc"));
        assert_eq!(record.title, "A video");
        assert_eq!(record.author_key, "chan@origin.example");
        assert_eq!(record.author_name, "The Channel");
        assert_eq!(record.duration_secs, 93);
        assert!(record.published_at.is_some());
        assert_eq!(
            record.language.unwrap().candidates(),
            vec!["en".to_string(), "english".to_string()]
        );
    }

    #[test]
    fn test_record_falls_back_to_numeric_id_and_account() {
        let record = ListingRecord::from_value(json!({
            "id": 42,
            "name": "x",
            "account": { "name": "Someone", "host": "h.example" }
        }))
        .unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.author_key, "someone@h.example");
        assert!(record.language.is_none());
    }

    #[test]
    fn test_unknown_language_is_no_metadata() {
        let record = ListingRecord::from_value(json!({
            "uuid": "u1",
            "language": { "id": null, "label": "Unknown" }
        }))
        .unwrap();
        assert!(record.language.is_none());
    }

    #[test]
    fn test_record_without_id_is_skipped() {
        assert!(ListingRecord::from_value(json!({ "name": "no id" })).is_none());
        assert!(ListingRecord::from_value(json!("not an object")).is_none());
    }

    #[test]
    fn test_page_has_more_from_total() {
        let query = ListingQuery::home(2);
        let body = json!({ "total": 10, "data": [video("a"), video("b")] }).to_string();
        let page = ListingPage::parse(&body, &query).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total, 10);
        assert!(page.has_more);

        let body = json!({ "total": 2, "data": [video("a"), video("b")] }).to_string();
        assert!(!ListingPage::parse(&body, &query).unwrap().has_more);
    }

    #[test]
    fn test_page_requires_data_array() {
        let query = ListingQuery::home(2);
        assert!(ListingPage::parse(r#"{"total": 3}"#, &query).is_err());
        assert!(ListingPage::parse("<html></html>", &query).is_err());
    }

    #[test]
    fn test_search_params() {
        let mut query = ListingQuery::search("rust talks", 10);
        query.languages = vec!["en".into(), "fr".into()];
        query.nsfw = Some("false".into());

        assert_eq!(query.path(), "/api/v1/search/videos");
        assert_eq!(
            query.params(),
            vec![
                ("start", "0".to_string()),
                ("count", "10".to_string()),
                ("sort", "-publishedAt".to_string()),
                ("search", "rust talks".to_string()),
                ("languageOneOf", "en".to_string()),
                ("languageOneOf", "fr".to_string()),
                ("nsfw", "false".to_string()),
            ]
        );
    }
}
