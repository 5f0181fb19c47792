//! Display mapping for accepted listing records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ListingRecord;

/// Turns one accepted record into whatever the caller renders.
///
/// Called exactly once per accepted record, with the host it came from.
pub trait ItemMapper<T> {
    fn map(&self, host: &str, record: &ListingRecord) -> T;
}

impl<T, F> ItemMapper<T> for F
where
    F: Fn(&str, &ListingRecord) -> T,
{
    fn map(&self, host: &str, record: &ListingRecord) -> T {
        self(host, record)
    }
}

/// Flat, serializable view of a video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayItem {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Host the record was fetched from
    pub host: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub duration_secs: u64,
    pub views: u64,
    pub published_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub is_live: bool,
}

/// Default [`ItemMapper`] producing [`DisplayItem`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayMapper;

impl ItemMapper<DisplayItem> for DisplayMapper {
    fn map(&self, host: &str, record: &ListingRecord) -> DisplayItem {
        let watch_id = record.short_id.as_deref().unwrap_or(&record.id);
        let url = record
            .url
            .clone()
            .unwrap_or_else(|| format!("{host}/w/{watch_id}"));

        DisplayItem {
            id: record.id.clone(),
            title: record.title.clone(),
            author: record.author_name.clone(),
            host: host.to_string(),
            url,
            thumbnail: record
                .thumbnail_path
                .as_deref()
                .map(|path| absolute(host, path)),
            duration_secs: record.duration_secs,
            views: record.views,
            published_at: record.published_at,
            language: record.language.as_ref().map(|lang| lang.id.clone()),
            is_live: record.is_live,
        }
    }
}

fn absolute(host: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}/{}", host.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
