//! User settings and their normalization.
//!
//! The host application hands over settings of no fixed shape: a field may be
//! a native JSON value, a comma-separated string, or an object wrapping the
//! real value under `value`. Everything is resolved into [`RawSetting`] once,
//! at this boundary, and then into the strict [`Settings`] record. Nothing in
//! here fails; malformed input falls back to the field default.

use indexmap::IndexSet;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::utils::url::normalize_host;

/// Instance used when the user configured none that parse.
pub const DEFAULT_INSTANCE: &str = "https://peertube.futo.org";

/// Upper bound for the seen-history capacity.
pub const SEEN_MAX_LIMIT: usize = 10_000;

/// Canonical, validated user settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Instance roots (`scheme://host[:port]`), unique, in first-seen order
    pub instances: IndexSet<String>,

    /// Shuffle candidates before sampling
    pub randomize: bool,

    /// Number of instances fetched per request (>= 1)
    pub sample_size: usize,

    /// Items allowed per channel in one result page (>= 1)
    pub max_per_channel: usize,

    /// Lowercase language tags; empty disables filtering
    pub preferred_languages: IndexSet<String>,

    /// Capacity of the seen-history
    pub seen_max: usize,

    /// Report views back to instances
    pub submit_activity: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instances: IndexSet::from([DEFAULT_INSTANCE.to_string()]),
            randomize: defaults::RANDOMIZE,
            sample_size: defaults::SAMPLE_SIZE,
            max_per_channel: defaults::MAX_PER_CHANNEL,
            preferred_languages: IndexSet::new(),
            seen_max: defaults::SEEN_MAX,
            submit_activity: defaults::SUBMIT_ACTIVITY,
        }
    }
}

impl Settings {
    /// Build settings from raw host input. Never fails.
    pub fn normalize(raw: &Value) -> Self {
        match raw {
            Value::Object(map) => Self::from_map(map),
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => Self::from_map(&map),
                _ => {
                    log::debug!("settings: top-level string is not a JSON object, using defaults");
                    Self::default()
                }
            },
            Value::Null => Self::default(),
            other => {
                log::debug!("settings: unexpected top-level shape {other}, using defaults");
                Self::default()
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let field = |names: &[&str]| -> RawSetting {
            names
                .iter()
                .find_map(|name| map.get(*name))
                .map(RawSetting::from)
                .unwrap_or(RawSetting::Missing)
        };

        let instances = normalize_instances(&field(&["instances", "instanceList", "instance_list"]));
        let preferred_languages =
            normalize_languages(&field(&["preferredLanguages", "preferred_languages", "languages"]));

        Self {
            instances,
            randomize: resolve_bool(
                "randomize",
                &field(&["randomize", "randomizeInstances", "randomize_instances"]),
                defaults::RANDOMIZE,
            ),
            sample_size: resolve_count(
                "sampleSize",
                &field(&["sampleSize", "sample_size"]),
                1,
                defaults::SAMPLE_SIZE,
            ),
            max_per_channel: resolve_count(
                "maxPerChannel",
                &field(&["maxPerChannel", "max_per_channel"]),
                1,
                defaults::MAX_PER_CHANNEL,
            ),
            preferred_languages,
            seen_max: resolve_count(
                "seenMax",
                &field(&["seenMax", "seen_max"]),
                0,
                defaults::SEEN_MAX,
            )
            .min(SEEN_MAX_LIMIT),
            submit_activity: resolve_bool(
                "submitActivity",
                &field(&["submitActivity", "submit_activity"]),
                defaults::SUBMIT_ACTIVITY,
            ),
        }
    }
}

/// One settings field before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSetting {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<RawSetting>),
    /// An object carrying the real value under `value`
    Wrapped(Box<RawSetting>),
    /// Absent or `null`
    Missing,
    /// Any other object
    Other,
}

impl From<&Value> for RawSetting {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map_or(Self::Other, Self::Float),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from).collect()),
            Value::Object(map) => match map.get("value") {
                Some(inner) => Self::Wrapped(Box::new(Self::from(inner))),
                None => Self::Other,
            },
        }
    }
}

impl RawSetting {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            Self::Wrapped(inner) => inner.as_bool(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Wrapped(inner) => inner.as_int(),
            _ => None,
        }
    }

    /// Flatten into string items. `None` when the shape is not list-like.
    pub fn as_list(&self) -> Option<Vec<String>> {
        match self {
            Self::Text(s) => Some(split_delimited(s)),
            Self::List(items) => Some(
                items
                    .iter()
                    .filter_map(RawSetting::as_list)
                    .flatten()
                    .collect(),
            ),
            Self::Wrapped(inner) => inner.as_list(),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

fn split_delimited(s: &str) -> Vec<String> {
    let trimmed = s.trim();
    if trimmed.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
            return RawSetting::List(items.iter().map(RawSetting::from).collect())
                .as_list()
                .unwrap_or_default();
        }
    }
    trimmed
        .split([',', '\n'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_bool(name: &str, raw: &RawSetting, default: bool) -> bool {
    if raw.is_missing() {
        return default;
    }
    raw.as_bool().unwrap_or_else(|| {
        log::debug!("settings: {name} is malformed ({raw:?}), using {default}");
        default
    })
}

fn resolve_count(name: &str, raw: &RawSetting, min: i64, default: usize) -> usize {
    if raw.is_missing() {
        return default;
    }
    raw.as_int()
        .filter(|v| *v >= min)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or_else(|| {
            log::debug!("settings: {name} is malformed or below {min} ({raw:?}), using {default}");
            default
        })
}

fn normalize_instances(raw: &RawSetting) -> IndexSet<String> {
    let mut instances = IndexSet::new();
    for candidate in raw.as_list().unwrap_or_default() {
        match normalize_host(&candidate) {
            Some(host) => {
                instances.insert(host);
            }
            None => log::debug!("settings: dropping invalid instance {candidate:?}"),
        }
    }

    if instances.is_empty() {
        instances.insert(DEFAULT_INSTANCE.to_string());
    }
    instances
}

fn normalize_languages(raw: &RawSetting) -> IndexSet<String> {
    raw.as_list()
        .unwrap_or_default()
        .into_iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

mod defaults {
    pub const RANDOMIZE: bool = false;
    pub const SAMPLE_SIZE: usize = 3;
    pub const MAX_PER_CHANNEL: usize = 3;
    pub const SEEN_MAX: usize = 500;
    pub const SUBMIT_ACTIVITY: bool = false;
}
