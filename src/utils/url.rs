// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Normalize a user-supplied instance address to `scheme://host[:port]`.
///
/// Missing schemes default to `https://`. Paths, queries and trailing slashes
/// are dropped. Returns `None` for anything that does not parse as an
/// `http`/`https` URL with a host.
///
/// # Examples
/// ```
/// use fedtube::utils::url::normalize_host;
///
/// assert_eq!(
///     normalize_host(" Tube.Example.org/ "),
///     Some("https://tube.example.org".to_string())
/// );
/// assert_eq!(normalize_host("ftp://tube.example.org"), None);
/// ```
pub fn normalize_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str().filter(|h| !h.is_empty())?;

    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// Join an instance root and an API path.
pub fn endpoint(host: &str, path: &str) -> String {
    format!(
        "{}/{}",
        host.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Extract the instance and video identifier from a watch URL.
///
/// Recognizes `/w/{id}`, `/videos/watch/{id}`, `/videos/embed/{id}` and
/// `/api/v1/videos/{id}`. Playlist links (`/w/p/{id}`) are not videos.
pub fn extract_video_id(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = normalize_host(url)?;
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();

    let id = match segments.as_slice() {
        ["w", "p", ..] => None,
        ["w", id, ..] => Some(*id),
        ["videos", "watch", "playlist", ..] => None,
        ["videos", "watch", id, ..] | ["videos", "embed", id, ..] => Some(*id),
        ["api", "v1", "videos", id, ..] => Some(*id),
        _ => None,
    }?;

    let valid = id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then(|| (host, id.to_string()))
}
