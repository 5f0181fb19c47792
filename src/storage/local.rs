//! Local filesystem storage for the state blob.
//!
//! Writes go to a sibling `.tmp` file which is then renamed over the target,
//! so a crash mid-write leaves the previous blob intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::StateStorage;
use crate::utils::RetryPolicy;

/// State blob kept in a single file.
#[derive(Debug, Clone)]
pub struct LocalStateStorage {
    path: PathBuf,
    retry: RetryPolicy,
}

impl LocalStateStorage {
    /// Create a storage backed by `path`. Reads are attempted once.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry: RetryPolicy::none(),
        }
    }

    /// Retry failed reads with `retry`.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Read the file, returning None if it doesn't exist.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the blob decoder
    /// treats the result as corrupt state.
    async fn read_text(&self) -> Result<Option<String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(decode_lossy(bytes, &self.path))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl StateStorage for LocalStateStorage {
    async fn load(&self) -> Result<Option<String>> {
        let label = format!("read {}", self.path.display());
        let blob = self.retry.run(&label, || self.read_text()).await?;
        if blob.is_none() {
            log::debug!("No state file at {:?}", self.path);
        }
        Ok(blob)
    }

    async fn save(&self, blob: &str) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(blob.as_bytes()).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        log::debug!("Saved {} byte(s) of state to {:?}", blob.len(), self.path);
        Ok(())
    }
}

/// Turn file bytes into text, replacing invalid UTF-8.
pub fn decode_lossy(bytes: Vec<u8>, path: &Path) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| {
        log::warn!("{:?} is not valid UTF-8, reading it lossily", path);
        String::from_utf8_lossy(e.as_bytes()).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PersistedState;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStateStorage::new(tmp.path().join("state.json"));

        storage.save(r#"{"seenIds":["a"]}"#).await.unwrap();
        let blob = storage.load().await.unwrap();
        assert_eq!(blob.as_deref(), Some(r#"{"seenIds":["a"]}"#));
        assert!(!tmp.path().join("state.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStateStorage::new(tmp.path().join("missing.json"));
        assert!(storage.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs_and_overwrites() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStateStorage::new(tmp.path().join("nested/dir/state.json"));

        storage.save("first").await.unwrap();
        storage.save("second").await.unwrap();
        assert_eq!(storage.load().await.unwrap().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_loads_as_fresh_state() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        tokio::fs::write(&path, [0xff, 0xfe, 0x7b, 0x7d]).await.unwrap();

        let blob = LocalStateStorage::new(&path).load().await.unwrap();
        assert!(blob.is_some());

        let state = PersistedState::load(blob.as_deref(), 10, chrono::Utc::now());
        assert_eq!(state, PersistedState::load(None, 10, chrono::Utc::now()));
    }

    #[tokio::test]
    async fn test_read_error_is_retried_then_reported() {
        let tmp = TempDir::new().unwrap();
        // A directory cannot be read as a file.
        let storage = LocalStateStorage::new(tmp.path()).with_retry(RetryPolicy::new(
            2,
            Duration::from_millis(1),
            Duration::from_millis(1),
        ));
        assert!(matches!(storage.load().await, Err(AppError::Io(_))));
    }
}
