//! Persistence of state between invocations.
//!
//! [`PersistedState`] decides what the blob contains; a [`StateStorage`]
//! backend decides where the blob lives.

pub mod local;
pub mod state;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use local::{LocalStateStorage, decode_lossy};
pub use state::PersistedState;

/// Trait for state blob backends.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Load the stored blob, `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<String>>;

    /// Replace the stored blob.
    async fn save(&self, blob: &str) -> Result<()>;
}
