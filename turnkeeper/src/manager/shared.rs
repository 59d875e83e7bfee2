//! Task-shareable handle around a [`MemoryManager`].

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::MemoryResult;
use crate::turn::{Role, Turn, TurnId, TurnOptions};

use super::{AppendResult, Diagnostics, MemoryManager};

/// Cloneable handle serializing mutations behind a `tokio` `RwLock`.
///
/// Each operation runs to completion under the lock, so concurrent callers
/// observe one mutation at a time. `get_context` takes the write lock because
/// it updates access tracking.
#[derive(Debug, Clone)]
pub struct SharedMemoryManager {
    inner: Arc<RwLock<MemoryManager>>,
}

impl SharedMemoryManager {
    /// Wrap `manager`.
    #[must_use]
    pub fn new(manager: MemoryManager) -> Self {
        Self {
            inner: Arc::new(RwLock::new(manager)),
        }
    }

    /// See [`MemoryManager::append`].
    ///
    /// # Errors
    /// As [`MemoryManager::append`].
    pub async fn append(
        &self,
        role: Role,
        content: impl Into<String>,
        options: TurnOptions,
    ) -> MemoryResult<AppendResult> {
        self.inner.write().await.append(role, content, options).await
    }

    /// See [`MemoryManager::get_context`].
    ///
    /// # Errors
    /// As [`MemoryManager::get_context`].
    pub async fn get_context(&self, target_tokens: Option<usize>) -> MemoryResult<Vec<Turn>> {
        self.inner.write().await.get_context(target_tokens)
    }

    /// See [`MemoryManager::pin`].
    ///
    /// # Errors
    /// As [`MemoryManager::pin`].
    pub async fn pin(&self, id: TurnId) -> MemoryResult<()> {
        self.inner.write().await.pin(id)
    }

    /// See [`MemoryManager::unpin`].
    ///
    /// # Errors
    /// As [`MemoryManager::unpin`].
    pub async fn unpin(&self, id: TurnId) -> MemoryResult<()> {
        self.inner.write().await.unpin(id)
    }

    /// See [`MemoryManager::remove`].
    ///
    /// # Errors
    /// As [`MemoryManager::remove`].
    pub async fn remove(&self, id: TurnId) -> MemoryResult<Turn> {
        self.inner.write().await.remove(id)
    }

    /// See [`MemoryManager::diagnostics`].
    pub async fn diagnostics(&self) -> Diagnostics {
        self.inner.read().await.diagnostics()
    }

    /// Tokens in the working set.
    pub async fn total_tokens(&self) -> usize {
        self.inner.read().await.total_tokens()
    }
}

impl From<MemoryManager> for SharedMemoryManager {
    fn from(manager: MemoryManager) -> Self {
        Self::new(manager)
    }
}
