//! Conversation memory
//!
//! A `Session` stores the input items of earlier runs so a later run can
//! continue the conversation. The runner prepends the stored history before
//! the first turn and appends the new turn once the run succeeds.

use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;

use crate::items::InputItem;

/// Persistent conversation history keyed by session id
#[async_trait]
pub trait Session: Send + Sync {
    fn session_id(&self) -> &str;

    /// Stored items in chronological order; `limit` keeps only the latest ones
    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<InputItem>>;

    async fn add_items(&self, items: &[InputItem]) -> Result<()>;

    /// Remove and return the most recent item
    async fn pop_item(&self) -> Result<Option<InputItem>>;

    async fn clear(&self) -> Result<()>;
}

/// Keep the newest `limit` items
pub(crate) fn tail(mut items: Vec<InputItem>, limit: Option<usize>) -> Vec<InputItem> {
    if let Some(limit) = limit {
        if items.len() > limit {
            items.drain(..items.len() - limit);
        }
    }
    items
}

/// Session held in process memory
#[derive(Debug, Default)]
pub struct MemorySession {
    session_id: String,
    items: Mutex<Vec<InputItem>>,
}

impl MemorySession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            items: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<InputItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Session for MemorySession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<InputItem>> {
        Ok(tail(self.lock().clone(), limit))
    }

    async fn add_items(&self, items: &[InputItem]) -> Result<()> {
        self.lock().extend_from_slice(items);
        Ok(())
    }

    async fn pop_item(&self) -> Result<Option<InputItem>> {
        Ok(self.lock().pop())
    }

    async fn clear(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
}
