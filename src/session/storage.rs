//! File-backed sessions
//!
//! Each session lives in its own directory holding a `history.jsonl` file,
//! one serialized input item per line.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::session::{tail, Session};
use crate::core::WorkflowResult;
use crate::items::InputItem;

/// Default directory for session storage
pub const SESSIONS_DIR: &str = "workflowrunner_sessions";

/// Session storage manager
#[derive(Debug, Clone)]
pub struct SessionStorage {
    base_dir: PathBuf,
}

impl SessionStorage {
    /// Create a new session storage with the default directory
    pub fn new() -> Self {
        Self {
            base_dir: PathBuf::from(SESSIONS_DIR),
        }
    }

    /// Create a new session storage with a custom directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the directory path for a session
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(sanitize(session_id))
    }

    /// Get the history file path for a session
    pub fn history_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("history.jsonl")
    }

    /// Create the session directory if it doesn't exist
    pub fn ensure_session_dir(&self, session_id: &str) -> WorkflowResult<PathBuf> {
        let dir = self.session_dir(session_id);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Append items to the history file
    pub fn append_items(&self, session_id: &str, items: &[InputItem]) -> WorkflowResult<()> {
        self.ensure_session_dir(session_id)?;
        let path = self.history_path(session_id);

        let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        for item in items {
            let json = serde_json::to_string(item)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Load all items from the history file
    pub fn load_items(&self, session_id: &str) -> WorkflowResult<Vec<InputItem>> {
        let path = self.history_path(session_id);

        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let mut items = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            items.push(serde_json::from_str(&line)?);
        }

        Ok(items)
    }

    /// Save all items (overwrites existing history)
    pub fn save_items(&self, session_id: &str, items: &[InputItem]) -> WorkflowResult<()> {
        self.ensure_session_dir(session_id)?;
        let path = self.history_path(session_id);

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);
        for item in items {
            let json = serde_json::to_string(item)?;
            writeln!(writer, "{}", json)?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Remove a session's directory
    pub fn delete_session(&self, session_id: &str) -> WorkflowResult<()> {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

impl Default for SessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep session ids from escaping the storage directory
fn sanitize(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Session persisted as JSONL under a storage directory
#[derive(Debug)]
pub struct FileSession {
    session_id: String,
    storage: SessionStorage,
    // Serializes read-modify-write cycles on the history file
    lock: Mutex<()>,
}

impl FileSession {
    pub fn new(session_id: impl Into<String>, storage: SessionStorage) -> Self {
        Self {
            session_id: session_id.into(),
            storage,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Session for FileSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn get_items(&self, limit: Option<usize>) -> Result<Vec<InputItem>> {
        let _guard = self.lock.lock().await;
        Ok(tail(self.storage.load_items(&self.session_id)?, limit))
    }

    async fn add_items(&self, items: &[InputItem]) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.storage.append_items(&self.session_id, items)?;
        tracing::debug!(session_id = %self.session_id, count = items.len(), "[FileSession] Appended items");
        Ok(())
    }

    async fn pop_item(&self) -> Result<Option<InputItem>> {
        let _guard = self.lock.lock().await;
        let mut items = self.storage.load_items(&self.session_id)?;
        let popped = items.pop();
        if popped.is_some() {
            self.storage.save_items(&self.session_id, &items)?;
        }
        Ok(popped)
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.storage.delete_session(&self.session_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::Message;
    use tempfile::TempDir;

    #[test]
    fn test_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = SessionStorage::with_dir(dir.path());

        storage
            .append_items("s1", &[InputItem::user("hello")])
            .unwrap();
        storage
            .append_items("s1", &[InputItem::Message(Message::assistant("m1", "hi"))])
            .unwrap();

        let items = storage.load_items("s1").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], InputItem::user("hello"));
        assert!(storage.load_items("missing").unwrap().is_empty());
    }

    #[test]
    fn test_session_ids_are_sanitized() {
        let storage = SessionStorage::with_dir("/tmp/sessions");
        assert_eq!(
            storage.session_dir("../etc/passwd"),
            PathBuf::from("/tmp/sessions/___etc_passwd")
        );
    }

    #[tokio::test]
    async fn test_file_session() {
        let dir = TempDir::new().unwrap();
        let session = FileSession::new("chat-1", SessionStorage::with_dir(dir.path()));

        session
            .add_items(&[InputItem::user("a"), InputItem::user("b"), InputItem::user("c")])
            .await
            .unwrap();
        assert_eq!(session.get_items(Some(1)).await.unwrap(), vec![InputItem::user("c")]);

        assert_eq!(session.pop_item().await.unwrap(), Some(InputItem::user("c")));
        assert_eq!(session.get_items(None).await.unwrap().len(), 2);

        session.clear().await.unwrap();
        assert!(session.get_items(None).await.unwrap().is_empty());
        assert!(!dir.path().join("chat-1").exists());
    }
}
