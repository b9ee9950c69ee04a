//! Session factories keyed by store name

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use super::session::Session;
use super::storage::{FileSession, SessionStorage, SESSIONS_DIR};

/// Opens the session with the given id
pub type SessionFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn Session>> + Send + Sync>;

/// Factory for JSONL sessions under `dir`
pub fn file_session_factory(dir: impl Into<PathBuf>) -> SessionFactory {
    let storage = SessionStorage::with_dir(dir);
    Arc::new(move |session_id: &str| -> Result<Arc<dyn Session>> {
        Ok(Arc::new(FileSession::new(session_id, storage.clone())))
    })
}

/// Registered session stores
#[derive(Clone)]
pub struct SessionRegistry {
    factories: HashMap<String, SessionFactory>,
    default_store: String,
}

impl SessionRegistry {
    /// Empty registry whose default store is `sqlite`
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            default_store: "sqlite".to_string(),
        }
    }

    /// Registry with the local `sqlite` store backed by JSONL files
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("sqlite", file_session_factory(SESSIONS_DIR));
        registry
    }

    pub fn register(&mut self, store: impl Into<String>, factory: SessionFactory) -> &mut Self {
        self.factories.insert(store.into().to_lowercase(), factory);
        self
    }

    pub fn set_default_store(&mut self, store: impl Into<String>) -> &mut Self {
        self.default_store = store.into().to_lowercase();
        self
    }

    pub fn contains(&self, store: &str) -> bool {
        self.factories.contains_key(&store.trim().to_lowercase())
    }

    /// Factory for `store`; empty picks the default store
    pub fn resolve(&self, store: &str) -> Result<SessionFactory> {
        let mut store = store.trim().to_lowercase();
        if store.is_empty() {
            store = self.default_store.clone();
        }
        match self.factories.get(&store) {
            Some(factory) => Ok(factory.clone()),
            None if store == "sqlite" => Ok(file_session_factory(SESSIONS_DIR)),
            None => anyhow::bail!("persistent_store {:?} not registered", store),
        }
    }

    /// Open a session in `store`
    pub fn open(&self, store: &str, session_id: &str) -> Result<Arc<dyn Session>> {
        let factory = self.resolve(store)?;
        factory(session_id)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("stores", &self.factories.keys().collect::<Vec<_>>())
            .field("default_store", &self.default_store)
            .finish()
    }
}
