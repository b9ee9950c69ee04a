//! Session management for runs
//!
//! - `Session` - conversation history trait
//! - `MemorySession` - in-process history
//! - `FileSession` / `SessionStorage` - JSONL history on disk
//! - `SessionRegistry` - factories selected by a manifest's `persistent_store`

pub mod factory;
pub mod session;
pub mod storage;

pub use factory::{file_session_factory, SessionFactory, SessionRegistry};
pub use session::{MemorySession, Session};
pub use storage::{FileSession, SessionStorage, SESSIONS_DIR};
