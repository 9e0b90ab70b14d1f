//! Authentication state for the client.
//!
//! This module provides:
//! - `Session`: the authenticated identity and credential pair
//! - `SessionStore`: the single, persisted source of truth for the session
//! - `SessionStorage` backends: JSON file, OS keychain, and in-memory
//!
//! The store is rehydrated once at startup and written through on every
//! mutation.

pub mod session;
pub mod storage;

pub use session::{Session, SessionStore};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, SessionStorage};
