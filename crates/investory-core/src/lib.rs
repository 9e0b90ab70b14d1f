//! Session core for the Investory client.
//!
//! Attaches credentials to outgoing requests, detects expiry, refreshes the
//! session once for every request that noticed, replays the failed request,
//! and clears the session (raising a redirect signal) when refresh is
//! impossible.
//!
//! - [`auth::SessionStore`]: persisted authentication state
//! - [`api::Dispatcher`]: credential attachment and refresh-and-retry
//! - [`api::SessionService`]: exchanges with the authority
//! - [`SessionClient`]: the three wired together

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod models;

pub use api::{ApiError, ApiRequest, Dispatcher, ExpiryReason, SessionService, SessionSignal, Transport};
pub use auth::{FileStorage, KeyringStorage, MemoryStorage, Session, SessionStorage, SessionStore};
pub use client::SessionClient;
pub use config::{Config, StorageBackend};
