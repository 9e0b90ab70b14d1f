//! REST client layer for the Investory authority.
//!
//! This module provides:
//! - `Transport`: raw HTTP exchange with a fixed per-call timeout
//! - `Dispatcher`: bearer attachment and the refresh-and-retry protocol
//! - `SessionService`: sign-in, sign-out, registration, refresh and the
//!   verification/recovery/profile exchanges
//!
//! The authority issues short-lived JWT access tokens and longer-lived
//! refresh tokens; responses are wrapped in a `{success, message, data}`
//! envelope.

pub mod dispatcher;
pub mod error;
pub mod request;
pub mod service;
pub mod transport;

pub use dispatcher::{Dispatcher, ExpiryReason, SessionSignal};
pub use error::{ApiError, FieldError};
pub use request::ApiRequest;
pub use service::SessionService;
pub use transport::Transport;
