//! Data types exchanged with the Investory authority.
//!
//! Wire formats are camelCase JSON, matching the authority's REST API.

pub mod auth;
pub mod user;

pub use auth::{Ack, AuthTokens, Availability, EmailVerificationTicket, RegisterRequest};
pub use user::{UserProfile, UserProfileUpdate};
