//! HTTP route handlers.
//!
//! Each sub-module corresponds to an API endpoint group. All handlers except
//! [`health::healthz`] require authentication via [`crate::auth::require_bearer`].

pub mod engines;
pub mod health;
pub mod sessions;
pub mod ws_ticket;
