//! API Middleware
//!
//! Middleware layers for admin authorization.

pub mod auth;

pub use auth::{require_admin_secret, AdminSecret, ADMIN_SECRET_HEADER};
