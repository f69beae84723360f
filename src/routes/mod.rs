//! HTTP route handlers for resources that require an authenticated caller.
//!
//! Authentication endpoints themselves live in [`crate::auth::routes`].

pub mod users;
