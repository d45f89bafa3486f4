//! HTTP/WS front door for the quiz backend. Split into a thin `lib.rs` so
//! `tests/` can drive the real [`router::build`] output with
//! `tower::ServiceExt` instead of mirror types, the way `stupid-server`'s own
//! `villa_suggest_integration.rs` has to fall back to mirror types only
//! because that crate has no lib target to import from.

pub mod admin;
pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod router;
pub mod state;
pub mod startup;
pub mod ws;
