//! Carbon Portal: typed clients and workflows for the carbon-credit
//! marketplace backends.
//!
//! The `carbon-portal` binary is a thin console over this crate; integration
//! tests in `tests/` drive it against mock backends.

pub mod auth;
pub mod client;
pub mod config;
pub mod debounce;
pub mod errors;
pub mod intent;
pub mod marketplace;
pub mod models;
pub mod review;
