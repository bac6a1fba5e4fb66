//! folio: client for a photography portfolio API.
//!
//! Exposes the cache, API, config and slideshow modules so the binary and
//! other front ends share one implementation.

pub mod api;
pub mod cache;
pub mod config;
pub mod logging;
pub mod slideshow;
