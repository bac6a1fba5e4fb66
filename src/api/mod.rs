//! Portfolio REST API: raw client, session token, and the cached client built on both.

pub mod cached_client;
pub mod client;
pub mod error;
pub mod session;
pub mod types;

pub use cached_client::CachedPortfolioClient;
pub use client::PortfolioClient;
pub use error::ApiError;
pub use session::Session;
pub use types::{Item, ItemUpdate, NewItem, Project};
