use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::warn;

use crate::api::error::ApiError;
use crate::cache::{KeyValueStore, TOKEN_KEY};

/// Bearer token kept as a raw string under [`TOKEN_KEY`] in the cache store.
pub struct Session<S: KeyValueStore> {
  storage: Arc<S>,
}

impl<S: KeyValueStore> Session<S> {
  pub fn new(storage: Arc<S>) -> Self {
    Self { storage }
  }

  /// The stored token, if any. Store errors read as "logged out".
  pub fn token(&self) -> Option<String> {
    match self.storage.get(TOKEN_KEY) {
      Ok(token) => token.filter(|t| !t.is_empty()),
      Err(e) => {
        warn!(error = %e, "Failed to read session token");
        None
      }
    }
  }

  pub fn require_token(&self) -> Result<String, ApiError> {
    self.token().ok_or(ApiError::MissingToken)
  }

  /// Persist a token. Unlike cache writes this must not fail silently.
  pub fn store_token(&self, token: &str) -> Result<()> {
    self
      .storage
      .set(TOKEN_KEY, token)
      .map_err(|e| eyre!("Failed to save session token: {}", e))
  }

  pub fn clear(&self) -> Result<()> {
    self
      .storage
      .remove(TOKEN_KEY)
      .map_err(|e| eyre!("Failed to remove session token: {}", e))
  }
}

impl<S: KeyValueStore> Clone for Session<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}
