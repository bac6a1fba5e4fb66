//! Cache key namespaces.

use std::fmt;

/// Key holding the bearer token. Never a cache entry; survives cache clears.
pub const TOKEN_KEY: &str = "token";

/// Cache namespaces for portfolio API reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
  /// Full category/project collection
  Categories,
  /// Single item detail
  Item(u64),
  /// One project with its image items
  Project(u64),
  /// Images belonging to the "home" project
  HomeImages,
  /// Category list for the upload form
  UploadCategories,
}

impl CacheKey {
  /// Namespaces a new project can show up in.
  pub const COLLECTIONS: [CacheKey; 3] = [
    CacheKey::Categories,
    CacheKey::UploadCategories,
    CacheKey::HomeImages,
  ];

  pub fn description(&self) -> String {
    match self {
      Self::Categories => "all categories".to_string(),
      Self::Item(id) => format!("item #{}", id),
      Self::Project(id) => format!("project #{}", id),
      Self::HomeImages => "home images".to_string(),
      Self::UploadCategories => "upload form categories".to_string(),
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Categories => write!(f, "categories_cache"),
      Self::Item(id) => write!(f, "item_cache_{}", id),
      Self::Project(id) => write!(f, "project_cache_{}", id),
      Self::HomeImages => write!(f, "home_images_cache"),
      Self::UploadCategories => write!(f, "upload_categories_cache"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_patterns() {
    assert_eq!(CacheKey::Categories.to_string(), "categories_cache");
    assert_eq!(CacheKey::Item(42).to_string(), "item_cache_42");
    assert_eq!(CacheKey::Project(5).to_string(), "project_cache_5");
    assert_eq!(CacheKey::HomeImages.to_string(), "home_images_cache");
    assert_eq!(
      CacheKey::UploadCategories.to_string(),
      "upload_categories_cache"
    );
  }

  #[test]
  fn test_token_key_is_not_a_namespace() {
    let keys = [
      CacheKey::Categories,
      CacheKey::Item(1),
      CacheKey::Project(1),
      CacheKey::HomeImages,
      CacheKey::UploadCategories,
    ];
    assert!(keys.iter().all(|k| k.to_string() != TOKEN_KEY));
  }
}
