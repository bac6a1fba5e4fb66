//! Cached portfolio client that wraps PortfolioClient with transparent caching.

use chrono::Duration;
use color_eyre::{Report, Result};
use tracing::info;

use crate::cache::{CacheKey, CacheLayer, CacheResult, KeyValueStore, SqliteStore, TOKEN_KEY};
use crate::config::Config;

use super::client::PortfolioClient;
use super::error::ApiError;
use super::session::Session;
use super::types::{find_home, sort_home_first, Item, ItemUpdate, NewItem, Project};

/// Portfolio client with transparent caching support.
///
/// Reads go through the cache layer and fall back to stale data when the
/// network fails. Every successful mutation invalidates the namespaces that
/// could hold a stale view of what it changed, before returning. A failed
/// mutation leaves the cache untouched.
pub struct CachedPortfolioClient<S: KeyValueStore> {
  inner: PortfolioClient,
  cache: CacheLayer<S>,
  session: Session<S>,
}

impl CachedPortfolioClient<SqliteStore> {
  /// Create a client backed by the on-disk cache.
  pub fn new(config: &Config) -> Result<Self> {
    let inner = PortfolioClient::new(&config.api)?;

    let storage = match &config.cache.path {
      Some(path) => SqliteStore::open_at(path)?,
      None => SqliteStore::open()?,
    }
    .with_quota(config.cache.max_bytes);

    let ttl = Duration::seconds(config.cache.ttl_secs.min(u64::from(u32::MAX)) as i64);
    let cache = CacheLayer::new(storage).with_ttl(ttl);

    Ok(Self::with_cache(inner, cache))
  }
}

impl<S: KeyValueStore> CachedPortfolioClient<S> {
  pub fn with_cache(inner: PortfolioClient, cache: CacheLayer<S>) -> Self {
    let session = Session::new(cache.storage());
    Self {
      inner,
      cache,
      session,
    }
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  pub fn session(&self) -> &Session<S> {
    &self.session
  }

  // ==========================================================================
  // Reads
  // ==========================================================================

  /// All projects, with the home project first.
  pub async fn categories(&self) -> Result<CacheResult<Vec<Project>>> {
    let result = self
      .cache
      .fetch_with_cache(&CacheKey::Categories.to_string(), || {
        let inner = self.inner.clone();
        async move { inner.list_projects().await.map_err(Report::from) }
      })
      .await?;

    Ok(result.map(|mut projects| {
      sort_home_first(&mut projects);
      projects
    }))
  }

  /// Projects offered as upload targets.
  pub async fn upload_categories(&self) -> Result<CacheResult<Vec<Project>>> {
    self
      .cache
      .fetch_with_cache(&CacheKey::UploadCategories.to_string(), || {
        let inner = self.inner.clone();
        async move { inner.list_projects().await.map_err(Report::from) }
      })
      .await
  }

  /// A single project with its images.
  pub async fn project(&self, id: u64) -> Result<CacheResult<Project>> {
    self
      .cache
      .fetch_with_cache(&CacheKey::Project(id).to_string(), || {
        let inner = self.inner.clone();
        async move { inner.get_project(id).await.map_err(Report::from) }
      })
      .await
  }

  /// A single image.
  pub async fn item(&self, id: u64) -> Result<CacheResult<Item>> {
    self
      .cache
      .fetch_with_cache(&CacheKey::Item(id).to_string(), || {
        let inner = self.inner.clone();
        async move { inner.get_item(id).await.map_err(Report::from) }
      })
      .await
  }

  /// Images of the project named "home".
  pub async fn home_images(&self) -> Result<CacheResult<Vec<Item>>> {
    self
      .cache
      .fetch_with_cache(&CacheKey::HomeImages.to_string(), || {
        let inner = self.inner.clone();
        async move {
          let projects = inner.list_projects().await?;
          let home = find_home(&projects).ok_or(ApiError::HomeProjectMissing)?;
          let project = inner.get_project(home.id).await?;
          Ok::<_, Report>(project.items)
        }
      })
      .await
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  pub async fn login(&self, username: &str, password: &str) -> Result<()> {
    let token = self.inner.login(username, password).await?;
    self.session.store_token(&token)?;
    info!(username, "Logged in");
    Ok(())
  }

  /// Check the stored token against the server.
  pub async fn verify_session(&self) -> Result<()> {
    let token = self.session.require_token()?;
    self.inner.verify_token(&token).await?;
    Ok(())
  }

  pub fn logout(&self) -> Result<()> {
    self.session.clear()?;
    info!("Logged out");
    Ok(())
  }

  // ==========================================================================
  // Mutations
  // ==========================================================================

  fn invalidate(&self, keys: &[CacheKey]) {
    for key in keys {
      self.cache.invalidate(&key.to_string());
    }
  }

  /// Drop every cached read, keeping the session.
  pub fn clear_cache(&self) {
    self.cache.invalidate_all_except(&[TOKEN_KEY]);
  }

  pub async fn create_project(&self, name: &str) -> Result<()> {
    let token = self.session.require_token()?;
    self.inner.create_project(&token, name).await?;

    self.invalidate(&CacheKey::COLLECTIONS);
    info!(name, "Project created");
    Ok(())
  }

  pub async fn rename_project(&self, id: u64, name: &str) -> Result<()> {
    let token = self.session.require_token()?;
    self.inner.rename_project(&token, id, name).await?;

    self.invalidate(&CacheKey::COLLECTIONS);
    self.invalidate(&[CacheKey::Project(id)]);
    info!(id, name, "Project renamed");
    Ok(())
  }

  /// Deleting a project takes its images with it, so every item entry may be stale.
  pub async fn delete_project(&self, id: u64) -> Result<()> {
    let token = self.session.require_token()?;
    self.inner.delete_project(&token, id).await?;

    self.clear_cache();
    info!(id, "Project deleted");
    Ok(())
  }

  pub async fn upload_item(&self, item: &NewItem) -> Result<()> {
    let token = self.session.require_token()?;
    self.inner.upload_item(&token, item).await?;

    self.invalidate(&CacheKey::COLLECTIONS);
    self.invalidate(&[CacheKey::Project(item.category_id)]);
    info!(category_id = item.category_id, "Image uploaded");
    Ok(())
  }

  /// The item's project isn't known here, so everything is invalidated.
  pub async fn update_item(&self, id: u64, update: &ItemUpdate) -> Result<()> {
    let token = self.session.require_token()?;
    self.inner.update_item(&token, id, update).await?;

    self.clear_cache();
    info!(id, "Image updated");
    Ok(())
  }

  pub async fn delete_item(&self, id: u64) -> Result<()> {
    let token = self.session.require_token()?;
    self.inner.delete_item(&token, id).await?;

    self.clear_cache();
    info!(id, "Image deleted");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, ManualClock, MemoryStore};
  use crate::config::ApiConfig;
  use mockito::{Matcher, Server, ServerGuard};
  use serde_json::json;
  use std::io::Write;

  const PROJECTS_JSON: &str = r#"[
    {"id": 1, "name": "Dunes", "projects": [{"id": 10, "description": "sand", "imagePath": "/img/10.jpg"}]},
    {"id": 2, "name": "Home", "projects": [{"id": 20, "description": "door", "imagePath": "/img/20.jpg"}]}
  ]"#;

  const HOME_JSON: &str = r#"{"id": 2, "name": "Home", "projects": [
    {"id": 20, "description": "door", "imagePath": "/img/20.jpg"},
    {"id": 21, "description": "window", "imagePath": "/img/21.jpg"}
  ]}"#;

  async fn setup() -> (ServerGuard, CachedPortfolioClient<MemoryStore>, ManualClock) {
    let server = Server::new_async().await;
    let inner = PortfolioClient::new(&ApiConfig {
      url: server.url(),
      timeout_secs: 5,
    })
    .unwrap();
    let clock = ManualClock::at_millis(0);
    let cache = CacheLayer::new(MemoryStore::new()).with_clock(clock.clone());
    (server, CachedPortfolioClient::with_cache(inner, cache), clock)
  }

  fn api_error(err: &color_eyre::Report) -> &ApiError {
    err.downcast_ref::<ApiError>().expect("expected an ApiError")
  }

  fn seed_collections(client: &CachedPortfolioClient<MemoryStore>) {
    let projects: Vec<Project> = serde_json::from_str(PROJECTS_JSON).unwrap();
    client.cache().put("categories_cache", &projects);
    client.cache().put("upload_categories_cache", &projects);
    client.cache().put("home_images_cache", &projects[1].items);
    client.cache().put("project_cache_3", &projects[0]);
    client.cache().put("item_cache_10", &projects[0].items[0]);
  }

  #[tokio::test]
  async fn test_categories_cached_and_home_first() {
    let (mut server, client, _clock) = setup().await;
    let mock = server
      .mock("GET", "/api/projects")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(PROJECTS_JSON)
      .expect(1)
      .create_async()
      .await;

    let first = client.categories().await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data[0].name, "Home");
    assert_eq!(first.data[1].name, "Dunes");

    let second = client.categories().await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, first.data);

    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_expired_categories_refetched() {
    let (mut server, client, clock) = setup().await;
    let mock = server
      .mock("GET", "/api/projects")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(PROJECTS_JSON)
      .expect(2)
      .create_async()
      .await;

    client.categories().await.unwrap();
    clock.advance(Duration::minutes(61));
    let again = client.categories().await.unwrap();

    assert_eq!(again.source, CacheSource::Network);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_offline_fallback() {
    let (mut server, client, clock) = setup().await;
    seed_collections(&client);
    clock.advance(Duration::hours(2));

    let _mock = server
      .mock("GET", "/api/projects")
      .with_status(503)
      .create_async()
      .await;

    let result = client.categories().await.unwrap();
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data.len(), 2);
  }

  #[tokio::test]
  async fn test_error_without_cache() {
    let (mut server, client, _clock) = setup().await;
    let _mock = server
      .mock("GET", "/api/items/4")
      .with_status(404)
      .create_async()
      .await;

    let err = client.item(4).await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::Status { .. }));
  }

  #[tokio::test]
  async fn test_home_images() {
    let (mut server, client, _clock) = setup().await;
    let list = server
      .mock("GET", "/api/projects")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(PROJECTS_JSON)
      .expect(1)
      .create_async()
      .await;
    let home = server
      .mock("GET", "/api/projects/2")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(HOME_JSON)
      .expect(1)
      .create_async()
      .await;

    let images = client.home_images().await.unwrap();
    assert_eq!(images.data.len(), 2);
    assert_eq!(images.data[1].image_path, "/img/21.jpg");

    let cached = client.home_images().await.unwrap();
    assert_eq!(cached.source, CacheSource::CacheFresh);

    list.assert_async().await;
    home.assert_async().await;
  }

  #[tokio::test]
  async fn test_project_cached_under_its_id() {
    let (mut server, client, _clock) = setup().await;
    let mock = server
      .mock("GET", "/api/projects/2")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(HOME_JSON)
      .expect(1)
      .create_async()
      .await;

    let first = client.project(2).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data.items.len(), 2);

    let second = client.project(2).await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, first.data);

    let stored = client.cache().get::<Project>("project_cache_2").unwrap();
    assert_eq!(stored.data.name, "Home");
    assert!(client.cache().get::<Project>("project_cache_3").is_none());
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_upload_categories_keep_server_order() {
    let (mut server, client, _clock) = setup().await;
    let mock = server
      .mock("GET", "/api/projects")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(PROJECTS_JSON)
      .expect(1)
      .create_async()
      .await;

    let first = client.upload_categories().await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data[0].name, "Dunes");

    let second = client.upload_categories().await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);

    let stored = client
      .cache()
      .get::<Vec<Project>>("upload_categories_cache")
      .unwrap();
    assert_eq!(stored.data.len(), 2);
    assert!(client.cache().get::<Vec<Project>>("categories_cache").is_none());
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_item_cached_under_its_id() {
    let (mut server, client, _clock) = setup().await;
    let mock = server
      .mock("GET", "/api/items/21")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"id": 21, "description": "window", "imagePath": "/img/21.jpg"}"#)
      .expect(1)
      .create_async()
      .await;

    let first = client.item(21).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(first.data.image_path, "/img/21.jpg");

    let second = client.item(21).await.unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);

    let stored = client.cache().get::<Item>("item_cache_21").unwrap();
    assert_eq!(stored.data.description, "window");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_home_project_missing() {
    let (mut server, client, _clock) = setup().await;
    let _mock = server
      .mock("GET", "/api/projects")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"[{"id": 1, "name": "Dunes"}]"#)
      .create_async()
      .await;

    let err = client.home_images().await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::HomeProjectMissing));
  }

  #[tokio::test]
  async fn test_login_stores_token() {
    let (mut server, client, _clock) = setup().await;
    let mock = server
      .mock("POST", "/api/login")
      .match_body(Matcher::Json(json!({"username": "admin", "password": "pw"})))
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"token": "t1"}"#)
      .create_async()
      .await;

    client.login("admin", "pw").await.unwrap();

    mock.assert_async().await;
    assert_eq!(client.session().token().as_deref(), Some("t1"));
  }

  #[tokio::test]
  async fn test_failed_login_keeps_logged_out() {
    let (mut server, client, _clock) = setup().await;
    let _mock = server
      .mock("POST", "/api/login")
      .with_status(400)
      .create_async()
      .await;

    assert!(client.login("admin", "wrong").await.is_err());
    assert!(client.session().token().is_none());
  }

  #[tokio::test]
  async fn test_verify_rejected_token() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("old").unwrap();
    let _mock = server
      .mock("GET", "/api/verify-token")
      .match_header("authorization", "Bearer old")
      .with_status(401)
      .create_async()
      .await;

    let err = client.verify_session().await.unwrap_err();
    assert!(api_error(&err).is_auth());
  }

  #[tokio::test]
  async fn test_verify_without_token() {
    let (_server, client, _clock) = setup().await;

    let err = client.verify_session().await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::MissingToken));
  }

  #[tokio::test]
  async fn test_delete_project_invalidates_categories() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("abc").unwrap();
    seed_collections(&client);

    let mock = server
      .mock("DELETE", "/api/projects/5")
      .match_header("authorization", "Bearer abc")
      .with_status(204)
      .create_async()
      .await;

    client.delete_project(5).await.unwrap();
    mock.assert_async().await;

    assert!(client.cache().get::<Vec<Project>>("categories_cache").is_none());
    assert!(client.cache().get::<Item>("item_cache_10").is_none());
    assert_eq!(client.session().token().as_deref(), Some("abc"));
  }

  #[tokio::test]
  async fn test_failed_mutation_keeps_cache() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("abc").unwrap();
    seed_collections(&client);

    let _mock = server
      .mock("DELETE", "/api/projects/5")
      .with_status(500)
      .create_async()
      .await;

    let err = client.delete_project(5).await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::Status { .. }));
    assert!(client.cache().get::<Vec<Project>>("categories_cache").is_some());
    assert!(client.cache().get::<Item>("item_cache_10").is_some());
  }

  #[tokio::test]
  async fn test_mutation_rejected_token() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("expired").unwrap();
    seed_collections(&client);

    let _mock = server
      .mock("POST", "/api/projects")
      .with_status(401)
      .create_async()
      .await;

    let err = client.create_project("Night").await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::Unauthorized));
    assert!(client.cache().get::<Vec<Project>>("categories_cache").is_some());
  }

  #[tokio::test]
  async fn test_mutation_without_token_skips_network() {
    let (mut server, client, _clock) = setup().await;
    let mock = server
      .mock("POST", "/api/projects")
      .expect(0)
      .create_async()
      .await;

    let err = client.create_project("Night").await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::MissingToken));
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_create_project_invalidates_collections() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("abc").unwrap();
    seed_collections(&client);

    let _mock = server
      .mock("POST", "/api/projects")
      .match_header("authorization", "Bearer abc")
      .match_body(Matcher::Json(json!({"name": "Night"})))
      .with_status(201)
      .create_async()
      .await;

    client.create_project("Night").await.unwrap();

    let cache = client.cache();
    assert!(cache.get::<Vec<Project>>("categories_cache").is_none());
    assert!(cache.get::<Vec<Project>>("upload_categories_cache").is_none());
    assert!(cache.get::<Vec<Item>>("home_images_cache").is_none());
    // Unrelated entries survive
    assert!(cache.get::<Project>("project_cache_3").is_some());
    assert!(cache.get::<Item>("item_cache_10").is_some());
  }

  #[tokio::test]
  async fn test_rename_project_invalidates_its_detail() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("abc").unwrap();
    seed_collections(&client);

    let _mock = server
      .mock("PUT", "/api/projects/3")
      .match_body(Matcher::Json(json!({"name": "Coast"})))
      .with_status(200)
      .create_async()
      .await;

    client.rename_project(3, "Coast").await.unwrap();

    assert!(client.cache().get::<Project>("project_cache_3").is_none());
    assert!(client.cache().get::<Vec<Project>>("categories_cache").is_none());
    assert!(client.cache().get::<Item>("item_cache_10").is_some());
  }

  #[tokio::test]
  async fn test_upload_invalidates_target_project() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("abc").unwrap();
    seed_collections(&client);

    let mut image = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
    image.write_all(b"fake jpeg bytes").unwrap();

    let mock = server
      .mock("POST", "/api/items")
      .match_header("authorization", "Bearer abc")
      .with_status(201)
      .create_async()
      .await;

    client
      .upload_item(&NewItem {
        description: "tide pool".to_string(),
        category_id: 3,
        image: image.path().to_path_buf(),
      })
      .await
      .unwrap();
    mock.assert_async().await;

    assert!(client.cache().get::<Project>("project_cache_3").is_none());
    assert!(client.cache().get::<Vec<Project>>("upload_categories_cache").is_none());
    assert!(client.cache().get::<Item>("item_cache_10").is_some());
  }

  #[tokio::test]
  async fn test_update_item_invalidates_everything_but_token() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("abc").unwrap();
    seed_collections(&client);

    let _mock = server
      .mock("PUT", "/api/items/10")
      .with_status(200)
      .create_async()
      .await;

    client
      .update_item(
        10,
        &ItemUpdate {
          description: "dry sand".to_string(),
          image: None,
        },
      )
      .await
      .unwrap();

    let keys = client.cache().storage().keys().unwrap();
    assert_eq!(keys, vec![TOKEN_KEY]);
  }

  #[tokio::test]
  async fn test_delete_item_then_read_refetches() {
    let (mut server, client, _clock) = setup().await;
    client.session().store_token("abc").unwrap();
    seed_collections(&client);

    let _delete = server
      .mock("DELETE", "/api/items/10")
      .with_status(204)
      .create_async()
      .await;
    let list = server
      .mock("GET", "/api/projects")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"[{"id": 1, "name": "Dunes", "projects": []}]"#)
      .expect(1)
      .create_async()
      .await;

    client.delete_item(10).await.unwrap();
    let categories = client.categories().await.unwrap();

    assert_eq!(categories.source, CacheSource::Network);
    assert!(categories.data[0].items.is_empty());
    list.assert_async().await;
  }
}
