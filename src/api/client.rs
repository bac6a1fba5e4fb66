use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::api::error::ApiError;
use crate::api::types::{
  Item, ItemUpdate, LoginRequest, LoginResponse, NewItem, Project, ProjectRequest,
};
use crate::config::ApiConfig;

/// Portfolio REST API client
#[derive(Clone, Debug)]
pub struct PortfolioClient {
  client: Client,
  base: Url,
}

impl PortfolioClient {
  pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
    let mut base = Url::parse(&config.url).map_err(|_| ApiError::InvalidUrl(config.url.clone()))?;

    // Url::join replaces the last segment unless the path ends in '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|source| ApiError::Request {
        endpoint: base.to_string(),
        source,
      })?;

    Ok(Self { client, base })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base
      .join(path)
      .map_err(|_| ApiError::InvalidUrl(format!("{}{}", self.base, path)))
  }

  /// Send a request and check its status.
  ///
  /// 401/403 on an authenticated request means the token is bad.
  async fn send(&self, path: &str, request: RequestBuilder, authed: bool) -> Result<Response, ApiError> {
    debug!(endpoint = path, "Sending request");

    let response = request.send().await.map_err(|source| ApiError::Request {
      endpoint: path.to_string(),
      source,
    })?;

    let status = response.status();
    if authed && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN) {
      return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
      return Err(ApiError::Status {
        endpoint: path.to_string(),
        status,
      });
    }

    Ok(response)
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    let url = self.endpoint(path)?;
    let response = self.send(path, self.client.get(url), false).await?;

    response.json().await.map_err(|source| ApiError::Decode {
      endpoint: path.to_string(),
      source,
    })
  }

  /// Get all projects with their images
  pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
    self.get_json("api/projects").await
  }

  /// Get a single project with its images
  pub async fn get_project(&self, id: u64) -> Result<Project, ApiError> {
    self.get_json(&format!("api/projects/{}", id)).await
  }

  /// Get a single image
  pub async fn get_item(&self, id: u64) -> Result<Item, ApiError> {
    self.get_json(&format!("api/items/{}", id)).await
  }

  /// Exchange credentials for a bearer token
  pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
    let path = "api/login";
    let request = self
      .client
      .post(self.endpoint(path)?)
      .json(&LoginRequest { username, password });

    let response = self.send(path, request, false).await?;
    let body: LoginResponse = response.json().await.map_err(|source| ApiError::Decode {
      endpoint: path.to_string(),
      source,
    })?;

    Ok(body.token)
  }

  /// Check that `token` is still accepted
  pub async fn verify_token(&self, token: &str) -> Result<(), ApiError> {
    let path = "api/verify-token";
    let request = self.client.get(self.endpoint(path)?).bearer_auth(token);

    match self.send(path, request, true).await {
      Ok(_) => Ok(()),
      // Any rejection of the verify call means the session is unusable
      Err(ApiError::Status { .. }) => Err(ApiError::Unauthorized),
      Err(e) => Err(e),
    }
  }

  pub async fn create_project(&self, token: &str, name: &str) -> Result<(), ApiError> {
    let path = "api/projects";
    let request = self
      .client
      .post(self.endpoint(path)?)
      .bearer_auth(token)
      .json(&ProjectRequest { name });

    self.send(path, request, true).await?;
    Ok(())
  }

  pub async fn rename_project(&self, token: &str, id: u64, name: &str) -> Result<(), ApiError> {
    let path = format!("api/projects/{}", id);
    let request = self
      .client
      .put(self.endpoint(&path)?)
      .bearer_auth(token)
      .json(&ProjectRequest { name });

    self.send(&path, request, true).await?;
    Ok(())
  }

  pub async fn delete_project(&self, token: &str, id: u64) -> Result<(), ApiError> {
    let path = format!("api/projects/{}", id);
    let request = self.client.delete(self.endpoint(&path)?).bearer_auth(token);

    self.send(&path, request, true).await?;
    Ok(())
  }

  /// Upload a new image (multipart: description, categoryId, image)
  pub async fn upload_item(&self, token: &str, item: &NewItem) -> Result<(), ApiError> {
    let path = "api/items";
    let form = Form::new()
      .text("description", item.description.clone())
      .text("categoryId", item.category_id.to_string())
      .part("image", image_part(&item.image).await?);

    let request = self
      .client
      .post(self.endpoint(path)?)
      .bearer_auth(token)
      .multipart(form);

    self.send(path, request, true).await?;
    Ok(())
  }

  /// Update an image's description, optionally replacing the file
  pub async fn update_item(&self, token: &str, id: u64, update: &ItemUpdate) -> Result<(), ApiError> {
    let path = format!("api/items/{}", id);
    let mut form = Form::new().text("description", update.description.clone());
    if let Some(image) = &update.image {
      form = form.part("image", image_part(image).await?);
    }

    let request = self
      .client
      .put(self.endpoint(&path)?)
      .bearer_auth(token)
      .multipart(form);

    self.send(&path, request, true).await?;
    Ok(())
  }

  pub async fn delete_item(&self, token: &str, id: u64) -> Result<(), ApiError> {
    let path = format!("api/items/{}", id);
    let request = self.client.delete(self.endpoint(&path)?).bearer_auth(token);

    self.send(&path, request, true).await?;
    Ok(())
  }
}

/// Read an image file into a multipart part named after the file.
async fn image_part(path: &Path) -> Result<Part, ApiError> {
  let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Image {
    path: path.to_path_buf(),
    source,
  })?;

  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "image".to_string());

  let part = Part::bytes(bytes).file_name(file_name);
  match image_mime(path) {
    Some(mime) => part.mime_str(mime).map_err(|source| ApiError::Request {
      endpoint: "api/items".to_string(),
      source,
    }),
    None => Ok(part),
  }
}

fn image_mime(path: &Path) -> Option<&'static str> {
  let ext = path.extension()?.to_str()?.to_ascii_lowercase();
  match ext.as_str() {
    "jpg" | "jpeg" => Some("image/jpeg"),
    "png" => Some("image/png"),
    "gif" => Some("image/gif"),
    "webp" => Some("image/webp"),
    _ => None,
  }
}
