//! Portfolio API types.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Name of the project whose images make up the home slideshow.
pub const HOME_PROJECT: &str = "home";

/// A project (category) and the images filed under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub id: u64,
  pub name: String,
  /// The API calls a project's image list `projects`
  #[serde(
    rename = "projects",
    default,
    deserialize_with = "deserialize_null_default"
  )]
  pub items: Vec<Item>,
}

impl Project {
  pub fn is_home(&self) -> bool {
    self.name.eq_ignore_ascii_case(HOME_PROJECT)
  }
}

/// A single image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
  pub id: u64,
  #[serde(default, deserialize_with = "deserialize_null_default")]
  pub description: String,
  #[serde(default, deserialize_with = "deserialize_null_default")]
  pub image_path: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category_id: Option<u64>,
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Move the home project to the front, keeping the others in order.
pub fn sort_home_first(projects: &mut [Project]) {
  if let Some(pos) = projects.iter().position(Project::is_home) {
    projects[..=pos].rotate_right(1);
  }
}

pub fn find_home(projects: &[Project]) -> Option<&Project> {
  projects.iter().find(|p| p.is_home())
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
  pub username: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
  pub token: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ProjectRequest<'a> {
  pub name: &'a str,
}

/// A new image to upload into a project.
#[derive(Debug, Clone)]
pub struct NewItem {
  pub description: String,
  pub category_id: u64,
  pub image: PathBuf,
}

/// Changes to an existing image. The description is always sent.
#[derive(Debug, Clone)]
pub struct ItemUpdate {
  pub description: String,
  pub image: Option<PathBuf>,
}
