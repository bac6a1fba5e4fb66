use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::json;
use std::io::BufRead;
use tracing::warn;

use folio::api::{CachedPortfolioClient, Item, ItemUpdate, NewItem, Project};
use folio::cache::{CacheLayer, CacheResult, KeyValueStore, SqliteStore, TOKEN_KEY};
use folio::config::Config;
use folio::slideshow::{SlideshowConfig, SlideshowHandle};

use crate::{AdminCommand, CacheCommand, Command};

/// Command dispatcher
pub struct App {
  client: CachedPortfolioClient<SqliteStore>,
  /// Print JSON instead of text
  json: bool,
}

impl App {
  pub fn new(config: Config, json: bool) -> Result<Self> {
    let client = CachedPortfolioClient::new(&config)?;
    Ok(Self { client, json })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Projects => {
        let result = self.client.categories().await?;
        self.report_source(&result);
        self.print_projects(&result.data)
      }
      Command::Project { id } => {
        let result = self.client.project(id).await?;
        self.report_source(&result);
        self.print_project(&result.data)
      }
      Command::Item { id } => {
        let result = self.client.item(id).await?;
        self.report_source(&result);
        self.print_items(std::slice::from_ref(&result.data))
      }
      Command::Home {
        play,
        slides,
        interval_secs,
      } => {
        let result = self.client.home_images().await?;
        self.report_source(&result);
        if play && result.data.len() > 1 {
          self.play(&result.data, slides, interval_secs).await
        } else {
          self.print_items(&result.data)
        }
      }
      Command::Login {
        username,
        password_stdin,
      } => {
        let password = if password_stdin {
          read_password_line()?
        } else {
          Config::get_password()?
        };
        self.client.login(&username, &password).await?;
        println!("Logged in as {}", username);
        Ok(())
      }
      Command::Logout => {
        self.client.logout()?;
        println!("Logged out");
        Ok(())
      }
      Command::Verify => {
        self.client.verify_session().await?;
        println!("Session is valid");
        Ok(())
      }
      Command::Admin(admin) => {
        // Same gate as the admin panel: a bad token never reaches a mutation
        self.client.verify_session().await?;
        self.run_admin(admin).await
      }
      Command::Cache(CacheCommand::List) => self.list_cache(),
      Command::Cache(CacheCommand::Clear) => {
        self.client.clear_cache();
        println!("Cache cleared");
        Ok(())
      }
    }
  }

  async fn run_admin(&self, command: AdminCommand) -> Result<()> {
    match command {
      AdminCommand::AddProject { name } => {
        self.client.create_project(&name).await?;
        println!("Created project {}", name);
      }
      AdminCommand::RenameProject { id, name } => {
        self.client.rename_project(id, &name).await?;
        println!("Renamed project {} to {}", id, name);
      }
      AdminCommand::DeleteProject { id } => {
        self.client.delete_project(id).await?;
        println!("Deleted project {}", id);
      }
      AdminCommand::Upload {
        category,
        description,
        image,
      } => {
        let categories = self.client.upload_categories().await?;
        if !categories.data.iter().any(|p| p.id == category) {
          return Err(eyre!("No project with id {}", category));
        }

        self
          .client
          .upload_item(&NewItem {
            description,
            category_id: category,
            image,
          })
          .await?;
        println!("Uploaded image to project {}", category);
      }
      AdminCommand::EditItem {
        id,
        description,
        image,
      } => {
        if description.is_none() && image.is_none() {
          return Err(eyre!("Nothing to change: pass --description and/or --image"));
        }

        // The API wants the description on every update; keep the current one
        let description = match description {
          Some(description) => description,
          None => self.client.item(id).await?.data.description,
        };

        self
          .client
          .update_item(id, &ItemUpdate { description, image })
          .await?;
        println!("Updated image {}", id);
      }
      AdminCommand::DeleteItem { id } => {
        self.client.delete_item(id).await?;
        println!("Deleted image {}", id);
      }
    }
    Ok(())
  }

  /// Print images in order as the slideshow advances, until Ctrl-C or `slides` transitions.
  async fn play(&self, images: &[Item], slides: Option<usize>, interval_secs: u64) -> Result<()> {
    let config = SlideshowConfig {
      interval: std::time::Duration::from_secs(interval_secs.max(1)),
      ..SlideshowConfig::default()
    };
    let mut handle = SlideshowHandle::spawn(images.len(), config);

    println!("{}", images[0].image_path);
    let mut shown = 0;

    loop {
      if slides.is_some_and(|limit| shown >= limit) {
        break;
      }
      tokio::select! {
        next = handle.receiver.recv() => match next {
          Some(index) => {
            println!("{}", images[index].image_path);
            shown += 1;
          }
          None => break,
        },
        _ = tokio::signal::ctrl_c() => break,
      }
    }

    handle.shutdown().await;
    Ok(())
  }

  fn list_cache(&self) -> Result<()> {
    let rows = cache_rows(self.client.cache())?;

    if self.json {
      return print_json(&rows);
    }

    for row in &rows {
      let key = row["key"].as_str().unwrap_or_default();
      let detail = match row["kind"].as_str() {
        Some("session") => "session token".to_string(),
        Some("cache") => {
          let age = Duration::seconds(row["age_secs"].as_i64().unwrap_or_default());
          let state = if row["fresh"].as_bool().unwrap_or(false) {
            "fresh"
          } else {
            "expired"
          };
          format!("{} old, {}", format_age(age), state)
        }
        _ => "unreadable".to_string(),
      };
      println!("{:<28} {}", key, detail);
    }
    Ok(())
  }

  fn report_source<T>(&self, result: &CacheResult<T>) {
    if result.is_offline() {
      let when = result
        .cached_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "an unknown time".to_string());
      warn!(cached_at = %when, "Serving stale data");
      eprintln!("warning: network unavailable, showing data cached at {}", when);
    }
  }

  fn print_projects(&self, projects: &[Project]) -> Result<()> {
    if self.json {
      return print_json(&projects);
    }
    for project in projects {
      println!(
        "{:>5}  {}  ({} images)",
        project.id,
        project.name,
        project.items.len()
      );
    }
    Ok(())
  }

  fn print_project(&self, project: &Project) -> Result<()> {
    if self.json {
      return print_json(project);
    }
    println!("{} (#{})", project.name, project.id);
    if project.items.is_empty() {
      println!("  No images");
    }
    for item in &project.items {
      println!("{:>7}  {}  {}", item.id, item.image_path, item.description);
    }
    Ok(())
  }

  fn print_items(&self, items: &[Item]) -> Result<()> {
    if self.json {
      return print_json(&items);
    }
    if items.is_empty() {
      println!("No images");
    }
    for item in items {
      println!("{:>5}  {}  {}", item.id, item.image_path, item.description);
    }
    Ok(())
  }
}

/// One JSON row per stored key: the session token, a cache entry with its
/// age, or an entry that no longer decodes.
fn cache_rows<S: KeyValueStore>(cache: &CacheLayer<S>) -> Result<Vec<serde_json::Value>> {
  let keys = cache.storage().keys()?;

  Ok(
    keys
      .iter()
      .map(|key| {
        if key == TOKEN_KEY {
          return json!({ "key": key, "kind": "session" });
        }
        match cache.inspect(key) {
          Some(status) => json!({
            "key": key,
            "kind": "cache",
            "stored_at": status.stored_at.to_rfc3339(),
            "age_secs": status.age.num_seconds(),
            "fresh": status.fresh,
          }),
          None => json!({ "key": key, "kind": "malformed" }),
        }
      })
      .collect(),
  )
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  let out =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to encode JSON: {}", e))?;
  println!("{}", out);
  Ok(())
}

fn read_password_line() -> Result<String> {
  let mut line = String::new();
  std::io::stdin()
    .lock()
    .read_line(&mut line)
    .map_err(|e| eyre!("Failed to read password from stdin: {}", e))?;

  let password = line.trim_end_matches(['\r', '\n']).to_string();
  if password.is_empty() {
    return Err(eyre!("Empty password on stdin"));
  }
  Ok(password)
}

fn format_age(age: Duration) -> String {
  let secs = age.num_seconds().max(0);
  match secs {
    s if s < 60 => format!("{}s", s),
    s if s < 3600 => format!("{}m", s / 60),
    s => format!("{}h{:02}m", s / 3600, (s % 3600) / 60),
  }
}
