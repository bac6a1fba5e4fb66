mod app;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use folio::api::ApiError;
use folio::config::Config;

#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(about = "Browse and manage a photography portfolio from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/folio/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Print raw JSON instead of text
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// List projects, home first
  Projects,
  /// Show a project and its images
  Project { id: u64 },
  /// Show a single image
  Item { id: u64 },
  /// Show the home images, optionally as a slideshow
  Home {
    #[arg(long)]
    play: bool,
    /// Stop after this many transitions
    #[arg(long)]
    slides: Option<usize>,
    #[arg(long, default_value_t = 5)]
    interval_secs: u64,
  },
  /// Log in and store the session token
  Login {
    #[arg(short, long)]
    username: String,
    /// Read the password from stdin instead of FOLIO_PASSWORD
    #[arg(long)]
    password_stdin: bool,
  },
  /// Forget the session token
  Logout,
  /// Check the session token with the server
  Verify,
  /// Project and image management (requires login)
  #[command(subcommand)]
  Admin(AdminCommand),
  /// Inspect or clear the local cache
  #[command(subcommand)]
  Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
  AddProject {
    name: String,
  },
  RenameProject {
    id: u64,
    name: String,
  },
  DeleteProject {
    id: u64,
  },
  /// Upload a new image into a project
  Upload {
    #[arg(long)]
    category: u64,
    #[arg(long)]
    description: String,
    image: PathBuf,
  },
  /// Change an image's description and/or file
  EditItem {
    id: u64,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    image: Option<PathBuf>,
  },
  DeleteItem {
    id: u64,
  },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Show cached keys with their age
  List,
  /// Drop all cached data, keeping the session
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let log_guard = folio::logging::init(&config.log)?;

  let app = app::App::new(config, args.json)?;
  let result = app.run(args.command).await;

  if let Err(e) = &result {
    if let Some(api_error) = e.downcast_ref::<ApiError>().filter(|e| e.is_auth()) {
      eprintln!("{}. Run `folio login` to sign in.", api_error);
      drop(log_guard);
      std::process::exit(2);
    }
  }

  result
}
