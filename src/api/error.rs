use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from talking to the portfolio API.
#[derive(Error, Debug)]
pub enum ApiError {
  /// The request never produced a response (DNS, connect, timeout...)
  #[error("Request to {endpoint} failed: {source}")]
  Request {
    endpoint: String,
    #[source]
    source: reqwest::Error,
  },

  /// The server answered with a non-success status
  #[error("{endpoint} returned {status}")]
  Status { endpoint: String, status: StatusCode },

  /// The response body was not what we expected
  #[error("Failed to decode response from {endpoint}: {source}")]
  Decode {
    endpoint: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("Invalid endpoint URL {0}")]
  InvalidUrl(String),

  /// No token stored; the user has to log in first
  #[error("Not logged in")]
  MissingToken,

  /// The server rejected the stored token
  #[error("Session token was rejected by the server")]
  Unauthorized,

  #[error("No project named \"home\" found")]
  HomeProjectMissing,

  #[error("Failed to read image {path}: {source}")]
  Image {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl ApiError {
  /// Authentication problems, as opposed to generic network failures.
  pub fn is_auth(&self) -> bool {
    matches!(self, Self::MissingToken | Self::Unauthorized)
  }
}
