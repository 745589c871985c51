//! Error types for the scheduling core.
//!
//! Every suspending operation reports
//! failures through `CoreError` so the
//! caller can tell which step failed.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
  /// The store answered with its own
  /// message; shown as-is.
  #[error("{message}")]
  Server { message: String },

  #[error(
    "task store unreachable; check \
     your connection and retry"
  )]
  Transport,

  #[error("task not found: {0}")]
  NotFound(Uuid),

  #[error(
    "corrupt task data in {} line \
     {line}: {source}",
    path.display()
  )]
  Corrupt {
    path:   PathBuf,
    line:   usize,
    #[source]
    source: serde_json::Error
  },

  #[error("task store IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error(
    "task store returned malformed \
     data: {0}"
  )]
  Serialization(
    #[from] serde_json::Error
  )
}

#[derive(Error, Debug)]
pub enum CoreError {
  #[error("invalid input: {0}")]
  Validation(String),

  #[error("upload failed for {name}: {source}")]
  Upload {
    name:   String,
    #[source]
    source: Box<
      dyn std::error::Error
        + Send
        + Sync
    >
  },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("not permitted: {0}")]
  Permission(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("serialization error: {0}")]
  Serialization(
    #[from] serde_json::Error
  )
}

impl CoreError {
  pub fn validation(
    message: impl Into<String>
  ) -> Self {
    Self::Validation(message.into())
  }

  /// Name of the attachment that broke
  /// an upload, if that is what failed.
  pub fn failed_attachment(
    &self
  ) -> Option<&str> {
    match self {
      | Self::Upload {
        name, ..
      } => Some(name.as_str()),
      | _ => None
    }
  }
}

pub type Result<T> =
  std::result::Result<T, CoreError>;
