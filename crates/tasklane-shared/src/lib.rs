//! Wire-level data model shared by the scheduling core and its callers.
//!
//! Field names follow the JSON shape the task server speaks (camelCase).

use std::path::{
  Path,
  PathBuf
};

use serde::{
  Deserialize,
  Deserializer,
  Serialize
};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
  Planned,
  InProgress,
  Completed,
  Trashed
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
  Low,
  #[default]
  Medium,
  High,
  Urgent
}

impl TaskPriority {
  pub fn as_str(&self) -> &'static str {
    match self {
      | Self::Low => "low",
      | Self::Medium => "medium",
      | Self::High => "high",
      | Self::Urgent => "urgent"
    }
  }
}

impl std::str::FromStr for TaskPriority {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "low" => Ok(Self::Low),
      | "medium" => Ok(Self::Medium),
      | "high" => Ok(Self::High),
      | "urgent" => Ok(Self::Urgent),
      | other => {
        Err(format!(
          "unknown priority: {other}"
        ))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
  Photo,
  Video,
  Document,
  Link
}

impl AttachmentKind {
  /// Best guess from a file extension;
  /// anything unrecognised is a
  /// document.
  pub fn from_path(path: &Path) -> Self {
    let ext = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| {
        ext.to_ascii_lowercase()
      })
      .unwrap_or_default();

    match ext.as_str() {
      | "png" | "jpg" | "jpeg"
      | "gif" | "webp" | "bmp"
      | "heic" => Self::Photo,
      | "mp4" | "mov" | "webm"
      | "mkv" | "avi" => Self::Video,
      | _ => Self::Document
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
  pub path:      PathBuf,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub mime_type: Option<String>
}

/// Where an attachment's bytes live.
///
/// An attachment is either waiting for
/// upload from a local file or already
/// reachable through a persisted URL.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(untagged)]
pub enum AttachmentSource {
  Resolved {
    url: String
  },
  Pending {
    #[serde(rename = "pendingFile")]
    pending_file: LocalFile
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Attachment {
  #[serde(default = "Uuid::new_v4")]
  pub id:     Uuid,
  #[serde(rename = "type")]
  pub kind:   AttachmentKind,
  pub name:   String,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub size:   Option<u64>,
  #[serde(flatten)]
  pub source: AttachmentSource
}

impl Attachment {
  pub fn resolved(
    kind: AttachmentKind,
    name: impl Into<String>,
    url: impl Into<String>
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      kind,
      name: name.into(),
      size: None,
      source: AttachmentSource::Resolved {
        url: url.into()
      }
    }
  }

  pub fn link(
    name: impl Into<String>,
    url: impl Into<String>
  ) -> Self {
    Self::resolved(
      AttachmentKind::Link,
      name,
      url
    )
  }

  pub fn pending(
    kind: AttachmentKind,
    name: impl Into<String>,
    path: impl Into<PathBuf>
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      kind,
      name: name.into(),
      size: None,
      source: AttachmentSource::Pending {
        pending_file: LocalFile {
          path:      path.into(),
          mime_type: None
        }
      }
    }
  }

  pub fn url(&self) -> Option<&str> {
    match &self.source {
      | AttachmentSource::Resolved {
        url
      } => Some(url.as_str()),
      | AttachmentSource::Pending {
        ..
      } => None
    }
  }

  pub fn pending_file(
    &self
  ) -> Option<&LocalFile> {
    match &self.source {
      | AttachmentSource::Pending {
        pending_file
      } => Some(pending_file),
      | AttachmentSource::Resolved {
        ..
      } => None
    }
  }

  pub fn is_pending(&self) -> bool {
    self.pending_file().is_some()
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id:              Uuid,
  pub title:           String,
  #[serde(default)]
  pub description:     String,
  /// Calendar placement. Bucketing
  /// reads this field, never
  /// `due_date`.
  #[serde(default)]
  pub created_at:      Option<String>,
  #[serde(default)]
  pub due_date:        Option<String>,
  #[serde(default)]
  pub assigned_to:     Option<String>,
  pub status:          TaskStatus,
  #[serde(default)]
  pub priority:        TaskPriority,
  #[serde(default)]
  pub estimated_hours: Option<f64>,
  #[serde(default)]
  pub attachments:     Vec<Attachment>
}

impl Task {
  pub fn from_draft(
    id: Uuid,
    draft: TaskDraft
  ) -> Self {
    Self {
      id,
      title: draft.title,
      description: draft.description,
      created_at: draft.created_at,
      due_date: draft.due_date,
      assigned_to: draft.assigned_to,
      status: draft.status,
      priority: draft.priority,
      estimated_hours: Some(
        draft.estimated_hours
      ),
      attachments: draft.attachments
    }
  }
}

/// Body of a task create call.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
  pub title:           String,
  pub description:     String,
  pub created_at:      Option<String>,
  pub due_date:        Option<String>,
  pub priority:        TaskPriority,
  pub status:          TaskStatus,
  pub assigned_to:     Option<String>,
  pub estimated_hours: f64,
  #[serde(default)]
  pub attachments:     Vec<Attachment>
}

/// Partial update. Only `Some` fields
/// are sent; `Some(None)` clears and
/// travels as an explicit `null`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub title:       Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub description: Option<String>,
  #[serde(
    default,
    deserialize_with = "present",
    skip_serializing_if = "Option::is_none"
  )]
  pub created_at: Option<Option<String>>,
  #[serde(
    default,
    deserialize_with = "present",
    skip_serializing_if = "Option::is_none"
  )]
  pub due_date: Option<Option<String>>,
  #[serde(
    default,
    deserialize_with = "present",
    skip_serializing_if = "Option::is_none"
  )]
  pub assigned_to:
    Option<Option<String>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub status:      Option<TaskStatus>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub priority:    Option<TaskPriority>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub attachments:
    Option<Vec<Attachment>>
}

/// A field that is present maps to
/// `Some`, even when it holds `null`.
fn present<'de, D, T>(
  de: D
) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>
{
  Option::<T>::deserialize(de).map(Some)
}

impl TaskPatch {
  pub fn reschedule(
    created_at: String
  ) -> Self {
    Self {
      created_at: Some(Some(created_at)),
      ..Self::default()
    }
  }

  pub fn apply_to(
    &self,
    task: &mut Task
  ) {
    if let Some(title) = &self.title {
      task.title = title.clone();
    }
    if let Some(description) =
      &self.description
    {
      task.description =
        description.clone();
    }
    if let Some(created_at) =
      &self.created_at
    {
      task.created_at =
        created_at.clone();
    }
    if let Some(due_date) =
      &self.due_date
    {
      task.due_date = due_date.clone();
    }
    if let Some(assigned_to) =
      &self.assigned_to
    {
      task.assigned_to =
        assigned_to.clone();
    }
    if let Some(status) = self.status {
      task.status = status;
    }
    if let Some(priority) = self.priority
    {
      task.priority = priority;
    }
    if let Some(attachments) =
      &self.attachments
    {
      task.attachments =
        attachments.clone();
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum DeleteAction {
  Trash,
  Delete
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct UploadedFile {
  pub url:  String,
  pub name: String
}

/// A to-do list entry. Lives only in
/// client-local storage until it is
/// dropped onto the calendar.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
  pub id:              Uuid,
  pub title:           String,
  #[serde(default)]
  pub description:     String,
  #[serde(default)]
  pub priority:        Option<TaskPriority>,
  #[serde(default)]
  pub estimated_hours: Option<f64>,
  #[serde(default)]
  pub completed:       bool,
  #[serde(default)]
  pub assigned_date:   Option<String>,
  #[serde(default)]
  pub attachments:     Vec<Attachment>
}

#[derive(
  Debug, Clone, Default, PartialEq,
)]
pub struct NewTodo {
  pub title:           String,
  pub description:     String,
  pub priority:        Option<TaskPriority>,
  pub estimated_hours: Option<f64>,
  pub attachments:     Vec<Attachment>
}
