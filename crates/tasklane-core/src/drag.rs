//! Drag and drop onto calendar days.
//!
//! A gesture is `Idle -> Dragging -> HoveringTarget -> Idle`. Only one
//! gesture exists per engine, and `drop` holds the engine mutably until the
//! store call settles, so a second drop cannot start mid-flight.
//!
//! Nothing local changes before the store confirms: a moved task is only
//! reported once the update succeeded, and a todo leaves its list only
//! after its task was created.

use std::sync::Arc;

use tasklane_shared::{Attachment, Task, TaskDraft, TaskPatch, TaskPriority, TaskStatus, TodoItem};
use tracing::{debug, info, instrument, warn};

use crate::attachments;
use crate::bucket::DateBucketer;
use crate::datetime::{CalendarDay, format_timestamp};
use crate::error::{CoreError, Result};
use crate::store::TaskStore;
use crate::todos::TodoList;
use crate::uploads::AttachmentUploader;

pub const DEFAULT_TODO_DESCRIPTION: &str = "Task created from todo list";
pub const DEFAULT_ESTIMATED_HOURS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragAction {
    Move,
    Copy,
}

impl DragAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::Copy => "copy",
        }
    }
}

/// What is being dragged. An existing task is always moved.
#[derive(Debug, Clone, PartialEq)]
pub enum DragPayload {
    Task(Task),
    Todo { todo: TodoItem, action: DragAction },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragPayload),
    HoveringTarget {
        payload: DragPayload,
        target: CalendarDay,
    },
}

impl DragState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn target(&self) -> Option<CalendarDay> {
        match self {
            Self::HoveringTarget { target, .. } => Some(*target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Member,
}

impl UserRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "member" | "user" => Some(Self::Member),
            _ => None,
        }
    }
}

/// The signed-in user on whose behalf drops are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: UserRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragPolicy {
    /// Members may copy their todos onto the calendar.
    pub member_todo_copy: bool,
}

impl Default for DragPolicy {
    fn default() -> Self {
        Self {
            member_todo_copy: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    Moved(Task),
    /// `list_saved` is false when a moved todo left the in-memory list but
    /// the stored list could not be rewritten, so it reappears on reload.
    Created {
        task: Task,
        action: DragAction,
        list_saved: bool,
    },
}

impl DropOutcome {
    pub fn task(&self) -> &Task {
        match self {
            Self::Moved(task) | Self::Created { task, .. } => task,
        }
    }
}

pub struct DragTransferEngine {
    store: Arc<dyn TaskStore>,
    uploader: Arc<dyn AttachmentUploader>,
    bucketer: DateBucketer,
    actor: Actor,
    policy: DragPolicy,
    state: DragState,
}

impl DragTransferEngine {
    pub fn new(
        store: Arc<dyn TaskStore>,
        uploader: Arc<dyn AttachmentUploader>,
        bucketer: DateBucketer,
        actor: Actor,
    ) -> Self {
        Self {
            store,
            uploader,
            bucketer,
            actor,
            policy: DragPolicy::default(),
            state: DragState::Idle,
        }
    }

    pub fn with_policy(mut self, policy: DragPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, actor = %self.actor.id))]
    pub fn start_task_drag(&mut self, task: Task) -> Result<()> {
        self.ensure_idle()?;
        if !self.actor.is_admin() {
            return Err(CoreError::Permission(
                "only admins can reschedule existing tasks".to_string(),
            ));
        }
        debug!("task drag started");
        self.state = DragState::Dragging(DragPayload::Task(task));
        Ok(())
    }

    #[instrument(
        skip(self, todo, action),
        fields(todo_id = %todo.id, action = action.as_str(), actor = %self.actor.id)
    )]
    pub fn start_todo_drag(&mut self, todo: TodoItem, action: DragAction) -> Result<()> {
        self.ensure_idle()?;
        if !self.actor.is_admin() {
            if action != DragAction::Copy {
                return Err(CoreError::Permission(
                    "members can only copy todos onto the calendar".to_string(),
                ));
            }
            if !self.policy.member_todo_copy {
                return Err(CoreError::Permission(
                    "copying todos onto the calendar is disabled".to_string(),
                ));
            }
        }
        debug!("todo drag started");
        self.state = DragState::Dragging(DragPayload::Todo { todo, action });
        Ok(())
    }

    /// Enter or re-enter a day cell. Returns false when nothing is being
    /// dragged.
    pub fn hover(&mut self, day: CalendarDay) -> bool {
        match std::mem::take(&mut self.state) {
            DragState::Dragging(payload) | DragState::HoveringTarget { payload, .. } => {
                debug!(day = %day, "hovering drop target");
                self.state = DragState::HoveringTarget {
                    payload,
                    target: day,
                };
                true
            }
            DragState::Idle => false,
        }
    }

    /// Pointer left the target without dropping; the gesture ends.
    pub fn leave(&mut self) {
        if let DragState::HoveringTarget { target, .. } = &self.state {
            debug!(day = %target, "left drop target");
            self.state = DragState::Idle;
        }
    }

    /// Drag ended (released elsewhere, escape). Resets UI state only; it
    /// never aborts a store call that is already running.
    pub fn cancel(&mut self) {
        if !self.state.is_idle() {
            debug!("drag cancelled");
        }
        self.state = DragState::Idle;
    }

    /// Drop on the hovered day. The engine is back at `Idle` once this
    /// returns, whatever the outcome.
    #[instrument(skip(self, todos), fields(actor = %self.actor.id))]
    pub async fn drop(&mut self, todos: &mut TodoList) -> Result<DropOutcome> {
        let (payload, target) = match &self.state {
            DragState::HoveringTarget { payload, target } => (payload.clone(), *target),
            DragState::Dragging(_) => {
                return Err(CoreError::validation("drop outside of a calendar day"));
            }
            DragState::Idle => return Err(CoreError::validation("nothing is being dragged")),
        };

        let result = match payload {
            DragPayload::Task(task) => self
                .move_existing_task(&task, target)
                .await
                .map(DropOutcome::Moved),
            DragPayload::Todo { todo, action } => {
                self.convert_todo_to_task(&todo, target, action, todos)
                    .await
            }
        };

        self.state = DragState::Idle;
        if let Err(err) = &result {
            warn!(day = %target, error = %err, "drop failed");
        }
        result
    }

    /// Reschedule a task to local noon of `target`. Only `created_at` is
    /// sent.
    #[instrument(skip(self, task, target), fields(task_id = %task.id, day = %target))]
    pub async fn move_existing_task(&self, task: &Task, target: CalendarDay) -> Result<Task> {
        let stamp = self.bucketer.target_timestamp_for_drop(target)?;
        let updated = self
            .store
            .update(task.id, TaskPatch::reschedule(format_timestamp(&stamp)))
            .await?;
        info!(created_at = ?updated.created_at, "task moved");
        Ok(updated)
    }

    /// Materialize a todo as a task on `target`. With `Move` the todo leaves
    /// the list, but only after the store created the task.
    #[instrument(
        skip(self, todo, target, action, todos),
        fields(todo_id = %todo.id, day = %target, action = action.as_str())
    )]
    pub async fn convert_todo_to_task(
        &self,
        todo: &TodoItem,
        target: CalendarDay,
        action: DragAction,
        todos: &mut TodoList,
    ) -> Result<DropOutcome> {
        if todo.title.trim().is_empty() {
            return Err(CoreError::validation("todo has no title"));
        }
        let stamp = format_timestamp(&self.bucketer.target_timestamp_for_drop(target)?);

        let attachments = attachments::reconcile(&todo.attachments, self.uploader.as_ref()).await?;
        let draft = self.draft_from_todo(todo, stamp, attachments);
        let task = self.store.create(draft).await?;

        let mut list_saved = true;
        if action == DragAction::Move {
            match todos.remove_materialized(todo.id) {
                Ok(true) => {}
                Ok(false) => debug!("moved todo was no longer in the list"),
                Err(err) => {
                    warn!(error = %err, "task created but the todo list was not saved");
                    list_saved = false;
                }
            }
        }

        info!(task_id = %task.id, "todo materialized");
        Ok(DropOutcome::Created {
            task,
            action,
            list_saved,
        })
    }

    fn draft_from_todo(
        &self,
        todo: &TodoItem,
        stamp: String,
        attachments: Vec<Attachment>,
    ) -> TaskDraft {
        let description = if todo.description.trim().is_empty() {
            DEFAULT_TODO_DESCRIPTION.to_string()
        } else {
            todo.description.clone()
        };
        let estimated_hours = todo
            .estimated_hours
            .filter(|hours| hours.is_normal())
            .unwrap_or(DEFAULT_ESTIMATED_HOURS);

        TaskDraft {
            title: todo.title.clone(),
            description,
            created_at: Some(stamp.clone()),
            due_date: Some(stamp),
            priority: todo.priority.unwrap_or(TaskPriority::Medium),
            status: TaskStatus::Planned,
            assigned_to: Some(self.actor.id.clone()),
            estimated_hours,
            attachments,
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.state.is_idle() {
            Ok(())
        } else {
            Err(CoreError::validation("a drag is already in progress"))
        }
    }
}
