//! The task store seam and an in-process implementation.

use async_trait::async_trait;
use parking_lot::Mutex;
use tasklane_shared::{
    DeleteAction, Task, TaskDraft, TaskPatch, TaskStatus,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::StoreError;

/// Owner of task records. Ids are assigned by the store on create.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError>;
    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StoreError>;
    async fn delete(&self, id: Uuid, action: DeleteAction) -> Result<(), StoreError>;
    async fn list(&self) -> Result<Vec<Task>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
        }
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().clone()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    #[instrument(skip(self, draft), fields(title = %draft.title))]
    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let task = Task::from_draft(Uuid::new_v4(), draft);
        self.tasks.lock().push(task.clone());
        info!(task_id = %task.id, "created task");
        Ok(task)
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.lock();
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(StoreError::NotFound(id))?;
        patch.apply_to(task);
        debug!(task_id = %id, "updated task");
        Ok(task.clone())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: Uuid, action: DeleteAction) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock();
        let idx = tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(StoreError::NotFound(id))?;
        match action {
            DeleteAction::Trash => tasks[idx].status = TaskStatus::Trashed,
            DeleteAction::Delete => {
                tasks.remove(idx);
            }
        }
        info!(task_id = %id, ?action, "deleted task");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .iter()
            .filter(|task| task.status != TaskStatus::Trashed)
            .cloned()
            .collect())
    }
}
