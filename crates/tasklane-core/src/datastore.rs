use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tasklane_shared::{DeleteAction, Task, TaskDraft, TaskPatch, TaskStatus};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::TaskStore;

/// File-backed task store: one JSON task per line in `tasks.data`.
///
/// The inherent methods block on file IO. The `TaskStore` impl runs them on
/// tokio's blocking pool; clones share the write lock.
#[derive(Debug, Clone)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let tasks_path = data_dir.join("tasks.data");
        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_all(&self) -> Result<Vec<Task>, StoreError> {
        load_jsonl(&self.tasks_path)
    }

    /// Trashed tasks, for the trash view.
    pub fn trash(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|task| task.status == TaskStatus::Trashed)
            .collect())
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    pub fn restore(&self, id: Uuid) -> Result<Task, StoreError> {
        self.modify(|tasks| {
            let task = tasks
                .iter_mut()
                .find(|task| task.id == id && task.status == TaskStatus::Trashed)
                .ok_or(StoreError::NotFound(id))?;
            task.status = TaskStatus::Planned;
            Ok(task.clone())
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn purge_trash(&self) -> Result<usize, StoreError> {
        self.modify(|tasks| {
            let before = tasks.len();
            tasks.retain(|task| task.status != TaskStatus::Trashed);
            let purged = before - tasks.len();
            info!(purged, remaining = tasks.len(), "purged trashed tasks");
            Ok(purged)
        })
    }

    /// Load, mutate, and atomically rewrite the file under the write lock.
    /// The file is left untouched when `f` fails.
    fn modify<T>(
        &self,
        f: impl FnOnce(&mut Vec<Task>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock();
        let mut tasks = self.load_all()?;
        let out = f(&mut tasks)?;
        save_jsonl_atomic(&self.tasks_path, &tasks)?;
        Ok(out)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DataStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|err| StoreError::Io(std::io::Error::other(err)))?
    }
}

#[async_trait]
impl TaskStore for DataStore {
    #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let task = Task::from_draft(Uuid::new_v4(), draft);
        let stored = task.clone();
        self.blocking(move |store| {
            store.modify(|tasks| {
                tasks.push(stored);
                Ok(())
            })
        })
        .await?;
        info!(task_id = %task.id, "created task");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch), fields(task_id = %id))]
    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, StoreError> {
        self.blocking(move |store| {
            store.modify(|tasks| {
                let task = tasks
                    .iter_mut()
                    .find(|task| task.id == id)
                    .ok_or(StoreError::NotFound(id))?;
                patch.apply_to(task);
                debug!(created_at = ?task.created_at, "applied patch");
                Ok(task.clone())
            })
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(task_id = %id))]
    async fn delete(&self, id: Uuid, action: DeleteAction) -> Result<(), StoreError> {
        self.blocking(move |store| {
            store.modify(|tasks| {
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
                Ok(())
            })
        })
        .await?;
        info!(?action, "deleted task");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.blocking(|store| store.load_all()).await?;
        Ok(tasks
            .into_iter()
            .filter(|task| task.status != TaskStatus::Trashed)
            .collect())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> Result<Vec<Task>, StoreError> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> Result<(), StoreError> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for task in tasks {
        let serialized = serde_json::to_string(task)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path).map_err(|err| StoreError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tasklane_shared::TaskPriority;
    use tempfile::tempdir;

    use super::*;

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: "Task created from todo list".to_string(),
            created_at: Some("2024-06-10T12:00:00+00:00".to_string()),
            due_date: Some("2024-06-10T12:00:00+00:00".to_string()),
            priority: TaskPriority::High,
            status: TaskStatus::Planned,
            assigned_to: Some("u1".to_string()),
            estimated_hours: 2.0,
            attachments: vec![],
        }
    }

    #[tokio::test]
    async fn tasks_survive_reopen() {
        let temp = tempdir().expect("tempdir");
        let created = {
            let store = DataStore::open(temp.path()).expect("open");
            store.create(draft("Review docs")).await.expect("create")
        };

        let store = DataStore::open(temp.path()).expect("reopen");
        let listed = store.list().await.expect("list");
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn trash_restore_and_purge() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let keep = store.create(draft("keep")).await.expect("create");
        let bin = store.create(draft("bin")).await.expect("create");

        store.delete(bin.id, DeleteAction::Trash).await.expect("trash");
        assert_eq!(store.list().await.expect("list").len(), 1);
        assert_eq!(store.trash().expect("trash list")[0].id, bin.id);

        let restored = store.restore(bin.id).expect("restore");
        assert_eq!(restored.status, TaskStatus::Planned);
        assert!(matches!(store.restore(keep.id), Err(StoreError::NotFound(_))));

        store.delete(bin.id, DeleteAction::Trash).await.expect("trash again");
        assert_eq!(store.purge_trash().expect("purge"), 1);
        assert_eq!(store.load_all().expect("load").len(), 1);
    }

    #[tokio::test]
    async fn failed_update_leaves_file_untouched() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        store.create(draft("only")).await.expect("create");
        let before = fs::read_to_string(&store.tasks_path).expect("read");

        let err = store
            .update(Uuid::new_v4(), TaskPatch::default())
            .await
            .expect_err("unknown id");
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(fs::read_to_string(&store.tasks_path).expect("read"), before);
    }

    #[tokio::test]
    async fn corrupt_line_reports_location() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        fs::write(&store.tasks_path, "\n{broken\n").expect("seed");

        let err = store.list().await.expect_err("corrupt");
        assert!(matches!(err, StoreError::Corrupt { line: 2, .. }));
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn clones_share_one_file() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let other = store.clone();

        let (a, b) = tokio::join!(store.create(draft("first")), other.create(draft("second")));
        a.expect("create first");
        b.expect("create second");
        assert_eq!(store.list().await.expect("list").len(), 2);
    }
}
