//! The per-user to-do list kept beside the calendar.

use tasklane_shared::{NewTodo, TodoItem};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::storage::LocalStorage;

pub const TODO_KEY_PREFIX: &str = "calendarTodos_";

pub fn storage_key(user_id: &str) -> String {
    format!("{TODO_KEY_PREFIX}{user_id}")
}

/// A user's to-do list. Every mutation rewrites the stored copy.
#[derive(Debug)]
pub struct TodoList {
    user_id: String,
    items: Vec<TodoItem>,
    storage: LocalStorage,
}

impl TodoList {
    #[instrument(skip(storage))]
    pub fn load(storage: LocalStorage, user_id: &str) -> Result<Self> {
        let key = storage_key(user_id);
        let items = match storage.get_item(&key)? {
            Some(raw) => match serde_json::from_str::<Vec<TodoItem>>(&raw) {
                Ok(items) => items,
                Err(err) => {
                    error!(key = %key, error = %err, "stored todo list is corrupt; starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        debug!(key = %key, count = items.len(), "loaded todo list");
        Ok(Self {
            user_id: user_id.to_string(),
            items,
            storage,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn get(&self, id: Uuid) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.get(id).is_some()
    }

    /// Resolve a full id or an unambiguous id prefix.
    pub fn resolve(&self, token: &str) -> Result<Uuid> {
        if let Ok(id) = token.parse::<Uuid>() {
            return Ok(id);
        }
        let lowered = token.to_ascii_lowercase();
        let mut hits = self
            .items
            .iter()
            .filter(|item| item.id.to_string().starts_with(&lowered));
        match (hits.next(), hits.next()) {
            (Some(item), None) => Ok(item.id),
            (Some(_), Some(_)) => Err(CoreError::validation(format!(
                "todo id prefix {token:?} is ambiguous"
            ))),
            (None, _) => Err(CoreError::validation(format!("no todo matches {token:?}"))),
        }
    }

    #[instrument(skip(self, new), fields(user = %self.user_id))]
    pub fn add(&mut self, new: NewTodo) -> Result<TodoItem> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(CoreError::validation("todo title must not be empty"));
        }

        let item = TodoItem {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: new.description,
            priority: new.priority,
            estimated_hours: new.estimated_hours,
            completed: false,
            assigned_date: None,
            attachments: new.attachments,
        };
        let mut next = self.items.clone();
        next.push(item.clone());
        self.commit(next)?;

        info!(todo_id = %item.id, "added todo");
        Ok(item)
    }

    #[instrument(skip(self), fields(user = %self.user_id))]
    pub fn delete(&mut self, id: Uuid) -> Result<bool> {
        let Some(next) = self.without(id) else {
            return Ok(false);
        };
        self.commit(next)?;
        info!(todo_id = %id, "deleted todo");
        Ok(true)
    }

    #[instrument(skip(self), fields(user = %self.user_id))]
    pub fn toggle_complete(&mut self, id: Uuid) -> Result<Option<bool>> {
        let mut next = self.items.clone();
        let Some(item) = next.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        item.completed = !item.completed;
        let completed = item.completed;
        self.commit(next)?;
        debug!(todo_id = %id, completed, "toggled todo");
        Ok(Some(completed))
    }

    /// Drop an item after it became a task. The task already exists, so the
    /// item leaves memory even when the write fails; the error tells the
    /// caller the stored list still holds it.
    pub(crate) fn remove_materialized(&mut self, id: Uuid) -> Result<bool> {
        let Some(next) = self.without(id) else {
            return Ok(false);
        };
        let written = self.write(&next);
        self.items = next;
        written.map(|()| true)
    }

    fn without(&self, id: Uuid) -> Option<Vec<TodoItem>> {
        let idx = self.items.iter().position(|item| item.id == id)?;
        let mut next = self.items.clone();
        next.remove(idx);
        Some(next)
    }

    /// Write `next` and adopt it only once storage accepted it.
    fn commit(&mut self, next: Vec<TodoItem>) -> Result<()> {
        self.write(&next)?;
        self.items = next;
        Ok(())
    }

    fn write(&self, items: &[TodoItem]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.storage.set_item(&storage_key(&self.user_id), &json)
    }
}

#[cfg(test)]
mod tests {
    use tasklane_shared::{Attachment, TaskPriority};
    use tempfile::tempdir;

    use super::*;

    fn new_todo(title: &str) -> NewTodo {
        NewTodo {
            title: title.to_string(),
            ..NewTodo::default()
        }
    }

    #[test]
    fn mutations_are_persisted_per_user() {
        let temp = tempdir().expect("tempdir");
        let storage = LocalStorage::open(temp.path()).expect("open storage");

        let mut alice = TodoList::load(storage.clone(), "alice").expect("load alice");
        let first = alice
            .add(NewTodo {
                title: "  Review docs ".to_string(),
                priority: Some(TaskPriority::High),
                attachments: vec![Attachment::link("guide", "http://x")],
                ..NewTodo::default()
            })
            .expect("add");
        let second = alice.add(new_todo("File expenses")).expect("add");
        assert_eq!(first.title, "Review docs");

        assert_eq!(alice.toggle_complete(second.id).expect("toggle"), Some(true));
        assert!(alice.delete(first.id).expect("delete"));
        assert!(!alice.delete(first.id).expect("delete again"));

        let reloaded = TodoList::load(storage.clone(), "alice").expect("reload");
        assert_eq!(reloaded.items().len(), 1);
        assert!(reloaded.items()[0].completed);

        let bob = TodoList::load(storage.clone(), "bob").expect("load bob");
        assert!(bob.items().is_empty());

        assert!(
            storage
                .get_item("calendarTodos_alice")
                .expect("get")
                .is_some()
        );
    }

    #[test]
    fn blank_title_is_rejected_without_writing() {
        let temp = tempdir().expect("tempdir");
        let storage = LocalStorage::open(temp.path()).expect("open storage");
        let mut list = TodoList::load(storage.clone(), "u1").expect("load");

        let err = list.add(new_todo("   ")).expect_err("blank title");
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(storage.get_item(&storage_key("u1")).expect("get"), None);
    }

    #[test]
    fn corrupt_storage_loads_empty() {
        let temp = tempdir().expect("tempdir");
        let storage = LocalStorage::open(temp.path()).expect("open storage");
        storage
            .set_item(&storage_key("u1"), "{not json")
            .expect("seed corrupt");

        let list = TodoList::load(storage, "u1").expect("load");
        assert!(list.items().is_empty());
    }

    #[test]
    fn failed_writes_leave_the_list_untouched() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("local");
        let storage = LocalStorage::open(&dir).expect("open storage");
        let mut list = TodoList::load(storage, "u1").expect("load");
        let kept = list.add(new_todo("keep me")).expect("add");
        let before = list.items().to_vec();

        std::fs::remove_dir_all(&dir).expect("remove storage dir");

        assert!(list.add(new_todo("lost")).is_err());
        assert!(list.toggle_complete(kept.id).is_err());
        assert!(list.delete(kept.id).is_err());
        assert_eq!(list.items(), before.as_slice());
    }

    #[test]
    fn materialized_removal_reports_a_failed_write() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("local");
        let storage = LocalStorage::open(&dir).expect("open storage");
        let mut list = TodoList::load(storage, "u1").expect("load");
        let item = list.add(new_todo("ship it")).expect("add");

        std::fs::remove_dir_all(&dir).expect("remove storage dir");

        assert!(list.remove_materialized(item.id).is_err());
        assert!(!list.contains(item.id));
        assert!(!list.remove_materialized(item.id).expect("already gone"));
    }

    #[test]
    fn resolves_unique_prefixes() {
        let temp = tempdir().expect("tempdir");
        let storage = LocalStorage::open(temp.path()).expect("open storage");
        let mut list = TodoList::load(storage, "u1").expect("load");
        let item = list.add(new_todo("one")).expect("add");

        let full = item.id.to_string();
        assert_eq!(list.resolve(&full).expect("full id"), item.id);
        assert_eq!(list.resolve(&full[..8]).expect("prefix"), item.id);
        assert!(list.resolve("zzzz").is_err());
    }
}
