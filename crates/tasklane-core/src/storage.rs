use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::error::{CoreError, Result};

/// Client-local key/value storage, one file per key.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
}

impl LocalStorage {
    #[instrument(skip(dir))]
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        debug!(dir = %dir.display(), "opened local storage");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, value), fields(len = value.len()))]
    pub fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path).map_err(|err| CoreError::Io(err.error))?;
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid =
            !key.is_empty() && !key.starts_with('.') && !key.contains(['/', '\\', '\0']);
        if !valid {
            return Err(CoreError::validation(format!(
                "invalid storage key: {key:?}"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn items_roundtrip_and_remove() {
        let temp = tempdir().expect("tempdir");
        let storage = LocalStorage::open(temp.path()).expect("open storage");

        assert_eq!(storage.get_item("calendarTodos_u1").expect("get"), None);
        storage.set_item("calendarTodos_u1", "[]").expect("set");
        assert_eq!(
            storage.get_item("calendarTodos_u1").expect("get"),
            Some("[]".to_string())
        );

        storage.remove_item("calendarTodos_u1").expect("remove");
        storage.remove_item("calendarTodos_u1").expect("remove twice");
        assert_eq!(storage.get_item("calendarTodos_u1").expect("get"), None);
    }

    #[test]
    fn rejects_path_like_keys() {
        let temp = tempdir().expect("tempdir");
        let storage = LocalStorage::open(temp.path()).expect("open storage");

        assert!(storage.set_item("../escape", "x").is_err());
        assert!(storage.get_item("").is_err());
        assert!(storage.get_item(".hidden").is_err());
    }
}
