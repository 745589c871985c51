//! Upload seam and a directory-backed uploader.

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use tasklane_shared::{LocalFile, UploadedFile};
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub const UPLOAD_URL_PREFIX: &str = "/uploads";

#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    async fn upload(&self, file: &LocalFile) -> anyhow::Result<UploadedFile>;
}

/// Copies files into an uploads directory and hands back a server-relative
/// URL for them.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
    dir: PathBuf,
}

impl DirectoryUploader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path behind a URL this uploader produced.
    pub fn resolve_url(&self, url: &str) -> Option<PathBuf> {
        let stored = url.strip_prefix(UPLOAD_URL_PREFIX)?.strip_prefix('/')?;
        if stored.is_empty() || stored.contains(['/', '\\']) {
            return None;
        }
        Some(self.dir.join(stored))
    }
}

#[async_trait]
impl AttachmentUploader for DirectoryUploader {
    #[instrument(skip(self, file), fields(path = %file.path.display()))]
    async fn upload(&self, file: &LocalFile) -> anyhow::Result<UploadedFile> {
        let name = file
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .map(sanitize_filename)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow!("{} has no usable file name", file.path.display()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let stored = format!("{}-{name}", Uuid::new_v4());
        let target = self.dir.join(&stored);
        let bytes = tokio::fs::copy(&file.path, &target)
            .await
            .with_context(|| format!("failed to read {}", file.path.display()))?;

        debug!(stored = %stored, bytes, "copied upload");
        info!(name = %name, "uploaded attachment");
        Ok(UploadedFile {
            url: format!("{UPLOAD_URL_PREFIX}/{stored}"),
            name,
        })
    }
}

/// Strip path separators and NULs; cap at 255 chars.
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| *c != '/' && *c != '\\' && *c != '\0')
        .take(255)
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_filename("normal.txt"), "normal.txt");
        assert_eq!(sanitize_filename("a\\b\0c.txt"), "abc.txt");
        assert_eq!(sanitize_filename(&"x".repeat(300)).len(), 255);
    }

    #[tokio::test]
    async fn copies_file_and_returns_relative_url() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("report.pdf");
        std::fs::write(&source, b"%PDF").expect("write source");

        let uploader = DirectoryUploader::new(temp.path().join("uploads"));
        let uploaded = uploader
            .upload(&LocalFile {
                path: source,
                mime_type: None,
            })
            .await
            .expect("upload");

        assert_eq!(uploaded.name, "report.pdf");
        assert!(uploaded.url.starts_with("/uploads/"));
        assert!(uploaded.url.ends_with("-report.pdf"));

        let stored = uploader.resolve_url(&uploaded.url).expect("resolvable");
        assert_eq!(std::fs::read(stored).expect("read stored"), b"%PDF");
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let uploader = DirectoryUploader::new(temp.path().join("uploads"));

        let result = uploader
            .upload(&LocalFile {
                path: temp.path().join("gone.png"),
                mime_type: None,
            })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn resolve_url_rejects_foreign_paths() {
        let uploader = DirectoryUploader::new("/srv/uploads");
        assert!(uploader.resolve_url("/uploads/../etc/passwd").is_none());
        assert!(uploader.resolve_url("http://x/uploads/a").is_none());
        assert_eq!(
            uploader.resolve_url("/uploads/abc-a.png"),
            Some(PathBuf::from("/srv/uploads/abc-a.png"))
        );
    }
}
