//! Turns a mixed attachment list into the form a task record stores.
//!
//! Pending attachments (local file, no URL) are uploaded one at a time; the
//! first failure aborts the whole call so no half-resolved list escapes.
//! Everything else, links included, is kept as-is.

use tasklane_shared::{Attachment, AttachmentSource};
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};
use crate::uploads::AttachmentUploader;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partitioned {
    pub pending: Vec<Attachment>,
    pub resolved: Vec<Attachment>,
}

pub fn partition(attachments: &[Attachment]) -> Partitioned {
    let (pending, resolved) = attachments
        .iter()
        .cloned()
        .partition(Attachment::is_pending);
    Partitioned { pending, resolved }
}

/// Upload each pending attachment exactly once, in order. Only `url`
/// changes; id, kind, name and size are carried over.
#[instrument(skip_all, fields(count = pending.len()))]
pub async fn upload_all(
    pending: Vec<Attachment>,
    uploader: &dyn AttachmentUploader,
) -> Result<Vec<Attachment>> {
    let mut uploaded = Vec::with_capacity(pending.len());

    for attachment in pending {
        let Some(file) = attachment.pending_file() else {
            uploaded.push(attachment);
            continue;
        };

        let result = match uploader.upload(file).await {
            Ok(result) => result,
            Err(err) => {
                warn!(name = %attachment.name, error = %err, "attachment upload failed");
                return Err(CoreError::Upload {
                    name: attachment.name.clone(),
                    source: err.into(),
                });
            }
        };

        debug!(name = %attachment.name, url = %result.url, "attachment uploaded");
        uploaded.push(Attachment {
            source: AttachmentSource::Resolved { url: result.url },
            ..attachment
        });
    }

    Ok(uploaded)
}

/// Collapse a trailing repeated extension: `x.png.png` -> `x.png`.
///
/// Needs at least three dot-separated segments, and the comparison is
/// case-sensitive. Empty segments (`x..`) are never collapsed. A run such as `x.png.png.png` collapses fully, so the
/// result is stable under repeated application.
pub fn dedupe_name(name: &str) -> String {
    let mut segments: Vec<&str> = name.split('.').collect();
    while let [.., prev, last] = segments[..]
        && segments.len() >= 3
        && !last.is_empty()
        && prev == last
    {
        segments.pop();
    }
    segments.join(".")
}

/// Uploaded attachments first, then the ones that were already resolved,
/// each in input order; names are de-duplicated last.
#[instrument(skip_all, fields(count = attachments.len()))]
pub async fn reconcile(
    attachments: &[Attachment],
    uploader: &dyn AttachmentUploader,
) -> Result<Vec<Attachment>> {
    let Partitioned { pending, resolved } = partition(attachments);
    let pending_count = pending.len();

    let mut merged = upload_all(pending, uploader).await?;
    merged.extend(resolved);

    for attachment in &mut merged {
        let deduped = dedupe_name(&attachment.name);
        if deduped != attachment.name {
            debug!(from = %attachment.name, to = %deduped, "normalized attachment name");
            attachment.name = deduped;
        }
    }

    if pending_count > 0 {
        info!(uploaded = pending_count, total = merged.len(), "reconciled attachments");
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use tasklane_shared::{AttachmentKind, LocalFile, UploadedFile};

    use super::*;

    /// Hands out `/uploads/<n>` and fails on the configured call.
    #[derive(Default)]
    struct CountingUploader {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl AttachmentUploader for CountingUploader {
        async fn upload(&self, file: &LocalFile) -> anyhow::Result<UploadedFile> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(n) {
                return Err(anyhow!("disk full"));
            }
            Ok(UploadedFile {
                url: format!("/uploads/{n}"),
                name: file.path.display().to_string(),
            })
        }
    }

    #[test]
    fn dedupe_examples() {
        assert_eq!(dedupe_name("test.png"), "test.png");
        assert_eq!(dedupe_name("test.png.png"), "test.png");
        assert_eq!(dedupe_name("document.pdf.pdf"), "document.pdf");
        assert_eq!(dedupe_name("file.txt.backup.txt"), "file.txt.backup.txt");
        assert_eq!(dedupe_name("photo.PNG.png"), "photo.PNG.png");
        assert_eq!(dedupe_name("png.png"), "png.png");
        assert_eq!(dedupe_name("noext"), "noext");
        assert_eq!(dedupe_name("x.."), "x..");
        assert_eq!(dedupe_name("a..."), "a...");
    }

    #[test]
    fn dedupe_is_idempotent() {
        for name in [
            "test.png",
            "test.png.png",
            "a.png.png.png",
            "file.txt.backup.txt",
            "archive.tar.gz.gz",
            ".env.env",
            "x..",
            "",
        ] {
            let once = dedupe_name(name);
            assert_eq!(dedupe_name(&once), once, "input {name:?}");
        }
    }

    #[test]
    fn partition_splits_on_pending_file() {
        let list = vec![
            Attachment::pending(AttachmentKind::Photo, "a.png", "/tmp/a.png"),
            Attachment::link("docs", "http://x"),
            Attachment::resolved(AttachmentKind::Document, "b.pdf", "/uploads/b.pdf"),
        ];
        let parts = partition(&list);
        assert_eq!(parts.pending.len(), 1);
        assert_eq!(parts.resolved.len(), 2);
        assert_eq!(parts.pending[0].name, "a.png");
    }

    #[tokio::test]
    async fn reconcile_puts_uploads_first_and_keeps_identity() {
        let mut pending = Attachment::pending(AttachmentKind::Photo, "shot.png.png", "/tmp/shot.png");
        pending.size = Some(42);
        let link = Attachment::link("x", "http://x");
        let list = vec![link.clone(), pending.clone()];

        let uploader = CountingUploader::default();
        let merged = reconcile(&list, &uploader).await.expect("reconcile");

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, pending.id);
        assert_eq!(merged[0].kind, AttachmentKind::Photo);
        assert_eq!(merged[0].size, Some(42));
        assert_eq!(merged[0].name, "shot.png");
        assert_eq!(merged[0].url(), Some("/uploads/1"));
        assert_eq!(merged[1], link);
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_upload_aborts_and_names_the_file() {
        let list = vec![
            Attachment::pending(AttachmentKind::Photo, "first.png", "/tmp/first.png"),
            Attachment::pending(AttachmentKind::Document, "second.pdf", "/tmp/second.pdf"),
            Attachment::pending(AttachmentKind::Document, "third.pdf", "/tmp/third.pdf"),
        ];
        let uploader = CountingUploader {
            fail_on: Some(2),
            ..CountingUploader::default()
        };

        let err = reconcile(&list, &uploader).await.expect_err("second upload fails");
        assert_eq!(err.failed_attachment(), Some("second.pdf"));
        assert!(err.to_string().contains("disk full"));
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn nothing_pending_means_no_uploads() {
        let list = vec![Attachment::link("x.html.html", "http://x")];
        let uploader = CountingUploader::default();
        let merged = reconcile(&list, &uploader).await.expect("reconcile");
        assert_eq!(merged[0].name, "x.html");
        assert_eq!(uploader.calls.load(Ordering::SeqCst), 0);
    }
}
