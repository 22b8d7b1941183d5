use crate::entry::{EntryId, ImportedFile, StoreEntry};
use crate::error::SyncError;
use crate::io;

use super::SyncContext;

/// Where an imported file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: EntryId,
    pub file_path: String,
    /// False when the store already held an entry with the same digest.
    pub changed: bool,
}

/// Persist one processed file: mirror it to disk and upsert it into the store.
///
/// The disk copy is written only when nothing exists at the destination yet;
/// the store's digest decides whether the entry changed. With `clear`, an
/// existing entry is replaced as a single store operation. A failing render
/// step is logged and the entry is stored without rendered output.
pub async fn store_processed_file(
    file: &ImportedFile,
    ctx: &SyncContext<'_>,
    clear: bool,
) -> Result<StoredFile, SyncError> {
    let handler = file
        .extension()
        .and_then(|ext| ctx.registry.get(ext))
        .ok_or_else(|| {
            SyncError::Configuration(format!(
                "no entry-type handler registered for {}",
                file.local_path
            ))
        })?;

    let disk_path = ctx.output_dir.join(&file.local_path);
    if !io::exists(&disk_path).await {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(SyncError::Cancelled),
            written = io::write_atomic(&disk_path, file.content.as_bytes()) => written?,
        }
        tracing::debug!(path = %disk_path.display(), "wrote mirror file");
    }

    let stored = StoredFile {
        id: file.id.clone(),
        file_path: file.local_path.clone(),
        changed: true,
    };

    let existing = ctx.store.get(&file.id)?;
    if !clear && existing.as_ref().is_some_and(|e| e.digest == file.digest) {
        tracing::debug!(id = %file.id, "digest unchanged, skipping store write");
        return Ok(StoredFile {
            changed: false,
            ..stored
        });
    }

    let parsed = handler.parse(&file.content, &file.local_path)?;

    let rendered = match handler.render(&parsed) {
        None => None,
        Some(Ok(html)) => Some(html),
        Some(Err(e)) => {
            let error = SyncError::Render {
                id: file.id.clone(),
                message: e.to_string(),
            };
            tracing::warn!(
                path = %file.source_path,
                error = %error,
                "storing entry without rendered output"
            );
            None
        }
    };

    let entry = StoreEntry {
        id: file.id.clone(),
        data: parsed.data,
        body: parsed.body,
        digest: file.digest.clone(),
        file_path: file.local_path.clone(),
        rendered,
    };

    if clear && existing.is_some() {
        ctx.store.replace(entry)?;
    } else {
        ctx.store.set(entry)?;
    }

    Ok(stored)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::entry::digest;
    use crate::error::HandlerError;
    use crate::handler::{EntryTypeHandler, EntryTypeRegistry, ParsedContent, TextHandler};
    use crate::store::ContentStore;
    use crate::test_support::{InMemoryContentStore, InMemoryMetadataStore, InMemoryRemote};

    use super::*;

    struct BrokenRender;

    impl EntryTypeHandler for BrokenRender {
        fn parse(&self, contents: &str, _: &str) -> Result<ParsedContent, HandlerError> {
            TextHandler.parse(contents, "")
        }

        fn render(&self, _: &ParsedContent) -> Option<Result<String, HandlerError>> {
            Some(Err(HandlerError::Render("template exploded".into())))
        }
    }

    struct Fixture {
        remote: InMemoryRemote,
        metadata: InMemoryMetadataStore,
        store: InMemoryContentStore,
        registry: EntryTypeRegistry,
        cancel: CancellationToken,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                remote: InMemoryRemote::new(),
                metadata: InMemoryMetadataStore::new(),
                store: InMemoryContentStore::new(),
                registry: EntryTypeRegistry::with_defaults(),
                cancel: CancellationToken::new(),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn ctx(&self) -> SyncContext<'_> {
            SyncContext {
                remote: &self.remote,
                metadata: &self.metadata,
                store: &self.store,
                registry: &self.registry,
                output_dir: self.dir.path(),
                cancel: &self.cancel,
            }
        }

        fn path(&self, local: &str) -> std::path::PathBuf {
            self.dir.path().join(local)
        }
    }

    fn file(local_path: &str, content: &str) -> ImportedFile {
        ImportedFile {
            id: crate::path::generate_id(&crate::path::IdOptions {
                path: local_path,
                replace: None,
            }),
            source_path: format!("docs/{local_path}"),
            local_path: local_path.to_owned(),
            content: content.to_owned(),
            digest: digest(content),
        }
    }

    #[tokio::test]
    async fn stores_parsed_and_rendered_entry() {
        let fx = Fixture::new();
        let imported = file("content/tasks.md", "---\ntitle: Tasks\n---\n# Tasks\n");

        let stored = store_processed_file(&imported, &fx.ctx(), false).await.unwrap();

        assert_eq!(stored.id.as_str(), "content/tasks");
        assert!(stored.changed);
        let entry = fx.store.get(&stored.id).unwrap().unwrap();
        assert_eq!(entry.data["title"], "Tasks");
        assert_eq!(entry.body, "# Tasks\n");
        assert_eq!(entry.digest, imported.digest);
        assert!(entry.rendered.unwrap().contains("<h1>Tasks</h1>"));
        assert_eq!(
            std::fs::read_to_string(fx.path("content/tasks.md")).unwrap(),
            imported.content
        );
    }

    #[tokio::test]
    async fn missing_handler_is_configuration_error() {
        let fx = Fixture::new();
        let result = store_processed_file(&file("content/data.yml", "a: 1"), &fx.ctx(), false).await;
        assert!(matches!(result, Err(SyncError::Configuration(_))));
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn existing_disk_file_is_not_overwritten() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.path("content")).unwrap();
        std::fs::write(fx.path("content/tasks.md"), "edited by hand").unwrap();

        store_processed_file(&file("content/tasks.md", "# Tasks\n"), &fx.ctx(), false)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(fx.path("content/tasks.md")).unwrap(),
            "edited by hand"
        );
        let entry = fx.store.get(&EntryId::new("content/tasks")).unwrap().unwrap();
        assert_eq!(entry.body, "# Tasks\n");
    }

    #[tokio::test]
    async fn equal_digest_skips_store_write() {
        let fx = Fixture::new();
        let imported = file("content/tasks.md", "# Tasks\n");
        store_processed_file(&imported, &fx.ctx(), false).await.unwrap();
        let mutations = fx.store.mutations();

        let stored = store_processed_file(&imported, &fx.ctx(), false).await.unwrap();

        assert!(!stored.changed);
        assert_eq!(fx.store.mutations(), mutations);
    }

    #[tokio::test]
    async fn clear_replaces_existing_entry() {
        let fx = Fixture::new();
        store_processed_file(&file("content/tasks.md", "# Old\n"), &fx.ctx(), false)
            .await
            .unwrap();

        store_processed_file(&file("content/tasks.md", "# New\n"), &fx.ctx(), true)
            .await
            .unwrap();

        assert_eq!(fx.store.len(), 1);
        let entry = fx.store.get(&EntryId::new("content/tasks")).unwrap().unwrap();
        assert_eq!(entry.body, "# New\n");
    }

    #[tokio::test]
    async fn render_failure_still_stores_entry() {
        let mut fx = Fixture::new();
        fx.registry.register("md", Arc::new(BrokenRender));

        store_processed_file(&file("content/tasks.md", "# Tasks\n"), &fx.ctx(), false)
            .await
            .unwrap();

        let entry = fx.store.get(&EntryId::new("content/tasks")).unwrap().unwrap();
        assert_eq!(entry.body, "# Tasks\n");
        assert_eq!(entry.rendered, None);
    }

    #[tokio::test]
    async fn text_files_have_no_rendered_output() {
        let fx = Fixture::new();
        store_processed_file(&file("content/notes.txt", "plain"), &fx.ctx(), false)
            .await
            .unwrap();

        let entry = fx.store.get(&EntryId::new("content/notes")).unwrap().unwrap();
        assert_eq!(entry.body, "plain");
        assert_eq!(entry.rendered, None);
    }
}
