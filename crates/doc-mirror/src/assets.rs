//! Detection, mirroring and rewriting of binary assets referenced by documents.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tokio_util::sync::CancellationToken;

use crate::error::{RemoteError, SyncError};
use crate::io;
use crate::path;
use crate::remote::{FetchOutcome, Headers, RemoteRepository};
use crate::source::{RepoLocation, SourceConfig};

/// Extensions treated as assets when a source doesn't configure its own.
pub const DEFAULT_ASSET_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "bmp", "pdf", "mp4", "webm",
    "mp3", "zip",
];

static MARKDOWN_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<head>!?\[[^\]]*\]\()(?P<target>[^)\s]+)(?P<tail>(?:\s+"[^"]*")?\))"#)
        .expect("static regex")
});

static HTML_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?P<head>\b(?:src|href)\s*=\s*["'])(?P<target>[^"']+)(?P<tail>["'])"#)
        .expect("static regex")
});

fn strip_query(target: &str) -> &str {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    &target[..end]
}

/// True if `target` is a relative reference with an allowed asset extension.
pub fn is_asset(target: &str, extensions: Option<&[String]>) -> bool {
    if path::is_external(target) {
        return false;
    }

    let Some(ext) = path::extension(strip_query(target)) else {
        return false;
    };
    let ext = ext.to_lowercase();

    match extensions {
        Some(allowed) => allowed
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(&ext)),
        None => DEFAULT_ASSET_EXTENSIONS.contains(&ext.as_str()),
    }
}

/// Relative asset references in first-seen order, without duplicates.
pub fn detect_assets(content: &str, extensions: Option<&[String]>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut found: Vec<(usize, String)> = MARKDOWN_REF
        .captures_iter(content)
        .chain(HTML_REF.captures_iter(content))
        .filter_map(|caps| {
            let target = caps.name("target")?;
            Some((target.start(), target.as_str().to_owned()))
        })
        .filter(|(_, target)| is_asset(target, extensions))
        .collect();

    found.sort_by_key(|(pos, _)| *pos);
    found
        .into_iter()
        .filter_map(|(_, target)| seen.insert(target.clone()).then_some(target))
        .collect()
}

/// Rewrite references whose target is a key of `asset_map`.
/// Everything else is left byte-identical.
pub fn transform_asset_references(content: &str, asset_map: &BTreeMap<String, String>) -> String {
    if asset_map.is_empty() {
        return content.to_owned();
    }

    let swap = |caps: &Captures<'_>| match asset_map.get(&caps["target"]) {
        Some(local) => format!("{}{local}{}", &caps["head"], &caps["tail"]),
        None => caps[0].to_owned(),
    };

    let content = MARKDOWN_REF.replace_all(content, swap);
    HTML_REF.replace_all(&content, swap).into_owned()
}

/// What `download_asset` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetDownload {
    Downloaded,
    AlreadyPresent,
}

/// Mirror one asset to `local_path` unless it already exists there.
pub async fn download_asset(
    remote: &dyn RemoteRepository,
    location: &RepoLocation,
    asset_path: &str,
    local_path: &Path,
    cancel: &CancellationToken,
) -> Result<AssetDownload, SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    if io::exists(local_path).await {
        return Ok(AssetDownload::AlreadyPresent);
    }

    let headers = Headers::new();
    let outcome = tokio::select! {
        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        outcome = remote.fetch_blob(location, asset_path, &headers) => outcome?,
    };

    let FetchOutcome::Fetched(blob) = outcome else {
        return Err(SyncError::Transport(RemoteError::Status {
            status: 304,
            message: format!("unexpected not-modified for unconditional fetch of {asset_path}"),
        }));
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        written = io::write_atomic(local_path, &blob.bytes) => {
            written?;
            Ok(AssetDownload::Downloaded)
        }
    }
}

/// Result of resolving the assets of one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAssets {
    pub content: String,
    pub downloaded: usize,
    /// `(asset path, error)` for assets that could not be mirrored.
    pub failures: Vec<(String, String)>,
}

/// Per-source asset mirroring: where assets go and how content refers to them.
pub struct AssetResolver<'a> {
    remote: &'a dyn RemoteRepository,
    source: &'a SourceConfig,
    location: RepoLocation,
    assets_dir: PathBuf,
    public_base: String,
    cancel: &'a CancellationToken,
}

impl<'a> AssetResolver<'a> {
    /// `None` when the source has no `assets_path`: asset mirroring is off.
    pub fn new(
        remote: &'a dyn RemoteRepository,
        source: &'a SourceConfig,
        output_dir: &Path,
        cancel: &'a CancellationToken,
    ) -> Option<Self> {
        let assets_path = path::normalize(source.assets_path.as_deref()?);
        let public_base = match &source.assets_base_url {
            Some(url) => url.trim_end_matches('/').to_owned(),
            None => format!("/{assets_path}"),
        };

        Some(Self {
            remote,
            source,
            location: source.location(),
            assets_dir: output_dir.join(&assets_path),
            public_base,
            cancel,
        })
    }

    /// Detect, download and rewrite the assets referenced by one document.
    ///
    /// Only cancellation is an error; failed downloads are reported and
    /// their references left pointing at the original path.
    pub async fn resolve(&self, content: &str, remote_path: &str) -> Result<ResolvedAssets, SyncError> {
        let extensions = self.source.asset_extensions.as_deref();
        let mut asset_map = BTreeMap::new();
        let mut resolved = ResolvedAssets::default();

        for reference in detect_assets(content, extensions) {
            let Some(asset_path) =
                path::resolve_relative(path::parent(remote_path), strip_query(&reference))
            else {
                resolved
                    .failures
                    .push((reference.clone(), "reference escapes the repository root".into()));
                continue;
            };

            let local_name = path::relative_to_root(&self.source.path, &asset_path)
                .filter(|rel| !rel.is_empty())
                .unwrap_or_else(|| asset_path.clone());
            let local_path = self.assets_dir.join(&local_name);

            match download_asset(
                self.remote,
                &self.location,
                &asset_path,
                &local_path,
                self.cancel,
            )
            .await
            {
                Ok(status) => {
                    if status == AssetDownload::Downloaded {
                        resolved.downloaded += 1;
                    }
                    asset_map.insert(reference, format!("{}/{local_name}", self.public_base));
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        source = %self.source.label(),
                        asset = %asset_path,
                        error = %e,
                        "asset download failed"
                    );
                    resolved.failures.push((asset_path, e.to_string()));
                }
            }
        }

        resolved.content = transform_asset_references(content, &asset_map);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::InMemoryRemote;

    use super::*;

    #[test]
    fn detects_markdown_and_html_references_in_order() {
        let content = r#"
![diagram](./images/flow.svg)
<img src="img/photo.JPG" alt="x">
[download](files/guide.pdf "Guide")
![again](./images/flow.svg)
[page](other.md)
"#;
        assert_eq!(
            detect_assets(content, None),
            vec!["./images/flow.svg", "img/photo.JPG", "files/guide.pdf"]
        );
    }

    #[test]
    fn ignores_external_references() {
        let content = "![x](https://cdn.example.com/a.png) ![y](data:image/png;base64,AAAA)";
        assert!(detect_assets(content, None).is_empty());
    }

    #[test]
    fn custom_allowlist_replaces_default() {
        let content = "![a](a.png) [b](b.drawio)";
        let allowed = vec!["drawio".to_owned()];
        assert_eq!(detect_assets(content, Some(allowed.as_slice())), vec!["b.drawio"]);
    }

    #[test]
    fn rewrites_only_mapped_references() {
        let content = "![a](./a.png) ![b](./b.png) <img src=\"./a.png\">";
        let map = BTreeMap::from([("./a.png".to_owned(), "/assets/a.png".to_owned())]);

        let out = transform_asset_references(content, &map);
        assert_eq!(
            out,
            "![a](/assets/a.png) ![b](./b.png) <img src=\"/assets/a.png\">"
        );
    }

    #[test]
    fn empty_map_is_identity() {
        let content = "![a](./a.png)";
        assert_eq!(transform_asset_references(content, &BTreeMap::new()), content);
    }

    #[tokio::test]
    async fn download_skips_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.png");
        std::fs::write(&local, b"old").unwrap();

        let remote = InMemoryRemote::new();
        remote.add_file("docs/a.png", b"new".to_vec());
        let source = SourceConfig::new("acme", "docs", "docs", "out");

        let status = download_asset(
            &remote,
            &source.location(),
            "docs/a.png",
            &local,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(status, AssetDownload::AlreadyPresent);
        assert_eq!(remote.fetch_count(), 0);
        assert_eq!(std::fs::read(&local).unwrap(), b"old");
    }

    #[tokio::test]
    async fn download_writes_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("images/a.png");

        let remote = InMemoryRemote::new();
        remote.add_file("docs/images/a.png", b"png".to_vec());
        let source = SourceConfig::new("acme", "docs", "docs", "out");

        let status = download_asset(
            &remote,
            &source.location(),
            "docs/images/a.png",
            &local,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(status, AssetDownload::Downloaded);
        assert_eq!(remote.fetch_count(), 1);
        assert_eq!(std::fs::read(&local).unwrap(), b"png");
    }

    #[tokio::test]
    async fn download_honours_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("a.png");
        let remote = InMemoryRemote::new();
        remote.add_file("docs/a.png", b"png".to_vec());
        let source = SourceConfig::new("acme", "docs", "docs", "out");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result =
            download_asset(&remote, &source.location(), "docs/a.png", &local, &cancel).await;

        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn resolver_mirrors_and_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let remote = InMemoryRemote::new();
        remote.add_file("docs/features/images/flow.png", b"png".to_vec());
        let source = SourceConfig::new("acme", "docs", "docs/features", "content/features")
            .with_assets("public/assets/features");
        let cancel = CancellationToken::new();

        let resolver = AssetResolver::new(&remote, &source, dir.path(), &cancel).unwrap();
        let resolved = resolver
            .resolve(
                "![flow](./images/flow.png) ![gone](./images/missing.png)",
                "docs/features/accounts.md",
            )
            .await
            .unwrap();

        assert_eq!(
            resolved.content,
            "![flow](/public/assets/features/images/flow.png) ![gone](./images/missing.png)"
        );
        assert_eq!(resolved.downloaded, 1);
        assert_eq!(resolved.failures.len(), 1);
        assert_eq!(resolved.failures[0].0, "docs/features/images/missing.png");
        assert_eq!(
            std::fs::read(dir.path().join("public/assets/features/images/flow.png")).unwrap(),
            b"png"
        );
    }

    #[test]
    fn resolver_disabled_without_assets_path() {
        let remote = InMemoryRemote::new();
        let source = SourceConfig::new("acme", "docs", "docs", "content");
        let cancel = CancellationToken::new();
        assert!(AssetResolver::new(&remote, &source, Path::new("."), &cancel).is_none());
    }
}
