use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::transform::Transform;

/// Owner, repository and ref: everything the transport needs to address a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
}

/// A rewrite rule applied to link targets during link rewriting.
///
/// `global` rules apply to every link; the rest only to links that are
/// still unresolved after relative-document resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMapping {
    pub pattern: String,
    pub replacement: String,
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// One remote subtree to mirror. Read-only to the engine.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: Option<String>,
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
    /// Root path inside the repository. Empty means the repository root.
    pub path: String,
    /// Local destination base, relative to the output directory.
    pub base_path: String,
    /// Substring removed once from destination paths when deriving ids.
    pub replace: Option<String>,
    pub enabled: bool,
    pub transforms: Vec<Transform>,
    /// Remote-relative path -> destination-relative path.
    pub path_mappings: BTreeMap<String, String>,
    pub link_mappings: Vec<LinkMapping>,
    pub asset_extensions: Option<Vec<String>>,
    /// Local directory (relative to the output directory) that mirrored assets land in.
    pub assets_path: Option<String>,
    /// URL prefix written into content for mirrored assets.
    pub assets_base_url: Option<String>,
    pub include: Vec<String>,
    pub rewrite_links: bool,
}

impl SourceConfig {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        path: impl Into<String>,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            name: None,
            owner: owner.into(),
            repo: repo.into(),
            git_ref: "main".into(),
            path: path.into(),
            base_path: base_path.into(),
            replace: None,
            enabled: true,
            transforms: Vec::new(),
            path_mappings: BTreeMap::new(),
            link_mappings: Vec::new(),
            asset_extensions: None,
            assets_path: None,
            assets_base_url: None,
            include: Vec::new(),
            rewrite_links: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    pub fn with_replace(mut self, replace: impl Into<String>) -> Self {
        self.replace = Some(replace.into());
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_assets(mut self, assets_path: impl Into<String>) -> Self {
        self.assets_path = Some(assets_path.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Human-readable label for logs and reports.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}/{}", self.owner, self.repo),
        }
    }

    /// Identity used to key the source's watermark.
    pub fn key(&self) -> String {
        format!(
            "{}/{}@{}:{}",
            self.owner,
            self.repo,
            self.git_ref,
            crate::path::normalize(&self.path)
        )
    }

    /// Digest of every setting that shapes the mirrored output.
    ///
    /// Recorded with the watermark: a different fingerprint means the next
    /// sync walks the tree even if the upstream commit has not moved.
    pub fn fingerprint(&self) -> String {
        let settings = serde_json::json!({
            "base_path": crate::path::normalize(self.base_path.trim()),
            "replace": self.replace,
            "transforms": self.transforms.iter().map(Transform::signature).collect::<Vec<_>>(),
            "path_mappings": self.path_mappings,
            "link_mappings": self.link_mappings,
            "asset_extensions": self.asset_extensions,
            "assets_path": self.assets_path,
            "assets_base_url": self.assets_base_url,
            "include": self.include,
            "rewrite_links": self.rewrite_links,
        });
        crate::entry::digest(&settings.to_string())
    }

    pub fn location(&self) -> RepoLocation {
        RepoLocation {
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            git_ref: self.git_ref.clone(),
        }
    }

    /// Reject configurations that cannot address a remote tree or a destination.
    pub fn validate(&self) -> Result<(), SyncError> {
        for (field, value) in [
            ("owner", &self.owner),
            ("repo", &self.repo),
            ("ref", &self.git_ref),
        ] {
            if value.trim().is_empty() {
                return Err(SyncError::Configuration(format!(
                    "source {} has an empty {field}",
                    self.label()
                )));
            }
        }

        if crate::path::normalize(self.base_path.trim()).is_empty() {
            return Err(SyncError::Configuration(format!(
                "source {} has no destination base path",
                self.label()
            )));
        }

        for mapping in &self.link_mappings {
            regex::Regex::new(&mapping.pattern).map_err(|e| {
                SyncError::Configuration(format!(
                    "invalid link mapping pattern `{}`: {e}",
                    mapping.pattern
                ))
            })?;
        }

        for pattern in &self.include {
            globset::Glob::new(pattern).map_err(|e| {
                SyncError::Configuration(format!("invalid include pattern `{pattern}`: {e}"))
            })?;
        }

        Ok(())
    }
}
