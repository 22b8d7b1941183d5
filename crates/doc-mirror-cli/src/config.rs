use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use doc_mirror::transform::{self, Transform};
use doc_mirror::{LinkMapping, SourceConfig};
use serde::Deserialize;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Root that destination paths resolve against.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Database holding entries, validators and watermarks.
    pub database: Option<PathBuf>,
    #[serde(default = "default_source_delay_ms")]
    pub source_delay_ms: u64,
    /// Override for GitHub Enterprise.
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

/// A single source definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceEntry {
    pub name: Option<String>,
    pub owner: String,
    pub repo: String,
    #[serde(rename = "ref", default = "default_ref")]
    pub git_ref: String,
    #[serde(default)]
    pub path: String,
    pub base_path: String,
    pub replace: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
    #[serde(default)]
    pub path_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub link_mappings: Vec<LinkMapping>,
    pub asset_extensions: Option<Vec<String>>,
    pub assets_path: Option<String>,
    pub assets_base_url: Option<String>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default = "default_true")]
    pub rewrite_links: bool,
}

/// A built-in transform, by name or with parameters.
///
/// ```toml
/// transforms = [
///     "title-from-heading",
///     { name = "set-frontmatter", fields = { sidebar = true } },
///     { name = "strip-frontmatter-keys", keys = ["draft"] },
/// ]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TransformSpec {
    Named(String),
    Configured {
        name: String,
        #[serde(default)]
        fields: BTreeMap<String, toml::Value>,
        #[serde(default)]
        keys: Vec<String>,
    },
}

impl TransformSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) | Self::Configured { name, .. } => name,
        }
    }

    pub fn build(&self) -> Result<Transform> {
        match self {
            Self::Configured { name, fields, .. } if name == "set-frontmatter" => {
                let fields = fields
                    .iter()
                    .map(|(key, value)| {
                        let value = serde_yaml_ng::to_value(value)
                            .with_context(|| format!("set-frontmatter field `{key}`"))?;
                        Ok((key.clone(), value))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(transform::set_frontmatter(fields))
            }
            Self::Configured { name, keys, .. } if name == "strip-frontmatter-keys" => {
                Ok(transform::strip_frontmatter_keys(keys.clone()))
            }
            other => transform::builtin(other.name())
                .with_context(|| format!("unknown transform `{}`", other.name())),
        }
    }
}

impl SourceEntry {
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.owner, self.repo))
    }

    /// Build the engine's view of this source, resolving transforms by name.
    pub fn to_source(&self) -> Result<SourceConfig> {
        let transforms = self
            .transforms
            .iter()
            .map(TransformSpec::build)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("source {}", self.label()))?;

        Ok(SourceConfig {
            name: self.name.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            git_ref: self.git_ref.clone(),
            path: self.path.clone(),
            base_path: self.base_path.clone(),
            replace: self.replace.clone(),
            enabled: self.enabled,
            transforms,
            path_mappings: self.path_mappings.clone(),
            link_mappings: self.link_mappings.clone(),
            asset_extensions: self.asset_extensions.clone(),
            assets_path: self.assets_path.clone(),
            assets_base_url: self.assets_base_url.clone(),
            include: self.include.clone(),
            rewrite_links: self.rewrite_links,
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_ref() -> String {
    "main".into()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_source_delay_ms() -> u64 {
    1000
}

/// Config file path: `~/.config/doc-mirror/sources.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("doc-mirror").join("sources.toml"))
}

/// Load config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_path().context("could not determine config directory")?,
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;

    parse_config(&contents).with_context(|| format!("failed to parse config at {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    Ok(toml::from_str(contents)?)
}

/// A configured source that could not be turned into a [`SourceConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSource {
    pub label: String,
    pub error: String,
}

/// The outcome of resolving the config file's sources, in config order.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSources {
    pub sources: Vec<SourceConfig>,
    /// Entries that failed to resolve. Reported by every command.
    pub invalid: Vec<InvalidSource>,
}

impl ResolvedSources {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.invalid.is_empty()
    }

    /// Only the entries labelled `name`, valid or not.
    pub fn named(&self, name: &str) -> Self {
        Self {
            sources: self
                .sources
                .iter()
                .filter(|s| s.label() == name)
                .cloned()
                .collect(),
            invalid: self
                .invalid
                .iter()
                .filter(|i| i.label == name)
                .cloned()
                .collect(),
        }
    }
}

/// Resolve every configured source. A source that fails to resolve is
/// logged and kept aside as invalid; the others proceed.
pub fn resolve_sources(entries: &[SourceEntry]) -> ResolvedSources {
    let mut resolved = ResolvedSources::default();

    for entry in entries {
        match entry.to_source() {
            Ok(source) => resolved.sources.push(source),
            Err(e) => {
                let error = format!("{e:#}");
                tracing::error!(
                    source = %entry.label(),
                    owner = %entry.owner,
                    repo = %entry.repo,
                    error = %error,
                    "invalid source configuration"
                );
                resolved.invalid.push(InvalidSource {
                    label: entry.label(),
                    error,
                });
            }
        }
    }

    resolved
}
