use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::SyncError;
use crate::path::{self, IdOptions, PathOptions, ROOT_ID};
use crate::source::SourceConfig;

static LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?P<bang>!?)\[(?P<text>[^\]]*)\]\((?P<target>[^)\s]+)(?P<title>\s+"[^"]*")?\)"#)
        .expect("static regex")
});

const DOCUMENT_EXTENSIONS: &[&str] = &["md", "mdx"];

struct CompiledMapping {
    regex: Regex,
    replacement: String,
    global: bool,
}

/// Rewrites markdown link targets for one source.
pub struct LinkRewriter<'a> {
    source: &'a SourceConfig,
    mappings: Vec<CompiledMapping>,
}

impl<'a> LinkRewriter<'a> {
    pub fn new(source: &'a SourceConfig) -> Result<Self, SyncError> {
        let mappings = source
            .link_mappings
            .iter()
            .map(|m| {
                Regex::new(&m.pattern)
                    .map(|regex| CompiledMapping {
                        regex,
                        replacement: m.replacement.clone(),
                        global: m.global,
                    })
                    .map_err(|e| {
                        SyncError::Configuration(format!(
                            "invalid link mapping pattern `{}`: {e}",
                            m.pattern
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { source, mappings })
    }

    /// Rewrite every non-image link in `content`.
    /// `remote_path` is the repository path of the file being rewritten.
    pub fn rewrite(&self, content: &str, remote_path: &str) -> String {
        LINK.replace_all(content, |caps: &Captures<'_>| {
            if !caps["bang"].is_empty() {
                return caps[0].to_owned();
            }

            let target = self.rewrite_target(&caps["target"], remote_path);
            let title = caps.name("title").map(|m| m.as_str()).unwrap_or("");
            format!("[{}]({target}{title})", &caps["text"])
        })
        .into_owned()
    }

    fn rewrite_target(&self, target: &str, remote_path: &str) -> String {
        let mut target = self.apply_mappings(target, true);

        if path::is_external(&target) || target.starts_with('/') {
            return target;
        }

        match self.resolve_document(&target, remote_path) {
            Some(resolved) => resolved,
            None => {
                target = self.apply_mappings(&target, false);
                target
            }
        }
    }

    fn apply_mappings(&self, target: &str, global: bool) -> String {
        self.mappings
            .iter()
            .filter(|m| m.global == global)
            .fold(target.to_owned(), |current, m| {
                m.regex
                    .replace_all(&current, m.replacement.as_str())
                    .into_owned()
            })
    }

    /// Site URL for a relative link to a document inside the source root.
    fn resolve_document(&self, target: &str, remote_path: &str) -> Option<String> {
        let (file, fragment) = match target.split_once('#') {
            Some((file, fragment)) => (file, Some(fragment)),
            None => (target, None),
        };

        if !is_document(file) {
            return None;
        }

        let resolved = path::resolve_relative(path::parent(remote_path), file)?;
        let relative = path::relative_to_root(&self.source.path, &resolved)?;
        let local = path::generate_path(
            &PathOptions {
                base_path: &self.source.base_path,
                path_mappings: &self.source.path_mappings,
            },
            Some(&relative),
        );
        if local.is_empty() {
            return None;
        }

        let id = path::generate_id(&IdOptions {
            path: &local,
            replace: self.source.replace.as_deref(),
        });

        let mut url = site_url(id.as_str());
        if let Some(fragment) = fragment {
            url.push('#');
            url.push_str(fragment);
        }
        Some(url)
    }
}

/// True for markdown documents, the only files whose links are rewritten.
pub fn is_document(path: &str) -> bool {
    path::extension(path).is_some_and(|ext| {
        DOCUMENT_EXTENSIONS
            .iter()
            .any(|doc| doc.eq_ignore_ascii_case(ext))
    })
}

/// `/<id>/`, with a trailing `index` segment folded into its directory.
pub fn site_url(id: &str) -> String {
    let slug = if id == ROOT_ID {
        ""
    } else {
        id.strip_suffix("/index").unwrap_or(id)
    };

    if slug.is_empty() {
        "/".to_owned()
    } else {
        format!("/{slug}/")
    }
}
