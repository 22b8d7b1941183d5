use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_yaml_ng::Value;

use crate::entry::EntryId;
use crate::error::TransformError;
use crate::frontmatter;
use crate::source::SourceConfig;

/// Signature of a content transform: pure text in, text out.
pub type TransformFn =
    Arc<dyn Fn(&str, &TransformContext<'_>) -> Result<String, TransformError> + Send + Sync>;

/// Read-only context handed to every transform.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub source: &'a SourceConfig,
    /// Full path in the remote repository.
    pub remote_path: &'a str,
    /// Destination path relative to the output directory.
    pub local_path: &'a str,
    pub id: &'a EntryId,
}

/// A named transform function.
#[derive(Clone)]
pub struct Transform {
    name: String,
    /// Parameters baked into the closure, as they affect the output.
    params: String,
    func: TransformFn,
}

impl Transform {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str, &TransformContext<'_>) -> Result<String, TransformError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            params: String::new(),
            func: Arc::new(func),
        }
    }

    /// Describe the parameters captured by the function.
    pub fn with_params(mut self, params: impl Into<String>) -> Self {
        self.params = params.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name plus parameters; differs whenever the output could.
    pub fn signature(&self) -> String {
        if self.params.is_empty() {
            self.name.clone()
        } else {
            format!("{}({})", self.name, self.params)
        }
    }

    pub fn apply(&self, content: &str, ctx: &TransformContext<'_>) -> Result<String, TransformError> {
        (self.func)(content, ctx)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish()
    }
}

/// Run transforms left to right, stopping at the first failure.
pub fn run_pipeline(
    transforms: &[Transform],
    content: &str,
    ctx: &TransformContext<'_>,
) -> Result<String, TransformError> {
    transforms
        .iter()
        .try_fold(content.to_owned(), |current, transform| {
            transform.apply(&current, ctx)
        })
}

fn frontmatter_error(name: &str, e: frontmatter::FrontmatterError) -> TransformError {
    TransformError::new(name, e.to_string())
}

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t]*#*[ \t]*$").expect("static regex"));

static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->\n?").expect("static regex"));

/// Lift the first `# Heading` into a `title` field when none is set.
pub fn title_from_heading() -> Transform {
    const NAME: &str = "title-from-heading";

    Transform::new(NAME, |content, _ctx| {
        let mut doc = frontmatter::parse(content).map_err(|e| frontmatter_error(NAME, e))?;

        if doc.get_str("title").is_some() {
            return Ok(content.to_owned());
        }

        let Some(caps) = HEADING.captures(&doc.body) else {
            return Ok(content.to_owned());
        };
        let title = caps[1].to_owned();

        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        let mut end = whole.end;
        if doc.body[end..].starts_with('\n') {
            end += 1;
        }
        doc.body.replace_range(whole.start..end, "");
        doc.body = doc.body.trim_start_matches('\n').to_owned();

        doc.frontmatter_mut()
            .insert(Value::from("title"), Value::from(title));
        doc.render().map_err(|e| frontmatter_error(NAME, e))
    })
}

/// Set fixed frontmatter fields, overwriting existing values.
pub fn set_frontmatter(fields: Vec<(String, Value)>) -> Transform {
    const NAME: &str = "set-frontmatter";

    let params = fields
        .iter()
        .map(|(key, value)| format!("{key}={value:?}"))
        .collect::<Vec<_>>()
        .join(",");

    Transform::new(NAME, move |content, _ctx| {
        let mut doc = frontmatter::parse(content).map_err(|e| frontmatter_error(NAME, e))?;
        let fm = doc.frontmatter_mut();
        for (key, value) in &fields {
            fm.insert(Value::from(key.as_str()), value.clone());
        }
        doc.render().map_err(|e| frontmatter_error(NAME, e))
    })
    .with_params(params)
}

/// Remove the listed frontmatter keys.
pub fn strip_frontmatter_keys(keys: Vec<String>) -> Transform {
    const NAME: &str = "strip-frontmatter-keys";

    let params = keys.join(",");

    Transform::new(NAME, move |content, _ctx| {
        let mut doc = frontmatter::parse(content).map_err(|e| frontmatter_error(NAME, e))?;
        let Some(fm) = doc.frontmatter.as_mut() else {
            return Ok(content.to_owned());
        };
        for key in &keys {
            fm.remove(key.as_str());
        }
        doc.render().map_err(|e| frontmatter_error(NAME, e))
    })
    .with_params(params)
}

pub fn strip_html_comments() -> Transform {
    Transform::new("strip-html-comments", |content, _ctx| {
        Ok(HTML_COMMENT.replace_all(content, "").into_owned())
    })
}

/// Record where the upstream file can be edited.
pub fn edit_url() -> Transform {
    const NAME: &str = "edit-url";

    Transform::new(NAME, |content, ctx| {
        let url = format!(
            "https://github.com/{}/{}/edit/{}/{}",
            ctx.source.owner, ctx.source.repo, ctx.source.git_ref, ctx.remote_path
        );
        let mut doc = frontmatter::parse(content).map_err(|e| frontmatter_error(NAME, e))?;
        doc.frontmatter_mut()
            .insert(Value::from("editUrl"), Value::from(url));
        doc.render().map_err(|e| frontmatter_error(NAME, e))
    })
}

/// Look up a parameterless built-in by its configuration name.
pub fn builtin(name: &str) -> Option<Transform> {
    match name {
        "title-from-heading" => Some(title_from_heading()),
        "strip-html-comments" => Some(strip_html_comments()),
        "edit-url" => Some(edit_url()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceConfig {
        SourceConfig::new("acme", "handbook", "docs", "content/docs")
    }

    fn run(transforms: &[Transform], content: &str) -> Result<String, TransformError> {
        let source = source();
        let id = EntryId::new("content/docs/page");
        let ctx = TransformContext {
            source: &source,
            remote_path: "docs/page.md",
            local_path: "content/docs/page.md",
            id: &id,
        };
        run_pipeline(transforms, content, &ctx)
    }

    #[test]
    fn pipeline_preserves_order() {
        let transforms = vec![
            Transform::new("a", |c, _| Ok(format!("{c}a"))),
            Transform::new("b", |c, _| Ok(format!("{c}b"))),
            Transform::new("c", |c, _| Ok(format!("{c}c"))),
        ];
        assert_eq!(run(&transforms, "").unwrap(), "abc");
    }

    #[test]
    fn signature_reflects_parameters() {
        let plain = strip_html_comments();
        let a = strip_frontmatter_keys(vec!["draft".into()]);
        let b = strip_frontmatter_keys(vec!["draft".into(), "wip".into()]);

        assert_eq!(plain.signature(), "strip-html-comments");
        assert_eq!(a.name(), b.name());
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn pipeline_stops_at_first_failure() {
        let transforms = vec![
            Transform::new("ok", |c, _| Ok(c.to_uppercase())),
            Transform::new("fails", |_, _| Err(TransformError::new("fails", "nope"))),
            Transform::new("never", |_, _| panic!("must not run")),
        ];
        let err = run(&transforms, "x").unwrap_err();
        assert_eq!(err.name, "fails");
    }

    #[test]
    fn empty_pipeline_is_identity() {
        assert_eq!(run(&[], "unchanged").unwrap(), "unchanged");
    }

    #[test]
    fn title_from_heading_lifts_h1() {
        let out = run(&[title_from_heading()], "# Accounts\n\nManage accounts.\n").unwrap();
        assert_eq!(out, "---\ntitle: Accounts\n---\nManage accounts.\n");
    }

    #[test]
    fn title_from_heading_keeps_existing_title() {
        let input = "---\ntitle: Kept\n---\n# Other\n";
        assert_eq!(run(&[title_from_heading()], input).unwrap(), input);
    }

    #[test]
    fn title_from_heading_without_heading_is_noop() {
        let input = "Just text.\n";
        assert_eq!(run(&[title_from_heading()], input).unwrap(), input);
    }

    #[test]
    fn set_frontmatter_creates_block() {
        let t = set_frontmatter(vec![("draft".into(), Value::from(false))]);
        let out = run(&[t], "Body.\n").unwrap();
        assert_eq!(out, "---\ndraft: false\n---\nBody.\n");
    }

    #[test]
    fn strip_frontmatter_keys_removes_fields() {
        let t = strip_frontmatter_keys(vec!["internal".into()]);
        let out = run(&[t], "---\ntitle: A\ninternal: yes\n---\nBody.\n").unwrap();
        assert!(!out.contains("internal"));
        assert!(out.contains("title: A"));
    }

    #[test]
    fn strip_html_comments_removes_blocks() {
        let out = run(&[strip_html_comments()], "a\n<!-- hidden\nnote -->\nb\n").unwrap();
        assert_eq!(out, "a\nb\n");
    }

    #[test]
    fn edit_url_points_at_upstream() {
        let out = run(&[edit_url()], "Body.\n").unwrap();
        let doc = frontmatter::parse(&out).unwrap();
        assert_eq!(
            doc.get_str("editUrl"),
            Some("https://github.com/acme/handbook/edit/main/docs/page.md")
        );
    }

    #[test]
    fn invalid_frontmatter_fails_the_transform() {
        let err = run(&[title_from_heading()], "---\ntitle: [bad\n---\n# X\n").unwrap_err();
        assert_eq!(err.name, "title-from-heading");
    }

    #[test]
    fn builtin_lookup() {
        assert!(builtin("title-from-heading").is_some());
        assert!(builtin("edit-url").is_some());
        assert!(builtin("does-not-exist").is_none());
    }
}
