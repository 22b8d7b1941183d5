use std::collections::HashMap;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::frontmatter;

/// Structured data and body extracted from a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedContent {
    pub body: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Knows how to parse (and optionally render) one kind of document.
pub trait EntryTypeHandler: Send + Sync {
    fn parse(&self, contents: &str, destination: &str) -> Result<ParsedContent, HandlerError>;

    /// Render step. `None` means this handler has no render step.
    fn render(&self, _parsed: &ParsedContent) -> Option<Result<String, HandlerError>> {
        None
    }
}

/// Handlers keyed by lowercase file extension.
#[derive(Clone, Default)]
pub struct EntryTypeRegistry {
    handlers: HashMap<String, Arc<dyn EntryTypeHandler>>,
}

impl EntryTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markdown for `md`/`mdx`, plain text for `txt`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let markdown: Arc<dyn EntryTypeHandler> = Arc::new(MarkdownHandler);
        registry.register("md", Arc::clone(&markdown));
        registry.register("mdx", markdown);
        registry.register("txt", Arc::new(TextHandler));
        registry
    }

    pub fn register(&mut self, extension: &str, handler: Arc<dyn EntryTypeHandler>) {
        self.handlers
            .insert(extension.trim_start_matches('.').to_lowercase(), handler);
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn EntryTypeHandler>> {
        self.handlers.get(&extension.to_lowercase())
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.get(extension).is_some()
    }
}

impl std::fmt::Debug for EntryTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut extensions: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        extensions.sort_unstable();
        f.debug_struct("EntryTypeRegistry")
            .field("extensions", &extensions)
            .finish()
    }
}

/// Markdown with optional YAML frontmatter. Renders to HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownHandler;

impl EntryTypeHandler for MarkdownHandler {
    fn parse(&self, contents: &str, _destination: &str) -> Result<ParsedContent, HandlerError> {
        let doc = frontmatter::parse(contents).map_err(|e| HandlerError::Parse(e.to_string()))?;
        let data = doc.data().map_err(|e| HandlerError::Parse(e.to_string()))?;
        Ok(ParsedContent {
            body: doc.body,
            data,
        })
    }

    fn render(&self, parsed: &ParsedContent) -> Option<Result<String, HandlerError>> {
        use pulldown_cmark::{Options, Parser, html};

        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS;
        let parser = Parser::new_ext(&parsed.body, options);

        let mut out = String::with_capacity(parsed.body.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Some(Ok(out))
    }
}

/// Plain text: the whole file is the body.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

impl EntryTypeHandler for TextHandler {
    fn parse(&self, contents: &str, _destination: &str) -> Result<ParsedContent, HandlerError> {
        Ok(ParsedContent {
            body: contents.to_owned(),
            data: serde_json::Map::new(),
        })
    }
}
