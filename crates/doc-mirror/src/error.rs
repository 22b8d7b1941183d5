use crate::entry::EntryId;

/// Errors raised by a remote repository transport.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors raised by the host content store or the metadata store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A transform function rejected its input.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transform `{name}` failed: {message}")]
pub struct TransformError {
    pub name: String,
    pub message: String,
}

impl TransformError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// An entry-type handler failed to parse or render a document.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("parse failed: {0}")]
    Parse(String),

    #[error("render failed: {0}")]
    Render(String),
}

/// Engine-level error taxonomy.
///
/// Every variant is scoped: the orchestrator catches all of them per source,
/// and the walker catches the per-file ones per entry.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Invalid source configuration or no handler for a file type. Fatal to the source.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network or API failure. Not retried within the run.
    #[error("transport error: {0}")]
    Transport(#[from] RemoteError),

    /// A transform raised. Fatal to the single file.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The entry-type handler could not parse the document. Fatal to the single file.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// Render step raised. Recovered by storing the entry unrendered.
    #[error("render error for {id}: {message}")]
    Render { id: EntryId, message: String },

    /// Watermark or commit lookup failed after a successful import.
    #[error("state tracking error: {0}")]
    StateTracking(String),

    /// Selective cleanup failed for one source.
    #[error("cleanup error: {0}")]
    Cleanup(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// True if this error should stop the whole source rather than a single file.
    pub fn is_fatal_to_source(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Cancelled)
    }
}
