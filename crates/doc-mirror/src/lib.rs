pub mod assets;
pub mod cache;
pub mod entry;
pub mod error;
pub mod frontmatter;
pub mod handler;
pub mod io;
pub mod links;
pub mod path;
pub mod remote;
pub mod source;
pub mod store;
pub mod sync;
pub mod transform;

pub use cache::MetadataStore;
pub use entry::{
    CacheRecord, EntryId, EntryKind, ImportedFile, RemoteEntry, StoreEntry, SyncWatermark, digest,
};
pub use error::{HandlerError, RemoteError, StoreError, SyncError, TransformError};
pub use frontmatter::{ParsedDocument, parse as parse_frontmatter};
pub use handler::{EntryTypeHandler, EntryTypeRegistry, MarkdownHandler, ParsedContent, TextHandler};
pub use path::{IdOptions, PathOptions, generate_id, generate_path};
pub use remote::{
    Blob, ChangeKind, ChangedFile, CommitInfo, FetchOutcome, Headers, RemoteRepository,
};
pub use source::{LinkMapping, RepoLocation, SourceConfig};
pub use store::ContentStore;
pub use sync::{
    DryRunReport, DryRunStatus, Engine, ImportOptions, ImportReport, RunReport, SourceOutcome,
};
pub use transform::{Transform, TransformContext};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
