use std::sync::Arc;

use crate::entry::{EntryId, StoreEntry};
use crate::error::StoreError;

/// The host's content store.
///
/// Iteration order of `keys`/`entries` is not assumed stable across calls.
pub trait ContentStore: Send + Sync {
    fn get(&self, id: &EntryId) -> Result<Option<StoreEntry>, StoreError>;

    /// Insert or merge-replace by id.
    fn set(&self, entry: StoreEntry) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    fn delete(&self, id: &EntryId) -> Result<bool, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<EntryId>, StoreError>;

    fn entries(&self) -> Result<Vec<StoreEntry>, StoreError>;

    /// Delete-then-insert as one step.
    ///
    /// The default runs both calls back to back with no suspension point in
    /// between; stores with concurrent readers should override this with a
    /// transaction.
    fn replace(&self, entry: StoreEntry) -> Result<(), StoreError> {
        self.delete(&entry.id)?;
        self.set(entry)
    }
}

impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    fn get(&self, id: &EntryId) -> Result<Option<StoreEntry>, StoreError> {
        (**self).get(id)
    }

    fn set(&self, entry: StoreEntry) -> Result<(), StoreError> {
        (**self).set(entry)
    }

    fn delete(&self, id: &EntryId) -> Result<bool, StoreError> {
        (**self).delete(id)
    }

    fn clear(&self) -> Result<(), StoreError> {
        (**self).clear()
    }

    fn keys(&self) -> Result<Vec<EntryId>, StoreError> {
        (**self).keys()
    }

    fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
        (**self).entries()
    }

    fn replace(&self, entry: StoreEntry) -> Result<(), StoreError> {
        (**self).replace(entry)
    }
}
