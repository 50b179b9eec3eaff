use crate::common::error::BoxError;

/// The outcome of [`EntryDescriptor::duplicate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Duplicate {
    /// Leave the key as it is. The insert reports the existing entry.
    Keep,
    /// The key has been rewritten. The insert restarts with the new key.
    Retry,
}

/// The policies of a [`HashMap`](super::HashMap), supplied by the caller.
///
/// The map never hashes, compares or copies keys by itself.
pub trait EntryDescriptor: Send + Sync + 'static {
    /// The key stored in every entry.
    type Key: Default + Send + Sync;

    /// The caller's record.
    type Entry: Default + Send + Sync;

    /// Returns the bucket index of `key`. The map reduces the result modulo
    /// `bucket_count`.
    fn hash(&self, key: &Self::Key, bucket_count: usize) -> usize;

    /// Returns `true` if `key` equals the key of an entry.
    fn key_compare(&self, key: &Self::Key, entry_key: &Self::Key) -> bool;

    /// Copies `key` into the key slot of an entry about to be linked.
    fn key_copy(&self, key: &Self::Key, dest: &mut Self::Key) -> Result<(), BoxError>;

    /// Called by `insert` and `find_or_insert` when `key` is already present.
    ///
    /// Returning [`Duplicate::Retry`] after rewriting `key` (for example to
    /// the next free session id) restarts the insert with the new key.
    fn duplicate(
        &self,
        _key: &mut Self::Key,
        _existing: &Self::Entry,
    ) -> Result<Duplicate, BoxError> {
        Ok(Duplicate::Keep)
    }

    /// Called on the first claim of an entry's storage.
    ///
    /// Storage is reused after an erase without calling `init` again, so a
    /// re-claimed entry keeps its previous contents. Only its key is
    /// overwritten, by [`key_copy`](Self::key_copy).
    fn init(&self, _entry: &mut Self::Entry) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called once, when the map is dropped, for every entry whose `init`
    /// succeeded.
    fn uninit(&self, _entry: &mut Self::Entry) {}
}
