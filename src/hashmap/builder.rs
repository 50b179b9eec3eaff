use super::{
    bucket_array, EntryDescriptor, EpochProtected, HashMap, MutexProtected, NodeLifecycle,
    Protection,
};
use crate::{
    common::error::{Error, Result},
    freelist::Freelist,
    tran::System,
};

use std::{marker::PhantomData, sync::Arc};

pub(crate) const DEFAULT_BUCKET_COUNT: usize = 1024;
pub(crate) const DEFAULT_FREELIST_BLOCK_SIZE: usize = 256;
pub(crate) const DEFAULT_FREELIST_BLOCK_COUNT: usize = 1;

/// Builds a [`HashMap`] with various configuration knobs.
///
/// # Examples
///
/// ```rust
/// use lf_hashmap::{tran::System, BoxError, EntryDescriptor, HashMap};
///
/// struct Counters;
///
/// impl EntryDescriptor for Counters {
///     type Key = u32;
///     type Entry = u64;
///
///     fn hash(&self, key: &u32, bucket_count: usize) -> usize {
///         *key as usize % bucket_count
///     }
///
///     fn key_compare(&self, key: &u32, entry_key: &u32) -> bool {
///         key == entry_key
///     }
///
///     fn key_copy(&self, key: &u32, dest: &mut u32) -> Result<(), BoxError> {
///         *dest = *key;
///         Ok(())
///     }
/// }
///
/// let system = System::new(8).unwrap();
/// let map = HashMap::builder(Counters)
///     // A fixed number of buckets. The map never resizes.
///     .bucket_count(4096)
///     // Entries are allocated 1,024 at a time, two blocks up front.
///     .freelist_block_size(1024)
///     .freelist_block_count(2)
///     // Hand entries out locked instead of inside an open transaction.
///     .mutex_protected()
///     .build(&system)
///     .unwrap();
///
/// assert_eq!(map.bucket_count(), 4096);
/// assert_eq!(map.freelist().alloc_count(), 2048);
/// ```
#[must_use]
pub struct HashMapBuilder<D, P = EpochProtected> {
    descriptor: D,
    bucket_count: usize,
    freelist_block_size: usize,
    freelist_block_count: usize,
    protection: PhantomData<P>,
}

impl<D: EntryDescriptor> HashMapBuilder<D, EpochProtected> {
    pub(crate) fn new(descriptor: D) -> Self {
        Self {
            descriptor,
            bucket_count: DEFAULT_BUCKET_COUNT,
            freelist_block_size: DEFAULT_FREELIST_BLOCK_SIZE,
            freelist_block_count: DEFAULT_FREELIST_BLOCK_COUNT,
            protection: PhantomData,
        }
    }

    /// Makes the map hand out entries locked by their mutex.
    pub fn mutex_protected(self) -> HashMapBuilder<D, MutexProtected> {
        HashMapBuilder {
            descriptor: self.descriptor,
            bucket_count: self.bucket_count,
            freelist_block_size: self.freelist_block_size,
            freelist_block_count: self.freelist_block_count,
            protection: PhantomData,
        }
    }
}

impl<D: EntryDescriptor, P: Protection> HashMapBuilder<D, P> {
    /// Sets the number of buckets. Defaults to 1024.
    pub fn bucket_count(self, bucket_count: usize) -> Self {
        Self {
            bucket_count,
            ..self
        }
    }

    /// Sets the number of entries allocated at a time. Defaults to 256.
    pub fn freelist_block_size(self, block_size: usize) -> Self {
        Self {
            freelist_block_size: block_size,
            ..self
        }
    }

    /// Sets the number of blocks allocated when the map is built. Defaults
    /// to 1.
    pub fn freelist_block_count(self, block_count: usize) -> Self {
        Self {
            freelist_block_count: block_count,
            ..self
        }
    }

    /// Builds the map. Every thread that uses it needs an index of `system`.
    pub fn build(self, system: &System) -> Result<HashMap<D, P>> {
        if self.bucket_count == 0 {
            return Err(Error::InvalidConfig("bucket count must be positive"));
        }
        if self.freelist_block_size == 0 {
            return Err(Error::InvalidConfig("freelist block size must be positive"));
        }

        let freelist = Freelist::new(
            system,
            self.freelist_block_size,
            self.freelist_block_count,
            NodeLifecycle::new(Arc::new(self.descriptor)),
        )?;
        let live = bucket_array(self.bucket_count, false)?;
        let backbuffer = bucket_array(self.bucket_count, true)?;

        Ok(HashMap::with_parts(freelist, live, backbuffer))
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUCKET_COUNT, DEFAULT_FREELIST_BLOCK_SIZE};
    use crate::{common::test_utils::U64Keys, tran::System, Error, HashMap};

    #[test]
    fn build_with_defaults() {
        let system = System::new(1).unwrap();
        let map = HashMap::builder(U64Keys::default()).build(&system).unwrap();

        assert_eq!(map.bucket_count(), DEFAULT_BUCKET_COUNT);
        assert_eq!(map.element_count(), 0);
        assert_eq!(map.freelist().block_size(), DEFAULT_FREELIST_BLOCK_SIZE);
        assert_eq!(map.freelist().block_count(), 1);
        assert_eq!(map.freelist().claimed_count(), 0);
    }

    #[test]
    fn build_mutex_protected() {
        let system = System::new(1).unwrap();
        let map = HashMap::builder(U64Keys::default())
            .bucket_count(16)
            .freelist_block_size(8)
            .freelist_block_count(0)
            .mutex_protected()
            .build(&system)
            .unwrap();

        assert_eq!(map.bucket_count(), 16);
        assert_eq!(map.freelist().alloc_count(), 0);
    }

    #[test]
    fn reject_zero_sizes() {
        let system = System::new(1).unwrap();

        let result = HashMap::builder(U64Keys::default())
            .bucket_count(0)
            .build(&system);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));

        let result = HashMap::builder(U64Keys::default())
            .freelist_block_size(0)
            .build(&system);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
