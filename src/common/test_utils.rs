use crate::{BoxError, Duplicate, EntryDescriptor};

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

/// A key that `U64Keys::key_copy` refuses.
pub(crate) const POISON_KEY: u64 = u64::MAX;

/// What `U64Keys::duplicate` adds to a duplicate key in retry mode.
pub(crate) const RETRY_STRIDE: u64 = 1_000;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    initialized: AtomicU32,
    uninitialized: AtomicU32,
    duplicates: AtomicU32,
}

impl Counters {
    pub(crate) fn initialized(&self) -> u32 {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn uninitialized(&self) -> u32 {
        self.uninitialized.load(Ordering::Acquire)
    }

    pub(crate) fn duplicates(&self) -> u32 {
        self.duplicates.load(Ordering::Acquire)
    }

    fn incl_initialized(&self) {
        self.initialized.fetch_add(1, Ordering::AcqRel);
    }

    fn incl_uninitialized(&self) {
        self.uninitialized.fetch_add(1, Ordering::AcqRel);
    }

    fn incl_duplicates(&self) {
        self.duplicates.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Default)]
pub(crate) struct Record {
    pub(crate) value: u64,
    pub(crate) ready: bool,
}

/// `u64` keys hashed by their value.
#[derive(Default)]
pub(crate) struct U64Keys {
    counters: Arc<Counters>,
    retry_duplicates: bool,
}

impl U64Keys {
    pub(crate) fn with_counters(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            retry_duplicates: false,
        }
    }

    /// Rewrites a duplicate key to the next key `RETRY_STRIDE` away.
    pub(crate) fn retrying(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            retry_duplicates: true,
        }
    }
}

impl EntryDescriptor for U64Keys {
    type Key = u64;
    type Entry = Record;

    fn hash(&self, key: &u64, bucket_count: usize) -> usize {
        (*key as usize) % bucket_count
    }

    fn key_compare(&self, key: &u64, entry_key: &u64) -> bool {
        key == entry_key
    }

    fn key_copy(&self, key: &u64, dest: &mut u64) -> Result<(), BoxError> {
        if *key == POISON_KEY {
            return Err("poisoned key".into());
        }
        *dest = *key;
        Ok(())
    }

    fn duplicate(&self, key: &mut u64, _existing: &Record) -> Result<Duplicate, BoxError> {
        self.counters.incl_duplicates();

        if self.retry_duplicates {
            *key += RETRY_STRIDE;
            Ok(Duplicate::Retry)
        } else {
            Ok(Duplicate::Keep)
        }
    }

    fn init(&self, entry: &mut Record) -> Result<(), BoxError> {
        assert!(!entry.ready);
        entry.ready = true;
        self.counters.incl_initialized();
        Ok(())
    }

    fn uninit(&self, entry: &mut Record) {
        assert!(entry.ready);
        entry.ready = false;
        self.counters.incl_uninitialized();
    }
}
