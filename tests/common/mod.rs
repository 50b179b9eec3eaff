#![allow(dead_code)]

use ahash::RandomState;
use lf_hashmap::{BoxError, Duplicate, EntryDescriptor};
use std::sync::atomic::{AtomicU64, Ordering};

pub const NUM_THREADS: usize = 8;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Default)]
pub struct Slot {
    pub hits: u64,
}

/// `u64` keys spread over the buckets by ahash.
pub struct Keys {
    state: RandomState,
    session_ids: Option<AtomicU64>,
}

impl Keys {
    pub fn new() -> Self {
        Self {
            state: RandomState::with_seeds(1, 2, 3, 4),
            session_ids: None,
        }
    }

    /// A duplicate key is replaced by a fresh id, starting from `first_id`,
    /// and the insert is retried.
    pub fn session_ids(first_id: u64) -> Self {
        Self {
            session_ids: Some(AtomicU64::new(first_id)),
            ..Self::new()
        }
    }
}

impl EntryDescriptor for Keys {
    type Key = u64;
    type Entry = Slot;

    fn hash(&self, key: &u64, bucket_count: usize) -> usize {
        (self.state.hash_one(key) % bucket_count as u64) as usize
    }

    fn key_compare(&self, key: &u64, entry_key: &u64) -> bool {
        key == entry_key
    }

    fn key_copy(&self, key: &u64, dest: &mut u64) -> Result<(), BoxError> {
        *dest = *key;
        Ok(())
    }

    fn duplicate(&self, key: &mut u64, _existing: &Slot) -> Result<Duplicate, BoxError> {
        match &self.session_ids {
            Some(ids) => {
                *key = ids.fetch_add(1, Ordering::AcqRel);
                Ok(Duplicate::Retry)
            }
            None => Ok(Duplicate::Keep),
        }
    }

    fn uninit(&self, entry: &mut Slot) {
        entry.hits = 0;
    }
}
