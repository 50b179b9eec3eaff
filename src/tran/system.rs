use crate::common::error::{Error, Result};

use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// A process-wide allocator of transaction indices.
///
/// Cloning a `System` is cheap and yields a handle on the same set of indices.
#[derive(Clone)]
pub struct System {
    inner: Arc<SystemInner>,
}

struct SystemInner {
    max_transactions: usize,
    assigned: Mutex<Box<[bool]>>,
    assigned_count: AtomicUsize,
}

impl System {
    /// Creates a transaction system with `max_transactions` indices.
    ///
    /// Returns [`Error::InvalidConfig`] if `max_transactions` is 0.
    pub fn new(max_transactions: usize) -> Result<Self> {
        if max_transactions == 0 {
            return Err(Error::InvalidConfig(
                "a transaction system needs at least one index",
            ));
        }

        Ok(Self {
            inner: Arc::new(SystemInner {
                max_transactions,
                assigned: Mutex::new(vec![false; max_transactions].into_boxed_slice()),
                assigned_count: AtomicUsize::default(),
            }),
        })
    }

    /// Returns the number of indices of this system.
    pub fn max_transactions(&self) -> usize {
        self.inner.max_transactions
    }

    /// Returns the number of indices that are currently assigned.
    pub fn assigned_count(&self) -> usize {
        self.inner.assigned_count.load(Ordering::Acquire)
    }

    /// Assigns the lowest free transaction index.
    ///
    /// The index is returned to the system when the [`Index`] is dropped.
    pub fn assign(&self) -> Result<Index> {
        let mut assigned = self.inner.assigned.lock();

        let Some(index) = assigned.iter().position(|used| !used) else {
            #[cfg(feature = "logging")]
            log::warn!(
                "All {} transaction indices are assigned",
                self.inner.max_transactions
            );

            return Err(Error::TransactionSlotsExhausted {
                max_transactions: self.inner.max_transactions,
            });
        };

        assigned[index] = true;
        self.inner.assigned_count.fetch_add(1, Ordering::AcqRel);

        Ok(Index {
            system: self.clone(),
            index,
        })
    }

    fn release(&self, index: usize) {
        let mut assigned = self.inner.assigned.lock();
        debug_assert!(assigned[index]);
        assigned[index] = false;
        self.inner.assigned_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("max_transactions", &self.max_transactions())
            .field("assigned_count", &self.assigned_count())
            .finish()
    }
}

/// A transaction index assigned to one worker.
pub struct Index {
    system: System,
    index: usize,
}

impl Index {
    /// Returns the numeric value of this index.
    pub fn get(&self) -> usize {
        self.index
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        self.system.release(self.index);
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Index").field(&self.index).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::System;
    use crate::Error;

    #[test]
    fn assigns_lowest_free_index() {
        let system = System::new(3).unwrap();
        assert_eq!(system.max_transactions(), 3);

        let i0 = system.assign().unwrap();
        let i1 = system.assign().unwrap();
        let i2 = system.assign().unwrap();
        assert_eq!((i0.get(), i1.get(), i2.get()), (0, 1, 2));
        assert_eq!(system.assigned_count(), 3);

        assert!(matches!(
            system.assign(),
            Err(Error::TransactionSlotsExhausted {
                max_transactions: 3
            })
        ));

        drop(i1);
        assert_eq!(system.assigned_count(), 2);

        let again = system.assign().unwrap();
        assert_eq!(again.get(), 1);
    }

    #[test]
    fn reject_an_empty_system() {
        assert!(matches!(System::new(0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn indices_move_across_threads() {
        let system = System::new(8).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let system = system.clone();
                std::thread::spawn(move || system.assign().unwrap().get())
            })
            .collect();

        let mut seen: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.sort_unstable();
        assert!(seen.iter().all(|i| *i < 8));

        // Every index was dropped at the end of its thread.
        assert_eq!(system.assigned_count(), 0);
    }
}
