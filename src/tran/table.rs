use super::{Index, System};
use crate::common::error::{Error, Result};

use crossbeam_epoch::{Collector, Guard, LocalHandle};
use crossbeam_utils::CachePadded;
use std::{
    fmt,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Something a [`Descriptor`] can stash and must give back to its owner when
/// it is replaced or when the descriptor is dropped.
pub trait Reclaimable {
    /// Hands the value back to its owner. `guard` is pinned in the same
    /// reclamation domain as the value.
    fn reclaim(self, guard: &Guard);
}

/// One reclamation domain with a descriptor slot for every index of a
/// [`System`].
pub struct Table {
    collector: Collector,
    in_use: Box<[AtomicBool]>,
    open_transactions: CachePadded<AtomicUsize>,
}

impl Table {
    pub(crate) fn new(system: &System) -> Self {
        let in_use = (0..system.max_transactions())
            .map(|_| AtomicBool::new(false))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            collector: Collector::new(),
            in_use,
            open_transactions: CachePadded::new(AtomicUsize::default()),
        }
    }

    /// Returns the number of descriptor slots of this table.
    pub fn len(&self) -> usize {
        self.in_use.len()
    }

    /// Returns `true` if this table has no descriptor slots. This never
    /// happens for tables created from a [`System`].
    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }

    /// Returns the number of transactions currently open on this table.
    pub fn open_transactions(&self) -> usize {
        self.open_transactions.load(Ordering::Acquire)
    }

    /// Registers the descriptor of `index` on this table.
    ///
    /// A table holds at most one live descriptor per index.
    pub fn descriptor<S: Reclaimable>(&self, index: &Index) -> Result<Descriptor<'_, S>> {
        let i = index.get();
        let slot = self.in_use.get(i).ok_or(Error::IndexOutOfRange {
            index: i,
            len: self.in_use.len(),
        })?;

        if slot
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::DescriptorInUse(i));
        }

        Ok(Descriptor {
            table: self,
            index: i,
            guard: None,
            saved: None,
            handle: self.collector.register(),
        })
    }

    pub(crate) fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Advances the epoch of this table far enough to run every deferred
    /// function queued by transactions that have ended.
    #[cfg(test)]
    pub(crate) fn run_deferred(&self) {
        let handle = self.collector.register();
        for _ in 0..256 {
            handle.pin().flush();
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.len())
            .field("open_transactions", &self.open_transactions())
            .finish()
    }
}

/// The per-thread transaction handle of one [`Table`].
///
/// A descriptor is bound to the thread that created it.
pub struct Descriptor<'t, S: Reclaimable> {
    table: &'t Table,
    index: usize,
    // Declared before `handle` so that an open transaction is unpinned first.
    guard: Option<Guard>,
    saved: Option<S>,
    handle: LocalHandle,
}

impl<'t, S: Reclaimable> Descriptor<'t, S> {
    /// Returns the transaction index this descriptor is registered for.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the table this descriptor belongs to.
    pub fn table(&self) -> &'t Table {
        self.table
    }

    /// Opens a transaction. Does nothing if one is already open.
    pub fn start_tran(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(self.handle.pin());
            self.table.open_transactions.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Closes the open transaction, if any.
    pub fn end_tran(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
            self.table.open_transactions.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Returns `true` if a transaction is open.
    pub fn is_tran_started(&self) -> bool {
        self.guard.is_some()
    }

    /// Stashes a reclaimable value for reuse by this descriptor's next
    /// operation. A previously stashed value is reclaimed.
    pub fn save_reclaimable(&mut self, value: S) {
        if let Some(previous) = self.saved.replace(value) {
            let guard = self.handle.pin();
            previous.reclaim(&guard);
        }
    }

    /// Takes the stashed value, if any.
    pub fn pull_saved_reclaimable(&mut self) -> Option<S> {
        self.saved.take()
    }

    /// Returns `true` if a value is stashed.
    pub fn has_saved_reclaimable(&self) -> bool {
        self.saved.is_some()
    }

    /// Publishes the retirements deferred through this descriptor so that
    /// any thread of the table can complete them, and completes those whose
    /// transactions have ended.
    pub fn flush(&mut self) {
        self.in_tran(|guard| guard.flush());
    }

    /// Runs `f` inside a transaction. A transaction opened here is closed
    /// before returning; an already open one stays open.
    pub(crate) fn in_tran<R>(&mut self, f: impl FnOnce(&Guard) -> R) -> R {
        let local = !self.is_tran_started();
        self.start_tran();

        let result = match &self.guard {
            Some(guard) => f(guard),
            None => unreachable!("a transaction was just started"),
        };

        if local {
            self.end_tran();
        }
        result
    }
}

impl<S: Reclaimable> Drop for Descriptor<'_, S> {
    fn drop(&mut self) {
        self.end_tran();

        if let Some(saved) = self.saved.take() {
            let guard = self.handle.pin();
            saved.reclaim(&guard);
        }

        self.table.in_use[self.index].store(false, Ordering::Release);
    }
}

impl<S: Reclaimable> fmt::Debug for Descriptor<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("index", &self.index)
            .field("tran_started", &self.is_tran_started())
            .field("has_saved", &self.has_saved_reclaimable())
            .finish()
    }
}
