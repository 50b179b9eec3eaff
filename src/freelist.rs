//! A pool of reusable nodes with transaction-scoped reclamation.
//!
//! Nodes are allocated in blocks and never freed until the freelist itself is
//! dropped. A retired node goes back to the available stack only after every
//! transaction that could still observe it has ended, so a thread holding an
//! open transaction may keep reading a node that another thread has retired.

use crate::{
    common::error::{Error, Result},
    tran::{Descriptor, Index, Reclaimable, System, Table},
};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Shared};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::{
    cell::UnsafeCell,
    fmt,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Weak,
    },
};

/// Creates, initialises and uninitialises the values held by a
/// [`Freelist`].
pub trait Lifecycle<T>: Send + Sync {
    /// Creates the value of a node of a newly allocated block.
    fn create(&self) -> T;

    /// Runs on the first claim of a node. A node whose `init` failed is
    /// retired and `init` runs again on its next claim.
    fn init(&self, _value: &mut T) -> Result<()> {
        Ok(())
    }

    /// Runs once, when the freelist is dropped, for every node whose `init`
    /// has succeeded.
    fn uninit(&self, _value: &mut T) {}
}

/// A node of a [`Freelist`]: the value plus the link of the available stack.
pub struct FreeNode<T> {
    data: UnsafeCell<T>,
    free_next: Atomic<FreeNode<T>>,
    initialized: AtomicBool,
}

// The value is only written by the exclusive claimer of the node.
unsafe impl<T: Send + Sync> Sync for FreeNode<T> {}

impl<T> FreeNode<T> {
    fn new(data: T) -> Self {
        Self {
            data: UnsafeCell::new(data),
            free_next: Atomic::null(),
            initialized: AtomicBool::new(false),
        }
    }
}

impl<T> Deref for FreeNode<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.data.get() }
    }
}

/// A node pointer that can be moved into a deferred function.
struct NodePtr<T>(NonNull<FreeNode<T>>);

unsafe impl<T: Send + Sync> Send for NodePtr<T> {}

struct Inner<T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    table: Table,
    lifecycle: L,
    available: CachePadded<Atomic<FreeNode<T>>>,
    blocks: Mutex<Vec<Box<[FreeNode<T>]>>>,
    block_size: usize,
    alloc_count: AtomicUsize,
    available_count: AtomicUsize,
    claimed_count: AtomicUsize,
    retired_count: AtomicUsize,
}

impl<T, L> Inner<T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    fn allocate_block(&self) -> Result<Box<[FreeNode<T>]>> {
        let mut nodes = Vec::new();
        if nodes.try_reserve_exact(self.block_size).is_err() {
            #[cfg(feature = "logging")]
            log::error!(
                "Failed to allocate a freelist block of {} nodes",
                self.block_size
            );

            return Err(Error::OutOfMemory {
                block_size: self.block_size,
            });
        }

        nodes.extend((0..self.block_size).map(|_| FreeNode::new(self.lifecycle.create())));
        self.alloc_count.fetch_add(self.block_size, Ordering::AcqRel);

        #[cfg(feature = "logging")]
        log::debug!(
            "Allocated a freelist block of {} nodes ({} in total)",
            self.block_size,
            self.alloc_count.load(Ordering::Acquire)
        );

        Ok(nodes.into_boxed_slice())
    }

    /// Pushes a node that no thread can reach any more onto the available
    /// stack.
    fn push_available(&self, node: NonNull<FreeNode<T>>) {
        // Nothing but `node` itself is dereferenced here.
        let guard = unsafe { epoch::unprotected() };
        let new = Shared::from(node.as_ptr() as *const FreeNode<T>);
        let node = unsafe { node.as_ref() };

        let mut head = self.available.load(Ordering::Relaxed, guard);
        loop {
            node.free_next.store(head, Ordering::Relaxed);

            match self.available.compare_exchange_weak(
                head,
                new,
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            ) {
                Ok(_) => break,
                Err(e) => head = e.current,
            }
        }

        self.available_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Pops a node from the available stack. `guard` must be pinned in this
    /// freelist's table.
    fn pop_available(&self, guard: &Guard) -> Option<NonNull<FreeNode<T>>> {
        let mut head = self.available.load(Ordering::Acquire, guard);
        loop {
            let node = unsafe { head.as_ref() }?;
            let next = node.free_next.load(Ordering::Relaxed, guard);

            match self.available.compare_exchange_weak(
                head,
                next,
                Ordering::Acquire,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    self.available_count.fetch_sub(1, Ordering::AcqRel);
                    self.claimed_count.fetch_add(1, Ordering::AcqRel);
                    return NonNull::new(head.as_raw() as *mut FreeNode<T>);
                }
                Err(e) => head = e.current,
            }
        }
    }
}

impl<T, L> Drop for Inner<T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    fn drop(&mut self) {
        let lifecycle = &self.lifecycle;
        for node in self.blocks.get_mut().iter_mut().flat_map(|b| b.iter_mut()) {
            if *node.initialized.get_mut() {
                lifecycle.uninit(node.data.get_mut());
            }
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "Dropped a freelist of {} nodes",
            self.alloc_count.get_mut()
        );
    }
}

/// A pool of reusable `T`s.
///
/// Every freelist owns a transaction [`Table`]. Threads register a
/// [`Descriptor`] on it through [`Freelist::descriptor`].
pub struct Freelist<T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    inner: Arc<Inner<T, L>>,
}

impl<T, L> Freelist<T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    /// Creates a freelist with `block_count` pre-allocated blocks of
    /// `block_size` nodes each.
    pub fn new(
        system: &System,
        block_size: usize,
        block_count: usize,
        lifecycle: L,
    ) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidConfig("freelist block size must be positive"));
        }

        let inner = Arc::new(Inner {
            table: Table::new(system),
            lifecycle,
            available: CachePadded::new(Atomic::null()),
            blocks: Mutex::new(Vec::new()),
            block_size,
            alloc_count: AtomicUsize::default(),
            available_count: AtomicUsize::default(),
            claimed_count: AtomicUsize::default(),
            retired_count: AtomicUsize::default(),
        });

        {
            let mut blocks = inner.blocks.lock();
            for _ in 0..block_count {
                let block = inner.allocate_block()?;
                for node in block.iter() {
                    inner.push_available(NonNull::from(node));
                }
                blocks.push(block);
            }
        }

        Ok(Self { inner })
    }

    /// Registers the transaction descriptor of `index` on this freelist's
    /// table.
    pub fn descriptor(&self, index: &Index) -> Result<Descriptor<'_, Claimed<'_, T, L>>> {
        self.inner.table.descriptor(index)
    }

    /// Returns the transaction table of this freelist.
    pub fn table(&self) -> &Table {
        &self.inner.table
    }

    /// Claims a node for exclusive use.
    ///
    /// A node stashed in `tdes` is handed out first. Otherwise a node is taken
    /// from the available stack, allocating a new block when the stack is
    /// empty.
    ///
    /// # Panics
    ///
    /// Panics if `tdes` was registered on another freelist's table.
    pub fn claim<'f>(
        &'f self,
        tdes: &mut Descriptor<'f, Claimed<'f, T, L>>,
    ) -> Result<Claimed<'f, T, L>> {
        self.check_descriptor(tdes);

        if let Some(claimed) = tdes.pull_saved_reclaimable() {
            if self.owns(&claimed) {
                return Ok(claimed);
            }
            // Stashed from another freelist. Dropping it retires it there.
            drop(claimed);
        }

        let node = self.pop_or_grow(tdes)?;
        let claimed = Claimed {
            freelist: self,
            node,
        };

        let node = unsafe { node.as_ref() };
        if !node.initialized.load(Ordering::Acquire) {
            self.inner
                .lifecycle
                .init(unsafe { &mut *node.data.get() })?;
            node.initialized.store(true, Ordering::Release);
        }

        Ok(claimed)
    }

    fn pop_or_grow(
        &self,
        tdes: &mut Descriptor<'_, Claimed<'_, T, L>>,
    ) -> Result<NonNull<FreeNode<T>>> {
        loop {
            if let Some(node) = tdes.in_tran(|guard| self.inner.pop_available(guard)) {
                return Ok(node);
            }

            let mut blocks = self.inner.blocks.lock();
            if self.inner.available_count.load(Ordering::Acquire) > 0 {
                // Another thread has grown the freelist meanwhile.
                continue;
            }

            if blocks.try_reserve(1).is_err() {
                return Err(Error::OutOfMemory {
                    block_size: self.inner.block_size,
                });
            }
            let block = self.inner.allocate_block()?;

            let first = NonNull::from(&block[0]);
            for node in block[1..].iter() {
                self.inner.push_available(NonNull::from(node));
            }
            blocks.push(block);
            self.inner.claimed_count.fetch_add(1, Ordering::AcqRel);

            return Ok(first);
        }
    }

    /// Retires a claimed node. It becomes available again once every
    /// transaction that was open at this point has ended.
    ///
    /// Returns [`Error::ForeignNode`] if `claimed` comes from another
    /// freelist; it is retired to that freelist instead.
    ///
    /// # Panics
    ///
    /// Panics if `tdes` was registered on another freelist's table.
    pub fn retire(
        &self,
        tdes: &mut Descriptor<'_, Claimed<'_, T, L>>,
        claimed: Claimed<'_, T, L>,
    ) -> Result<()> {
        self.check_descriptor(tdes);

        if !self.owns(&claimed) {
            drop(claimed);
            return Err(Error::ForeignNode);
        }
        tdes.in_tran(|guard| claimed.reclaim(guard));
        Ok(())
    }

    /// Returns `true` if `claimed` was claimed from this freelist.
    pub fn owns(&self, claimed: &Claimed<'_, T, L>) -> bool {
        Arc::ptr_eq(&self.inner, &claimed.freelist.inner)
    }

    /// Rejects descriptors of other tables. Their transactions do not keep
    /// this freelist's nodes from being reused.
    pub(crate) fn check_descriptor<S: Reclaimable>(&self, tdes: &Descriptor<'_, S>) {
        assert!(
            ptr::eq(tdes.table(), self.table()),
            "transaction descriptor {} belongs to another table",
            tdes.index()
        );
    }

    /// Retires a node that was linked into a shared structure and has been
    /// unlinked from it.
    ///
    /// # Safety
    ///
    /// `node` must belong to this freelist, must be unreachable for any
    /// thread that is not inside a transaction of this freelist's table, and
    /// must be retired only once. `guard` must be pinned in that table.
    pub(crate) unsafe fn retire_unlinked(&self, node: NonNull<FreeNode<T>>, guard: &Guard) {
        self.inner.claimed_count.fetch_sub(1, Ordering::AcqRel);
        self.inner.retired_count.fetch_add(1, Ordering::AcqRel);

        let inner: Weak<Inner<T, L>> = Arc::downgrade(&self.inner);
        let node = NodePtr(node);
        guard.defer_unchecked(move || {
            let node = node;
            // The freelist is being dropped when the upgrade fails.
            if let Some(inner) = inner.upgrade() {
                inner.retired_count.fetch_sub(1, Ordering::AcqRel);
                inner.push_available(node.0);
            }
        });
    }

    /// Returns the number of nodes currently claimed, linked or stashed.
    pub fn claimed_count(&self) -> usize {
        self.inner.claimed_count.load(Ordering::Acquire)
    }

    /// Returns the number of nodes on the available stack.
    pub fn available_count(&self) -> usize {
        self.inner.available_count.load(Ordering::Acquire)
    }

    /// Returns the number of retired nodes that are waiting for the end of
    /// the transactions that could observe them.
    pub fn retired_count(&self) -> usize {
        self.inner.retired_count.load(Ordering::Acquire)
    }

    /// Returns the number of nodes ever allocated.
    pub fn alloc_count(&self) -> usize {
        self.inner.alloc_count.load(Ordering::Acquire)
    }

    /// Returns the number of allocated blocks.
    pub fn block_count(&self) -> usize {
        self.inner.blocks.lock().len()
    }

    /// Returns the number of nodes per block.
    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    pub(crate) fn lifecycle(&self) -> &L {
        &self.inner.lifecycle
    }
}

impl<T, L> fmt::Debug for Freelist<T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Freelist")
            .field("block_size", &self.block_size())
            .field("alloc_count", &self.alloc_count())
            .field("claimed_count", &self.claimed_count())
            .field("available_count", &self.available_count())
            .field("retired_count", &self.retired_count())
            .finish()
    }
}

/// A node claimed from a [`Freelist`], exclusively owned by the claimer.
///
/// Dropping a `Claimed` retires the node.
pub struct Claimed<'f, T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    freelist: &'f Freelist<T, L>,
    node: NonNull<FreeNode<T>>,
}

unsafe impl<T, L> Send for Claimed<'_, T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
}

impl<'f, T, L> Claimed<'f, T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    /// Returns the freelist this node was claimed from.
    pub fn freelist(&self) -> &'f Freelist<T, L> {
        self.freelist
    }

    pub(crate) fn as_shared<'g>(&self) -> Shared<'g, FreeNode<T>> {
        Shared::from(self.node.as_ptr() as *const FreeNode<T>)
    }

    #[cfg(test)]
    pub(crate) fn as_ptr(&self) -> *const FreeNode<T> {
        self.node.as_ptr()
    }

    /// Gives up ownership without retiring the node.
    pub(crate) fn into_raw(self) -> NonNull<FreeNode<T>> {
        let this = ManuallyDrop::new(self);
        this.node
    }
}

impl<T, L> Deref for Claimed<'_, T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.node.as_ref().data.get() }
    }
}

impl<T, L> DerefMut for Claimed<'_, T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.node.as_ref().data.get() }
    }
}

impl<T, L> Reclaimable for Claimed<'_, T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    fn reclaim(self, guard: &Guard) {
        if guard.collector() != Some(self.freelist.inner.table.collector()) {
            // Pinned in another table. Dropping retires under our own.
            drop(self);
            return;
        }

        let freelist = self.freelist;
        let node = self.into_raw();
        unsafe { freelist.retire_unlinked(node, guard) };
    }
}

impl<T, L> Drop for Claimed<'_, T, L>
where
    T: Send + Sync,
    L: Lifecycle<T>,
{
    fn drop(&mut self) {
        let handle = self.freelist.inner.table.collector().register();
        let guard = handle.pin();
        unsafe { self.freelist.retire_unlinked(self.node, &guard) };
    }
}

impl<T, L> fmt::Debug for Claimed<'_, T, L>
where
    T: Send + Sync + fmt::Debug,
    L: Lifecycle<T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Claimed").field(&**self).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Freelist, Lifecycle};
    use crate::{common::error::Result, tran::System, Error};

    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Barrier,
    };

    #[derive(Default)]
    struct Slot {
        owner: AtomicUsize,
        uses: usize,
        ready: bool,
    }

    #[derive(Default)]
    struct Counting {
        inits: Arc<AtomicUsize>,
        uninits: Arc<AtomicUsize>,
        fail_next_init: AtomicBool,
    }

    impl Lifecycle<Slot> for Counting {
        fn create(&self) -> Slot {
            Slot::default()
        }

        fn init(&self, slot: &mut Slot) -> Result<()> {
            if self.fail_next_init.swap(false, Ordering::AcqRel) {
                return Err(Error::Callback("init refused".into()));
            }
            assert!(!slot.ready);
            slot.ready = true;
            self.inits.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        fn uninit(&self, slot: &mut Slot) {
            assert!(slot.ready);
            slot.ready = false;
            self.uninits.fetch_add(1, Ordering::AcqRel);
        }
    }

    #[test]
    fn grows_by_blocks() {
        let system = System::new(1).unwrap();
        let index = system.assign().unwrap();
        let freelist = Freelist::new(&system, 4, 1, Counting::default()).unwrap();
        assert_eq!(freelist.alloc_count(), 4);
        assert_eq!(freelist.available_count(), 4);
        assert_eq!(freelist.block_count(), 1);

        let mut tdes = freelist.descriptor(&index).unwrap();
        let claimed: Vec<_> = (0..5)
            .map(|_| freelist.claim(&mut tdes).unwrap())
            .collect();
        assert!(claimed.iter().all(|slot| slot.ready));
        assert_eq!(freelist.block_count(), 2);
        assert_eq!(freelist.alloc_count(), 8);
        assert_eq!(freelist.claimed_count(), 5);
        assert_eq!(freelist.available_count(), 3);

        for slot in claimed {
            freelist.retire(&mut tdes, slot).unwrap();
        }
        assert_eq!(freelist.claimed_count(), 0);

        tdes.flush();
        freelist.table().run_deferred();
        assert_eq!(freelist.retired_count(), 0);
        assert_eq!(freelist.available_count(), 8);
    }

    #[test]
    fn init_runs_once_per_node() {
        let system = System::new(1).unwrap();
        let index = system.assign().unwrap();
        let lifecycle = Counting::default();
        let inits = Arc::clone(&lifecycle.inits);
        let uninits = Arc::clone(&lifecycle.uninits);

        let freelist = Freelist::new(&system, 2, 1, lifecycle).unwrap();
        {
            let mut tdes = freelist.descriptor(&index).unwrap();
            for _ in 0..20 {
                let mut slot = freelist.claim(&mut tdes).unwrap();
                slot.uses += 1;
                freelist.retire(&mut tdes, slot).unwrap();
                tdes.flush();
                freelist.table().run_deferred();
            }
        }

        assert_eq!(freelist.alloc_count(), 2);
        let inits = inits.load(Ordering::Acquire);
        assert!((1..=2).contains(&inits));
        assert_eq!(uninits.load(Ordering::Acquire), 0);

        drop(freelist);
        assert_eq!(uninits.load(Ordering::Acquire), inits);
    }

    #[test]
    fn failed_init_retires_the_node() {
        let system = System::new(1).unwrap();
        let index = system.assign().unwrap();
        let lifecycle = Counting::default();
        lifecycle.fail_next_init.store(true, Ordering::Release);
        let inits = Arc::clone(&lifecycle.inits);

        let freelist = Freelist::new(&system, 1, 1, lifecycle).unwrap();
        let mut tdes = freelist.descriptor(&index).unwrap();

        assert!(matches!(freelist.claim(&mut tdes), Err(Error::Callback(_))));
        assert_eq!(freelist.claimed_count(), 0);
        assert_eq!(inits.load(Ordering::Acquire), 0);

        let slot = freelist.claim(&mut tdes).unwrap();
        assert!(slot.ready);
        assert_eq!(inits.load(Ordering::Acquire), 1);
    }

    #[test]
    fn stash_is_claimed_first() {
        let system = System::new(1).unwrap();
        let index = system.assign().unwrap();
        let freelist = Freelist::new(&system, 8, 1, Counting::default()).unwrap();
        let mut tdes = freelist.descriptor(&index).unwrap();

        let slot = freelist.claim(&mut tdes).unwrap();
        let ptr = slot.as_ptr();
        tdes.save_reclaimable(slot);
        assert_eq!(freelist.claimed_count(), 1);

        let again = freelist.claim(&mut tdes).unwrap();
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(freelist.claimed_count(), 1);

        // A stashed node is retired with its descriptor.
        tdes.save_reclaimable(again);
        drop(tdes);
        assert_eq!(freelist.claimed_count(), 0);
    }

    #[test]
    fn concurrent_claims_are_exclusive() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 2_000;

        let system = System::new(THREADS).unwrap();
        let freelist = Freelist::new(&system, 8, 1, Counting::default()).unwrap();
        let barrier = Barrier::new(THREADS);

        std::thread::scope(|s| {
            for id in 1..=THREADS {
                let (system, freelist, barrier) = (&system, &freelist, &barrier);
                s.spawn(move || {
                    let index = system.assign().unwrap();
                    let mut tdes = freelist.descriptor(&index).unwrap();
                    barrier.wait();

                    for round in 0..ROUNDS {
                        // Keep a transaction open across some of the rounds.
                        if round % 7 == 0 {
                            tdes.start_tran();
                        }

                        let mut slot = freelist.claim(&mut tdes).unwrap();
                        assert_eq!(slot.owner.swap(id, Ordering::AcqRel), 0);
                        slot.uses += 1;
                        assert_eq!(slot.owner.swap(0, Ordering::AcqRel), id);
                        freelist.retire(&mut tdes, slot).unwrap();

                        if round % 7 == 3 {
                            tdes.end_tran();
                        }
                    }
                });
            }
        });

        assert_eq!(freelist.claimed_count(), 0);
        freelist.table().run_deferred();
        assert_eq!(freelist.available_count(), freelist.alloc_count());
    }

    #[test]
    fn out_of_memory() {
        struct Zeroed;

        impl Lifecycle<u64> for Zeroed {
            fn create(&self) -> u64 {
                0
            }
        }

        let system = System::new(1).unwrap();
        assert!(matches!(
            Freelist::new(&system, usize::MAX / 2, 1, Zeroed),
            Err(Error::OutOfMemory { .. })
        ));

        // Without pre-allocated blocks, the first claim hits the failure.
        let freelist = Freelist::new(&system, usize::MAX / 2, 0, Zeroed).unwrap();
        let index = system.assign().unwrap();
        let mut tdes = freelist.descriptor(&index).unwrap();
        assert!(matches!(
            freelist.claim(&mut tdes),
            Err(Error::OutOfMemory { .. })
        ));
        assert_eq!(freelist.claimed_count(), 0);
        // Nothing was allocated, so nothing is counted.
        assert_eq!(freelist.alloc_count(), 0);
        assert_eq!(freelist.block_count(), 0);

        assert!(matches!(
            Freelist::new(&system, 0, 1, Zeroed),
            Err(Error::InvalidConfig(_))
        ));
    }
}
