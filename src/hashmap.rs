//! A lock-free hash map of chained buckets whose entries live in a
//! [`Freelist`] and are reclaimed through transactions.
//!
//! Every bucket is a singly linked list. Links are only changed by CAS, and
//! an entry is deleted in two steps: its own `next` link is marked first, then
//! it is unlinked from its predecessor. A marked `next` link blocks every
//! concurrent insertion after the entry and every concurrent deletion of its
//! successor, so no chain is ever left partially linked.
//!
//! The map never frees an entry. An unlinked entry is handed back to the
//! freelist, which reuses its storage once every transaction that could still
//! read it has ended.
//!
//! # Protection
//!
//! The second type parameter of [`HashMap`] selects how an entry returned to
//! the caller stays valid:
//!
//! - [`EpochProtected`]: the caller's transaction stays open until the
//!   [`EntryRef`] is released.
//! - [`MutexProtected`]: the entry's mutex is held until the [`EntryRef`] is
//!   released, and the transaction ends right away.
//!
//! # Example
//!
//! ```rust
//! use lf_hashmap::{tran::System, BoxError, EntryDescriptor, HashMap, InsertResult};
//!
//! #[derive(Default)]
//! struct Session {
//!     user: String,
//! }
//!
//! struct Sessions;
//!
//! impl EntryDescriptor for Sessions {
//!     type Key = u64;
//!     type Entry = Session;
//!
//!     fn hash(&self, key: &u64, bucket_count: usize) -> usize {
//!         (*key as usize) % bucket_count
//!     }
//!
//!     fn key_compare(&self, key: &u64, entry_key: &u64) -> bool {
//!         key == entry_key
//!     }
//!
//!     fn key_copy(&self, key: &u64, dest: &mut u64) -> Result<(), BoxError> {
//!         *dest = *key;
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> lf_hashmap::Result<()> {
//! let system = System::new(4)?;
//! let index = system.assign()?;
//!
//! let map = HashMap::builder(Sessions).bucket_count(64).build(&system)?;
//! let mut tdes = map.descriptor(&index)?;
//!
//! let mut key = 7;
//! match map.find_or_insert(&mut tdes, &mut key)? {
//!     InsertResult::Inserted(entry) => assert_eq!(*entry.key(), 7),
//!     InsertResult::Existing(_) => unreachable!(),
//! }
//!
//! assert!(map.find(&mut tdes, &7).is_some());
//! assert!(map.erase(&mut tdes, &7));
//! assert!(map.find(&mut tdes, &7).is_none());
//! # Ok(())
//! # }
//! ```

mod builder;
mod descriptor;
mod entry_ref;
mod iter;
mod node;
mod protection;

pub use builder::HashMapBuilder;
pub use descriptor::{Duplicate, EntryDescriptor};
pub use entry_ref::{EntryRef, InsertResult};
pub use iter::Iter;
pub use node::{Node, NodeLifecycle};
pub use protection::{EpochProtected, MutexProtected, Protection};

use crate::{
    address_marker::{atomic_strip_mark, AddressMark},
    common::{
        callback_error,
        error::{Error, Result},
    },
    freelist::{Claimed, FreeNode, Freelist},
    tran::{Descriptor, Index, Reclaimable},
};
use node::{Link, NodePtr};

use crossbeam_epoch::{self as epoch, Atomic, Guard, Shared};
use crossbeam_utils::{Backoff, CachePadded};
use parking_lot::Mutex;
use std::{
    fmt,
    ptr::NonNull,
    sync::atomic::{AtomicIsize, AtomicUsize, Ordering},
};

/// The freelist of the nodes of a map.
pub type NodeFreelist<D, P> = Freelist<Node<D, P>, NodeLifecycle<D>>;

/// A node claimed from a map's freelist.
pub type ClaimedNode<'m, D, P> = Claimed<'m, Node<D, P>, NodeLifecycle<D>>;

/// The transaction descriptor of one thread on one map.
pub type TranDescriptor<'m, D, P> = Descriptor<'m, ClaimedNode<'m, D, P>>;

/// Returns the guard used for loads inside a map operation.
///
/// Every operation keeps its descriptor's transaction open while it
/// dereferences nodes reached from the bucket array, or holds the lock of the
/// only node it still reads. Deferred functions are never scheduled on this
/// guard.
#[inline]
fn traversal_guard() -> &'static Guard {
    unsafe { epoch::unprotected() }
}

enum Lookup<T> {
    Done(T),
    Restart,
}

enum Insertion<T> {
    Inserted(T),
    Existing(T),
    Rejected,
    Restart,
}

/// A lock-free hash map with a fixed number of buckets.
///
/// See the [module documentation](self) for the guarantees it gives.
///
/// # Panics
///
/// Every operation that takes a [`TranDescriptor`] panics if the descriptor
/// was registered on another map.
pub struct HashMap<D: EntryDescriptor, P: Protection = EpochProtected> {
    freelist: NodeFreelist<D, P>,
    buckets: [Box<[Link<D, P>]>; 2],
    current: AtomicUsize,
    clear_lock: Mutex<()>,
    element_count: CachePadded<AtomicIsize>,
}

impl<D: EntryDescriptor> HashMap<D, EpochProtected> {
    /// Returns a builder for a map with the policies of `descriptor`.
    ///
    /// The map is epoch-protected unless
    /// [`HashMapBuilder::mutex_protected`] is called.
    pub fn builder(descriptor: D) -> HashMapBuilder<D, EpochProtected> {
        HashMapBuilder::new(descriptor)
    }
}

impl<D: EntryDescriptor, P: Protection> HashMap<D, P> {
    pub(crate) fn with_parts(
        freelist: NodeFreelist<D, P>,
        live: Box<[Link<D, P>]>,
        backbuffer: Box<[Link<D, P>]>,
    ) -> Self {
        debug_assert_eq!(live.len(), backbuffer.len());

        Self {
            freelist,
            buckets: [live, backbuffer],
            current: AtomicUsize::new(0),
            clear_lock: Mutex::new(()),
            element_count: CachePadded::new(AtomicIsize::default()),
        }
    }

    /// Returns the entry descriptor of this map.
    pub fn entry_descriptor(&self) -> &D {
        self.freelist.lifecycle().descriptor()
    }

    /// Registers the transaction descriptor of `index` on this map.
    pub fn descriptor(&self, index: &Index) -> Result<TranDescriptor<'_, D, P>> {
        self.freelist.descriptor(index)
    }

    /// Returns the number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets[0].len()
    }

    /// Returns the approximate number of linked entries.
    pub fn element_count(&self) -> usize {
        self.element_count.load(Ordering::Acquire).max(0) as usize
    }

    /// Returns the freelist that backs the entries of this map.
    pub fn freelist(&self) -> &NodeFreelist<D, P> {
        &self.freelist
    }

    /// Claims an unlinked node, for example to fill it before
    /// [`insert_given`](Self::insert_given).
    pub fn freelist_claim<'m>(
        &'m self,
        tdes: &mut TranDescriptor<'m, D, P>,
    ) -> Result<ClaimedNode<'m, D, P>> {
        self.freelist.claim(tdes)
    }

    /// Retires a claimed node that will not be inserted.
    ///
    /// Returns [`Error::ForeignNode`] if `claimed` comes from another map.
    pub fn freelist_retire<'m>(
        &'m self,
        tdes: &mut TranDescriptor<'m, D, P>,
        claimed: ClaimedNode<'m, D, P>,
    ) -> Result<()> {
        self.freelist.retire(tdes, claimed)
    }

    /// Opens a transaction on `tdes`.
    pub fn start_tran(&self, tdes: &mut TranDescriptor<'_, D, P>) {
        tdes.start_tran();
    }

    /// Closes the transaction of `tdes`.
    pub fn end_tran(&self, tdes: &mut TranDescriptor<'_, D, P>) {
        tdes.end_tran();
    }

    fn live_buckets(&self) -> &[Link<D, P>] {
        &self.buckets[self.current.load(Ordering::Acquire)]
    }

    fn bucket(&self, key: &D::Key) -> &Link<D, P> {
        let buckets = self.live_buckets();
        let index = self.entry_descriptor().hash(key, buckets.len()) % buckets.len();
        &buckets[index]
    }

    /// Retires a node claimed from this map's freelist and never linked.
    fn retire_claimed<'m>(
        &'m self,
        tdes: &mut TranDescriptor<'m, D, P>,
        claimed: ClaimedNode<'m, D, P>,
    ) {
        debug_assert!(self.freelist.owns(&claimed));
        tdes.in_tran(|guard| claimed.reclaim(guard));
    }

    /// Gives up the protection of a node: its lock in mutex mode, the
    /// transaction otherwise.
    fn release(&self, tdes: &mut TranDescriptor<'_, D, P>, node: &Node<D, P>) {
        if P::USES_MUTEX {
            unsafe { P::unlock(&node.lock) };
        } else {
            tdes.end_tran();
        }
    }

    /// Locks `node` in mutex mode and checks that it is not being deleted.
    /// Must be called inside a transaction.
    fn acquire(&self, node: &Node<D, P>) -> bool {
        if !P::USES_MUTEX {
            return true;
        }

        P::lock(&node.lock);
        if node.next.load(Ordering::Acquire, traversal_guard()).is_marked() {
            unsafe { P::unlock(&node.lock) };
            return false;
        }
        true
    }

    /// Finds the entry of `key`.
    ///
    /// The returned entry is protected until it is released (see
    /// [`EntryRef`]). When nothing is found, the transaction of `tdes` is
    /// closed.
    pub fn find<'d, 'm>(
        &'m self,
        tdes: &'d mut TranDescriptor<'m, D, P>,
        key: &D::Key,
    ) -> Option<EntryRef<'d, 'm, D, P>> {
        self.freelist.check_descriptor(tdes);

        loop {
            tdes.start_tran();

            match self.find_in_bucket(key) {
                Lookup::Done(Some(node)) => {
                    if P::USES_MUTEX {
                        tdes.end_tran();
                    }
                    return Some(EntryRef::new(tdes, node));
                }
                Lookup::Done(None) => {
                    tdes.end_tran();
                    return None;
                }
                Lookup::Restart => tdes.end_tran(),
            }
        }
    }

    fn find_in_bucket(&self, key: &D::Key) -> Lookup<Option<NonNull<FreeNode<Node<D, P>>>>> {
        let guard = traversal_guard();
        let mut curr = atomic_strip_mark(self.bucket(key), guard);

        while let Some(node) = unsafe { curr.as_ref() } {
            if self.entry_descriptor().key_compare(key, node.key()) {
                if !self.acquire(node) {
                    // Deleted while we were waiting for the lock.
                    return Lookup::Restart;
                }
                return Lookup::Done(Some(NonNull::from(node)));
            }

            curr = atomic_strip_mark(&node.next, guard);
        }

        Lookup::Done(None)
    }

    /// Inserts a new entry for `key`, or returns `Ok(None)` if `key` is
    /// already present.
    ///
    /// When the descriptor's [`duplicate`](EntryDescriptor::duplicate)
    /// callback rewrites `key` and returns [`Duplicate::Retry`], the insert
    /// restarts with the rewritten key.
    pub fn insert<'d, 'm>(
        &'m self,
        tdes: &'d mut TranDescriptor<'m, D, P>,
        key: &mut D::Key,
    ) -> Result<Option<EntryRef<'d, 'm, D, P>>> {
        let inserted = self.insert_internal(tdes, key, None, false)?;
        Ok(inserted.map(InsertResult::into_entry))
    }

    /// Returns the entry of `key`, inserting a new one if `key` is absent.
    pub fn find_or_insert<'d, 'm>(
        &'m self,
        tdes: &'d mut TranDescriptor<'m, D, P>,
        key: &mut D::Key,
    ) -> Result<InsertResult<'d, 'm, D, P>> {
        match self.insert_internal(tdes, key, None, true)? {
            Some(inserted) => Ok(inserted),
            None => unreachable!("existing entries are accepted"),
        }
    }

    /// Inserts the caller's claimed node under `key`.
    ///
    /// `key` is copied into the node. If `key` is already present, the node is
    /// retired and the existing entry is returned.
    ///
    /// Returns [`Error::ForeignNode`] if `given` was claimed from another
    /// map; it is retired to that map instead.
    pub fn insert_given<'d, 'm>(
        &'m self,
        tdes: &'d mut TranDescriptor<'m, D, P>,
        key: &mut D::Key,
        given: ClaimedNode<'m, D, P>,
    ) -> Result<InsertResult<'d, 'm, D, P>> {
        if !self.freelist.owns(&given) {
            return Err(Error::ForeignNode);
        }

        match self.insert_internal(tdes, key, Some(given), true)? {
            Some(inserted) => Ok(inserted),
            None => unreachable!("existing entries are accepted"),
        }
    }

    fn insert_internal<'d, 'm>(
        &'m self,
        tdes: &'d mut TranDescriptor<'m, D, P>,
        key: &mut D::Key,
        mut given: Option<ClaimedNode<'m, D, P>>,
        accept_existing: bool,
    ) -> Result<Option<InsertResult<'d, 'm, D, P>>> {
        self.freelist.check_descriptor(tdes);

        loop {
            match self.insert_in_bucket(tdes, key, &mut given, accept_existing)? {
                Insertion::Inserted(node) => {
                    return Ok(Some(InsertResult::Inserted(EntryRef::new(tdes, node))));
                }
                Insertion::Existing(node) => {
                    return Ok(Some(InsertResult::Existing(EntryRef::new(tdes, node))));
                }
                Insertion::Rejected => return Ok(None),
                // The bucket is computed again, since `duplicate` may have
                // rewritten the key and `clear` may have swapped the buckets.
                Insertion::Restart => {}
            }
        }
    }

    fn insert_in_bucket<'m>(
        &'m self,
        tdes: &mut TranDescriptor<'m, D, P>,
        key: &mut D::Key,
        given: &mut Option<ClaimedNode<'m, D, P>>,
        accept_existing: bool,
    ) -> Result<Insertion<NonNull<FreeNode<Node<D, P>>>>> {
        let guard = traversal_guard();
        tdes.start_tran();

        let mut link = self.bucket(key);
        let mut curr = atomic_strip_mark(link, guard);

        while let Some(node) = unsafe { curr.as_ref() } {
            if !self.entry_descriptor().key_compare(key, node.key()) {
                link = &node.next;
                curr = atomic_strip_mark(link, guard);
                continue;
            }

            if !self.acquire(node) {
                tdes.end_tran();
                return Ok(Insertion::Restart);
            }
            if P::USES_MUTEX {
                tdes.end_tran();
            }

            match self.entry_descriptor().duplicate(key, node.entry()) {
                Ok(Duplicate::Keep) => {}
                Ok(Duplicate::Retry) => {
                    self.release(tdes, node);
                    return Ok(Insertion::Restart);
                }
                Err(e) => {
                    self.release(tdes, node);
                    return Err(callback_error(e, "duplicate"));
                }
            }

            if let Some(given) = given.take() {
                self.retire_claimed(tdes, given);
            }

            if !accept_existing {
                self.release(tdes, node);
                return Ok(Insertion::Rejected);
            }
            return Ok(Insertion::Existing(NonNull::from(node)));
        }

        // End of the chain: link a new node after `link`.
        let is_given = given.is_some();
        let mut claimed = match given.take() {
            Some(claimed) => claimed,
            None => match self.freelist.claim(tdes) {
                Ok(claimed) => claimed,
                Err(e) => {
                    tdes.end_tran();
                    return Err(e);
                }
            },
        };

        if let Err(e) = self.entry_descriptor().key_copy(key, claimed.key_mut()) {
            if is_given {
                *given = Some(claimed);
            } else {
                self.retire_claimed(tdes, claimed);
            }
            tdes.end_tran();
            return Err(callback_error(e, "key_copy"));
        }

        claimed.next.store(Shared::null(), Ordering::Relaxed);
        P::lock(&claimed.lock);

        let new = claimed.as_shared();
        match link.compare_exchange(
            Shared::null(),
            new,
            Ordering::AcqRel,
            Ordering::Acquire,
            guard,
        ) {
            Ok(_) => {
                let node = claimed.into_raw();
                self.element_count.fetch_add(1, Ordering::AcqRel);
                if P::USES_MUTEX {
                    // The lock now protects the entry.
                    tdes.end_tran();
                }
                Ok(Insertion::Inserted(node))
            }
            Err(_) => {
                unsafe { P::unlock(&claimed.lock) };

                if is_given {
                    *given = Some(claimed);
                } else if P::USES_MUTEX {
                    self.retire_claimed(tdes, claimed);
                } else {
                    tdes.save_reclaimable(claimed);
                }
                tdes.end_tran();
                Ok(Insertion::Restart)
            }
        }
    }

    /// Erases the entry of `key`. Returns `false` if `key` is absent.
    ///
    /// In mutex mode, this waits until the entry's lock can be acquired.
    pub fn erase<'m>(&'m self, tdes: &mut TranDescriptor<'m, D, P>, key: &D::Key) -> bool {
        self.erase_internal(tdes, key, None)
    }

    fn erase_internal<'m>(
        &'m self,
        tdes: &mut TranDescriptor<'m, D, P>,
        key: &D::Key,
        locked: Option<NonNull<FreeNode<Node<D, P>>>>,
    ) -> bool {
        self.freelist.check_descriptor(tdes);

        loop {
            tdes.start_tran();

            if let Lookup::Done(erased) = self.erase_in_bucket(tdes, key, locked) {
                return erased;
            }
        }
    }

    fn erase_in_bucket<'m>(
        &'m self,
        tdes: &mut TranDescriptor<'m, D, P>,
        key: &D::Key,
        locked: Option<NonNull<FreeNode<Node<D, P>>>>,
    ) -> Lookup<bool> {
        let guard = traversal_guard();
        let mut link = self.bucket(key);
        let mut curr = atomic_strip_mark(link, guard);

        while let Some(node) = unsafe { curr.as_ref() } {
            if !self.entry_descriptor().key_compare(key, node.key()) {
                link = &node.next;
                curr = atomic_strip_mark(link, guard);
                continue;
            }

            if let Some(locked) = locked {
                if locked != NonNull::from(node) {
                    // The caller's entry was removed by a clear, and this is
                    // a newer entry with the same key.
                    tdes.end_tran();
                    return Lookup::Done(false);
                }
            }

            let next = atomic_strip_mark(&node.next, guard);
            if let Err(e) = node.next.compare_exchange(
                next,
                next.set_mark(),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                tdes.end_tran();
                if locked.is_some() && e.current.is_marked() {
                    // Another eraser owns the mark and waits for our lock.
                    return Lookup::Done(false);
                }
                return Lookup::Restart;
            }

            // Nobody else can delete the entry once its link is marked.
            if locked.is_none() {
                P::lock(&node.lock);
            }

            if link
                .compare_exchange(curr, next, Ordering::AcqRel, Ordering::Acquire, guard)
                .is_err()
            {
                if locked.is_none() {
                    unsafe { P::unlock(&node.lock) };
                }

                let unmarked = node.next.compare_exchange(
                    next.set_mark(),
                    next,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                );
                debug_assert!(unmarked.is_ok());

                tdes.end_tran();
                return Lookup::Restart;
            }

            unsafe { P::unlock(&node.lock) };
            tdes.in_tran(|guard| unsafe {
                self.freelist.retire_unlinked(NonNull::from(node), guard);
            });
            self.element_count.fetch_sub(1, Ordering::AcqRel);
            tdes.end_tran();

            return Lookup::Done(true);
        }

        tdes.end_tran();
        Lookup::Done(false)
    }

    /// Releases an entry returned by `find` or the insert family. Dropping
    /// the [`EntryRef`] does the same.
    pub fn unlock(&self, entry: EntryRef<'_, '_, D, P>) {
        drop(entry);
    }

    /// Removes every entry.
    ///
    /// This is not lock-free: concurrent clears are serialized, and in mutex
    /// mode a clear waits for the lock of every entry it removes. Entries that
    /// other threads still hold stay valid until they are released.
    pub fn clear<'m>(&'m self, tdes: &mut TranDescriptor<'m, D, P>) {
        self.freelist.check_descriptor(tdes);
        let _clear = self.clear_lock.lock();
        let guard = traversal_guard();

        // Inserts racing with the swap see the marked nulls of the backbuffer
        // and restart.
        let old = self.current.load(Ordering::Acquire);
        let live = 1 - old;
        self.current.store(live, Ordering::Release);

        for slot in self.buckets[live].iter() {
            debug_assert!(slot.load(Ordering::Relaxed, guard).is_marked());
            slot.store(Shared::null(), Ordering::Release);
        }

        #[cfg(feature = "logging")]
        let mut retired = 0_usize;

        for head in self.buckets[old].iter() {
            tdes.start_tran();

            let mut curr = self.detach_chain(head, guard);
            while let Some(node) = unsafe { curr.as_ref() } {
                let next = mark_next(node, guard);

                if P::USES_MUTEX {
                    // Wait for the current holder. Anyone locking the entry
                    // later sees the mark and lets it go.
                    P::lock(&node.lock);
                    unsafe { P::unlock(&node.lock) };
                }

                tdes.in_tran(|guard| unsafe {
                    self.freelist.retire_unlinked(NonNull::from(node), guard);
                });
                self.element_count.fetch_sub(1, Ordering::AcqRel);
                #[cfg(feature = "logging")]
                {
                    retired += 1;
                }

                curr = next;
            }

            tdes.end_tran();
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "Cleared a hash map of {} buckets, retiring {} entries",
            self.bucket_count(),
            retired
        );
    }

    /// Swaps the head of an old bucket with a marked null and returns the
    /// chain it held.
    fn detach_chain<'g>(&self, head: &Link<D, P>, guard: &'g Guard) -> NodePtr<'g, D, P> {
        let backoff = Backoff::new();
        loop {
            let curr = atomic_strip_mark(head, guard);
            if head
                .compare_exchange(
                    curr,
                    Shared::null().set_mark(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                )
                .is_ok()
            {
                return curr;
            }
            backoff.spin();
        }
    }

    /// Returns a cursor over every entry of this map.
    pub fn iter<'d, 'm>(&'m self, tdes: &'d mut TranDescriptor<'m, D, P>) -> Iter<'d, 'm, D, P> {
        self.freelist.check_descriptor(tdes);
        Iter::new(self, tdes)
    }

    /// Drops this map. Every entry's storage is uninitialised.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<D: EntryDescriptor> HashMap<D, MutexProtected> {
    /// Erases the entry of `key` whose lock the caller already holds through
    /// `entry`.
    ///
    /// Nothing changes and `entry` is handed back, still locked, if the entry
    /// found for `key` is not `entry` (a clear has removed `entry` meanwhile),
    /// or if a concurrent [`erase`](Self::erase) is already deleting `entry`
    /// and waits for its lock.
    pub fn erase_locked<'d, 'm>(
        &'m self,
        key: &D::Key,
        entry: EntryRef<'d, 'm, D, MutexProtected>,
    ) -> std::result::Result<(), EntryRef<'d, 'm, D, MutexProtected>> {
        let (tdes, node) = entry.into_parts();

        if self.erase_internal(tdes, key, Some(node)) {
            Ok(())
        } else {
            Err(EntryRef::new(tdes, node))
        }
    }
}

/// Marks the `next` link of a detached node, waiting for an in-flight erase
/// that holds the mark to roll it back. Returns the unmarked successor.
fn mark_next<'g, D, P>(node: &Node<D, P>, guard: &'g Guard) -> NodePtr<'g, D, P>
where
    D: EntryDescriptor,
    P: Protection,
{
    let backoff = Backoff::new();
    loop {
        let next = atomic_strip_mark(&node.next, guard);
        if node
            .next
            .compare_exchange(next, next.set_mark(), Ordering::AcqRel, Ordering::Acquire, guard)
            .is_ok()
        {
            return next;
        }
        backoff.snooze();
    }
}

pub(crate) fn bucket_array<D, P>(len: usize, marked: bool) -> Result<Box<[Link<D, P>]>>
where
    D: EntryDescriptor,
    P: Protection,
{
    let mut buckets = Vec::new();
    if buckets.try_reserve_exact(len).is_err() {
        #[cfg(feature = "logging")]
        log::error!("Failed to allocate a bucket array of {len} buckets");

        return Err(Error::OutOfMemory { block_size: len });
    }

    let empty = if marked {
        Shared::null().set_mark()
    } else {
        Shared::null()
    };
    buckets.extend((0..len).map(|_| Atomic::from(empty)));

    Ok(buckets.into_boxed_slice())
}

impl<D: EntryDescriptor, P: Protection> Drop for HashMap<D, P> {
    fn drop(&mut self) {
        #[cfg(feature = "logging")]
        log::trace!(
            "Dropping a hash map with {} entries ({} nodes claimed, {} allocated)",
            self.element_count(),
            self.freelist.claimed_count(),
            self.freelist.alloc_count()
        );
    }
}

impl<D: EntryDescriptor, P: Protection> fmt::Debug for HashMap<D, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashMap")
            .field("bucket_count", &self.bucket_count())
            .field("element_count", &self.element_count())
            .field("freelist", &self.freelist)
            .finish()
    }
}
