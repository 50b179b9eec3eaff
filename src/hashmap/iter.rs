use super::{
    traversal_guard, EntryDescriptor, HashMap, MutexProtected, Node, Protection, TranDescriptor,
};
use crate::{
    address_marker::{atomic_strip_mark, AddressMark},
    freelist::FreeNode,
};

use std::{ptr::NonNull, sync::atomic::Ordering};

/// A cursor over the entries of a [`HashMap`].
///
/// One transaction is held per bucket. In a mutex-protected map the entry
/// last returned stays locked until the next call. Entries inserted or erased
/// during the walk may or may not be seen.
///
/// Dropping the cursor releases its lock and transaction.
pub struct Iter<'d, 'm, D: EntryDescriptor, P: Protection> {
    map: &'m HashMap<D, P>,
    tdes: &'d mut TranDescriptor<'m, D, P>,
    bucket: Option<usize>,
    curr: Option<NonNull<FreeNode<Node<D, P>>>>,
}

impl<'d, 'm, D: EntryDescriptor, P: Protection> Iter<'d, 'm, D, P> {
    pub(crate) fn new(map: &'m HashMap<D, P>, tdes: &'d mut TranDescriptor<'m, D, P>) -> Self {
        Self {
            map,
            tdes,
            bucket: None,
            curr: None,
        }
    }

    /// Returns the key and entry of the next live entry, or `None` once every
    /// bucket has been visited.
    pub fn iterate(&mut self) -> Option<(&D::Key, &D::Entry)> {
        let node = self.advance()?;
        let node = unsafe { node.as_ref() };
        Some((node.key(), node.entry()))
    }

    /// Starts over from the first bucket, releasing the current entry.
    pub fn restart(&mut self) {
        self.release_current();
        self.tdes.end_tran();
        self.bucket = None;
    }

    fn release_current(&mut self) -> Option<NonNull<FreeNode<Node<D, P>>>> {
        let curr = self.curr.take()?;
        unsafe { P::unlock(&curr.as_ref().lock) };
        Some(curr)
    }

    fn advance(&mut self) -> Option<NonNull<FreeNode<Node<D, P>>>> {
        let guard = traversal_guard();

        loop {
            let next = match self.release_current() {
                // Still inside the transaction of this bucket.
                Some(prev) => atomic_strip_mark(&unsafe { prev.as_ref() }.next, guard),
                None => {
                    self.tdes.end_tran();

                    let bucket = self.bucket.map_or(0, |b| b + 1);
                    let buckets = self.map.live_buckets();
                    if bucket >= buckets.len() {
                        self.bucket = Some(buckets.len());
                        return None;
                    }

                    self.bucket = Some(bucket);
                    self.tdes.start_tran();
                    atomic_strip_mark(&buckets[bucket], guard)
                }
            };

            let Some(node) = (unsafe { next.as_ref() }) else {
                // End of this bucket.
                continue;
            };

            P::lock(&node.lock);
            self.curr = Some(NonNull::from(node));

            if node.next.load(Ordering::Acquire, guard).is_marked() {
                // Being deleted. Skip it, but go on from its successor.
                continue;
            }
            return self.curr;
        }
    }
}

impl<'d, 'm, D: EntryDescriptor> Iter<'d, 'm, D, MutexProtected> {
    /// Like [`iterate`](Self::iterate), with write access to the entry, whose
    /// lock is held until the next call.
    pub fn iterate_mut(&mut self) -> Option<(&D::Key, &mut D::Entry)> {
        let node = self.advance()?;
        let node = unsafe { node.as_ref() };
        Some((node.key(), unsafe { node.entry_mut_locked() }))
    }
}

impl<D: EntryDescriptor, P: Protection> Drop for Iter<'_, '_, D, P> {
    fn drop(&mut self) {
        self.restart();
    }
}
