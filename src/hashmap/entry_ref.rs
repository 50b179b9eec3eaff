use super::{EntryDescriptor, MutexProtected, Node, Protection, TranDescriptor};
use crate::freelist::FreeNode;

use std::{
    fmt,
    mem::ManuallyDrop,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
};

/// A protected entry of a [`HashMap`](super::HashMap).
///
/// The entry cannot be reused by another key while this handle exists. In an
/// epoch-protected map the transaction of the borrowed descriptor stays open;
/// in a mutex-protected map the entry's lock is held, which also gives
/// mutable access through [`DerefMut`].
///
/// Dropping the handle releases the protection.
pub struct EntryRef<'d, 'm, D: EntryDescriptor, P: Protection> {
    tdes: &'d mut TranDescriptor<'m, D, P>,
    node: NonNull<FreeNode<Node<D, P>>>,
}

impl<'d, 'm, D: EntryDescriptor, P: Protection> EntryRef<'d, 'm, D, P> {
    pub(crate) fn new(
        tdes: &'d mut TranDescriptor<'m, D, P>,
        node: NonNull<FreeNode<Node<D, P>>>,
    ) -> Self {
        Self { tdes, node }
    }

    fn node(&self) -> &Node<D, P> {
        unsafe { self.node.as_ref() }
    }

    /// Returns the key of the entry.
    pub fn key(&self) -> &D::Key {
        self.node().key()
    }

    /// Returns the entry.
    pub fn entry(&self) -> &D::Entry {
        self.node().entry()
    }

    /// Releases the entry. Same as dropping it.
    pub fn unlock(self) {}

    /// Splits the handle without releasing the protection.
    pub(crate) fn into_parts(
        self,
    ) -> (
        &'d mut TranDescriptor<'m, D, P>,
        NonNull<FreeNode<Node<D, P>>>,
    ) {
        let this = ManuallyDrop::new(self);
        // `this` is never dropped, so the descriptor borrow is moved out once.
        let tdes = unsafe { ptr::read(&this.tdes) };
        (tdes, this.node)
    }
}

impl<D: EntryDescriptor, P: Protection> Deref for EntryRef<'_, '_, D, P> {
    type Target = D::Entry;

    fn deref(&self) -> &D::Entry {
        self.entry()
    }
}

impl<D: EntryDescriptor> DerefMut for EntryRef<'_, '_, D, MutexProtected> {
    fn deref_mut(&mut self) -> &mut D::Entry {
        // The entry's lock is held.
        unsafe { self.node().entry_mut_locked() }
    }
}

impl<D: EntryDescriptor, P: Protection> Drop for EntryRef<'_, '_, D, P> {
    fn drop(&mut self) {
        if P::USES_MUTEX {
            unsafe { P::unlock(&self.node().lock) };
        } else {
            self.tdes.end_tran();
        }
    }
}

impl<D, P> fmt::Debug for EntryRef<'_, '_, D, P>
where
    D: EntryDescriptor,
    D::Key: fmt::Debug,
    D::Entry: fmt::Debug,
    P: Protection,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryRef")
            .field("key", self.key())
            .field("entry", self.entry())
            .finish()
    }
}

/// The outcome of [`find_or_insert`](super::HashMap::find_or_insert) and
/// [`insert_given`](super::HashMap::insert_given).
pub enum InsertResult<'d, 'm, D: EntryDescriptor, P: Protection> {
    /// A new entry was linked.
    Inserted(EntryRef<'d, 'm, D, P>),
    /// The key was already present.
    Existing(EntryRef<'d, 'm, D, P>),
}

impl<'d, 'm, D: EntryDescriptor, P: Protection> InsertResult<'d, 'm, D, P> {
    /// Returns `true` if a new entry was linked.
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    /// Returns the entry, new or existing.
    pub fn into_entry(self) -> EntryRef<'d, 'm, D, P> {
        match self {
            Self::Inserted(entry) | Self::Existing(entry) => entry,
        }
    }
}

impl<D, P> fmt::Debug for InsertResult<'_, '_, D, P>
where
    D: EntryDescriptor,
    D::Key: fmt::Debug,
    D::Entry: fmt::Debug,
    P: Protection,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inserted(entry) => f.debug_tuple("Inserted").field(entry).finish(),
            Self::Existing(entry) => f.debug_tuple("Existing").field(entry).finish(),
        }
    }
}
