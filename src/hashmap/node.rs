use super::{EntryDescriptor, Protection};
use crate::{
    common::{callback_error, error::Result},
    freelist::{FreeNode, Lifecycle},
};

use crossbeam_epoch::{Atomic, Shared};
use std::{cell::UnsafeCell, fmt, sync::Arc};

pub(crate) type Link<D, P> = Atomic<FreeNode<Node<D, P>>>;
pub(crate) type NodePtr<'g, D, P> = Shared<'g, FreeNode<Node<D, P>>>;

/// The storage of one entry of a [`HashMap`](super::HashMap): the chain link,
/// the key, the caller's entry and the entry lock.
///
/// Callers only see nodes they have claimed through
/// [`HashMap::freelist_claim`](super::HashMap::freelist_claim).
pub struct Node<D: EntryDescriptor, P: Protection> {
    pub(crate) next: Link<D, P>,
    key: UnsafeCell<D::Key>,
    entry: UnsafeCell<D::Entry>,
    pub(crate) lock: P::Lock,
}

// The key is written only while the node is claimed and unlinked. The entry is
// written only under the entry lock, or while claimed.
unsafe impl<D: EntryDescriptor, P: Protection> Sync for Node<D, P> {}
unsafe impl<D: EntryDescriptor, P: Protection> Send for Node<D, P> {}

impl<D: EntryDescriptor, P: Protection> Node<D, P> {
    /// Returns the key of this node.
    pub fn key(&self) -> &D::Key {
        unsafe { &*self.key.get() }
    }

    /// Returns the entry of this node.
    pub fn entry(&self) -> &D::Entry {
        unsafe { &*self.entry.get() }
    }

    /// Returns the entry of this node for writing.
    pub fn entry_mut(&mut self) -> &mut D::Entry {
        self.entry.get_mut()
    }

    pub(crate) fn key_mut(&mut self) -> &mut D::Key {
        self.key.get_mut()
    }

    /// # Safety
    ///
    /// The caller must hold this node's lock, and the map must be
    /// mutex-protected.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn entry_mut_locked(&self) -> &mut D::Entry {
        &mut *self.entry.get()
    }
}

impl<D, P> fmt::Debug for Node<D, P>
where
    D: EntryDescriptor,
    D::Key: fmt::Debug,
    D::Entry: fmt::Debug,
    P: Protection,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", self.key())
            .field("entry", self.entry())
            .finish()
    }
}

/// Runs the entry descriptor's `init` and `uninit` callbacks for the nodes of
/// a map's freelist.
pub struct NodeLifecycle<D> {
    descriptor: Arc<D>,
}

impl<D> NodeLifecycle<D> {
    pub(crate) fn new(descriptor: Arc<D>) -> Self {
        Self { descriptor }
    }

    pub(crate) fn descriptor(&self) -> &D {
        &self.descriptor
    }
}

impl<D: EntryDescriptor, P: Protection> Lifecycle<Node<D, P>> for NodeLifecycle<D> {
    fn create(&self) -> Node<D, P> {
        Node {
            next: Atomic::null(),
            key: UnsafeCell::new(D::Key::default()),
            entry: UnsafeCell::new(D::Entry::default()),
            lock: P::new_lock(),
        }
    }

    fn init(&self, node: &mut Node<D, P>) -> Result<()> {
        self.descriptor
            .init(node.entry_mut())
            .map_err(|e| callback_error(e, "init"))
    }

    fn uninit(&self, node: &mut Node<D, P>) {
        self.descriptor.uninit(node.entry_mut());
    }
}
