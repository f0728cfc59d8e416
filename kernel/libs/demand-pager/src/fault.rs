// SPDX-License-Identifier: MPL-2.0

//! The page-fault entry point.

use crate::{
    mapping::MappingRegion,
    prelude::*,
    resolver::PageResolver,
    store::{Quantum, SegmentedStore, SharedStore},
};

/// A page resolved by a fault.
///
/// The handle stands for exactly one page reference, taken when the fault
/// resolved it. It does not own the quantum; the store does. Whoever installs
/// the page is responsible for handing the reference back with
/// [`PageHandle::release`] once the page is unmapped. Dropping a handle
/// without releasing it leaves the reference outstanding.
#[must_use = "the page reference must be released"]
pub struct PageHandle {
    index: usize,
    quantum: Weak<Quantum>,
}

impl Debug for PageHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageHandle")
            .field("index", &self.index)
            .field("quantum", &self.quantum())
            .finish()
    }
}

impl PageHandle {
    /// Returns the logical block index of the page within its store.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the quantum of the page, unless the store has dropped it.
    pub fn quantum(&self) -> Option<Arc<Quantum>> {
        self.quantum.upgrade()
    }

    /// Reads the page contents starting at `offset` within the page.
    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let Some(quantum) = self.quantum() else {
            return_errno_with_message!(Errno::ENXIO, "the page has been reclaimed");
        };
        quantum.read_bytes(offset, buf)
    }

    /// Hands the page reference back.
    pub fn release(self) {
        if let Some(quantum) = self.quantum() {
            quantum.put();
        }
    }
}

/// The outcome of a page fault.
#[derive(Debug)]
#[must_use = "a resolved page reference must be released"]
pub enum FaultResult {
    /// The page exists; its map count has been raised by one.
    Resolved(PageHandle),
    /// The page lies within the store but has no quantum.
    Hole,
    /// The page lies at or beyond the end of the store.
    OutOfRange,
}

impl FaultResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, FaultResult::Resolved(_))
    }

    pub fn is_hole(&self) -> bool {
        matches!(self, FaultResult::Hole)
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, FaultResult::OutOfRange)
    }

    /// Converts the outcome into the page to install, or into the access
    /// violation that the faulting consumer should observe.
    pub fn into_page(self) -> Result<PageHandle> {
        match self {
            FaultResult::Resolved(page) => Ok(page),
            FaultResult::Hole => {
                return_errno_with_message!(Errno::EFAULT, "the faulting page is a hole")
            }
            FaultResult::OutOfRange => {
                return_errno_with_message!(Errno::EFAULT, "the faulting page is beyond the store")
            }
        }
    }
}

/// Resolves page faults on mapping regions.
///
/// Each fault is independent. The only state a fault leaves behind is the
/// raised map count of the quantum it resolved, so faulting the same page
/// `n` times takes `n` references.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultDispatcher;

impl FaultDispatcher {
    /// Handles a fault at byte `offset` of the store mapped by `region`.
    ///
    /// The offset is expected to be page-granular; it is divided by the
    /// quantum size to find the logical block.
    ///
    /// The store lock is held for the whole resolution. Fails with `ENXIO`
    /// if the store has been reclaimed by its owner.
    pub fn handle_fault(region: &MappingRegion, offset: usize) -> Result<FaultResult> {
        let store = Self::store_of(region)?;
        let locked = store.lock();
        Ok(Self::resolve_locked(&locked, offset))
    }

    /// Like [`FaultDispatcher::handle_fault`], but fails with `EAGAIN`
    /// instead of spinning if the store lock is held by someone else.
    pub fn try_handle_fault(region: &MappingRegion, offset: usize) -> Result<FaultResult> {
        let store = Self::store_of(region)?;
        let Some(locked) = store.try_lock() else {
            return_errno_with_message!(Errno::EAGAIN, "the store is locked");
        };
        Ok(Self::resolve_locked(&locked, offset))
    }

    fn store_of(region: &MappingRegion) -> Result<Arc<SharedStore>> {
        region
            .store()
            .ok_or(Error::with_message(Errno::ENXIO, "the mapped store has been reclaimed"))
    }

    fn resolve_locked(store: &SegmentedStore, offset: usize) -> FaultResult {
        let index = offset / store.quantum_size();
        trace!("handle page fault: offset = {:#x}, index = {}", offset, index);

        if index >= store.total_size() {
            return FaultResult::OutOfRange;
        }
        let Some(quantum) = PageResolver::resolve(store, index) else {
            return FaultResult::Hole;
        };
        quantum.get();
        FaultResult::Resolved(PageHandle {
            index,
            quantum: Arc::downgrade(quantum),
        })
    }
}
