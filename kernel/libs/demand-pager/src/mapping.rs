// SPDX-License-Identifier: MPL-2.0

//! Mapping regions and the per-consumer table that tracks them.

use crate::{prelude::*, store::SharedStore};

/// One active mapping of a [`SharedStore`] into a consumer's address space.
///
/// A region does not own the store: it keeps a weak reference, and the store
/// stays alive only as long as its owner keeps it. What the region does
/// guarantee is that the owner can see it. Every open of the region is also
/// counted by the store (see [`SharedStore::nr_mappings`]), and the store
/// refuses to release data while that count is non-zero.
///
/// Regions are created and counted through a [`MapContext`].
pub struct MappingRegion {
    store: Weak<SharedStore>,
    open_count: AtomicUsize,
}

impl Debug for MappingRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MappingRegion")
            .field("open_count", &self.open_count())
            .field("store_alive", &(self.store.strong_count() > 0))
            .finish()
    }
}

impl MappingRegion {
    fn new(store: &Arc<SharedStore>) -> Self {
        store.inc_mappings();
        Self {
            store: Arc::downgrade(store),
            open_count: AtomicUsize::new(1),
        }
    }

    /// Returns the number of opens not yet matched by a close.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::Acquire)
    }

    /// Returns whether every open has been matched by a close.
    pub fn is_closed(&self) -> bool {
        self.open_count() == 0
    }

    /// Returns the mapped store, or `None` if its owner has reclaimed it.
    pub fn store(&self) -> Option<Arc<SharedStore>> {
        self.store.upgrade()
    }

    fn open(&self) {
        if let Some(store) = self.store() {
            store.inc_mappings();
        }
        self.open_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Returns the remaining open count.
    fn close(&self) -> usize {
        let res = self
            .open_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        let Ok(old) = res else {
            warn!("closing a mapping region that is already closed");
            return 0;
        };
        if let Some(store) = self.store() {
            store.dec_mappings();
        }
        old - 1
    }
}

/// The table of mapping regions of one consumer context.
///
/// A context holds at most one region per store. Opening a store that is
/// already mapped in the context reuses that region and bumps its open count;
/// closing the last open of a region drops the region from the table.
pub struct MapContext {
    regions: Mutex<BTreeMap<usize, Arc<MappingRegion>>>,
}

impl Debug for MapContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MapContext")
            .field("nr_regions", &self.nr_regions())
            .finish()
    }
}

impl Default for MapContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Stores are keyed by address. A region keeps a weak reference to its
/// store, so the address cannot be reused while the region is in a table.
fn store_key(store: &Arc<SharedStore>) -> usize {
    Arc::as_ptr(store) as usize
}

impl MapContext {
    pub const fn new() -> Self {
        Self {
            regions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Maps `store` into this context.
    ///
    /// Returns the region of the store, creating it with an open count of one
    /// if the store is not mapped here yet.
    pub fn open(&self, store: &Arc<SharedStore>) -> Arc<MappingRegion> {
        let mut regions = self.regions.lock();
        let region = regions
            .entry(store_key(store))
            .and_modify(|region| region.open())
            .or_insert_with(|| Arc::new(MappingRegion::new(store)));
        trace!("open mapping region: {:?}", region);
        region.clone()
    }

    /// Unmaps one open of `region`.
    ///
    /// Returns `true` if, after this close, no mapping of the region's store
    /// remains anywhere. The store itself is never freed here; that is left
    /// to its owner.
    pub fn close(&self, region: &Arc<MappingRegion>) -> bool {
        let mut regions = self.regions.lock();
        if region.close() == 0 {
            regions.retain(|_, other| !Arc::ptr_eq(other, region));
        }
        region.store().is_none_or(|store| !store.is_mapped())
    }

    /// Returns the region that maps `store` in this context, if any.
    pub fn region_of(&self, store: &Arc<SharedStore>) -> Option<Arc<MappingRegion>> {
        self.regions.lock().get(&store_key(store)).cloned()
    }

    /// Returns the number of regions in this context.
    pub fn nr_regions(&self) -> usize {
        self.regions.lock().len()
    }
}
