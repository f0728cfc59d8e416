// SPDX-License-Identifier: MPL-2.0

//! Sparse stores made of quantum sets.
//!
//! A store is an ordered chain of [`QuantumSet`]s. Each set has `qset` slots
//! and every slot either owns a [`Quantum`] or is a hole. Logical block `i`
//! lives in set `i / qset`, slot `i % qset`.
//!
//! The chain itself is a [`SegmentedStore`]. It is shared between the
//! allocator that grows and trims it and the fault path that reads it, so it
//! is always accessed through a [`SharedStore`], which puts the chain behind
//! one exclusive lock.

mod options;
mod quantum;

pub use options::{
    DEFAULT_QSET, DEFAULT_QUANTUM_ORDER, MAX_QUANTUM_ORDER, PAGE_SIZE, StoreOptions,
};
pub use quantum::Quantum;

use crate::prelude::*;

/// A fixed-capacity array of quantum slots.
pub struct QuantumSet {
    slots: Box<[Option<Arc<Quantum>>]>,
}

impl QuantumSet {
    fn new(qset: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(qset)?;
        slots.resize_with(qset, || None);
        Ok(Self {
            slots: slots.into_boxed_slice(),
        })
    }

    /// Returns the quantum in slot `idx`, or `None` if the slot is a hole.
    pub fn get(&self, idx: usize) -> Option<&Arc<Quantum>> {
        self.slots.get(idx)?.as_ref()
    }

    fn iter(&self) -> impl Iterator<Item = (usize, &Arc<Quantum>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|quantum| (idx, quantum)))
    }
}

/// The chain of quantum sets backing a device buffer.
///
/// The geometry (`quantum_size` and `qset`) is fixed on creation. The logical
/// length `total_size`, counted in quanta, never exceeds the capacity of the
/// chain (`nr_segments() * qset()`).
pub struct SegmentedStore {
    quantum_size: usize,
    qset: usize,
    segments: Vec<QuantumSet>,
    total_size: usize,
}

impl Debug for SegmentedStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SegmentedStore")
            .field("quantum_size", &self.quantum_size)
            .field("qset", &self.qset)
            .field("nr_segments", &self.segments.len())
            .field("total_size", &self.total_size)
            .finish()
    }
}

impl SegmentedStore {
    pub(crate) fn new(quantum_size: usize, qset: usize) -> Self {
        debug_assert!(quantum_size > 0 && qset > 0);
        Self {
            quantum_size,
            qset,
            segments: Vec::new(),
            total_size: 0,
        }
    }

    /// Returns the size of a quantum in bytes.
    pub fn quantum_size(&self) -> usize {
        self.quantum_size
    }

    /// Returns the number of slots in each quantum set.
    pub fn qset(&self) -> usize {
        self.qset
    }

    /// Returns the logical length of the store in quanta.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Returns the number of quantum sets in the chain.
    pub fn nr_segments(&self) -> usize {
        self.segments.len()
    }

    /// Locates the quantum at the logical block `index`.
    ///
    /// The chain is walked from its first set, `qset` blocks per hop. Returns
    /// `None` if the slot is a hole or if the chain ends before `index` is
    /// reached. Whether `index` is below `total_size` is for the caller to
    /// check.
    pub fn locate(&self, index: usize) -> Option<&Arc<Quantum>> {
        let mut index = index;
        let mut segments = self.segments.iter();
        let mut segment = segments.next()?;
        while index >= self.qset {
            segment = segments.next()?;
            index -= self.qset;
        }
        segment.get(index)
    }

    /// Iterates over the present quanta with their logical indices, in
    /// logical order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<Quantum>)> {
        let qset = self.qset;
        self.segments
            .iter()
            .enumerate()
            .flat_map(move |(nr, segment)| {
                segment
                    .iter()
                    .map(move |(idx, quantum)| (nr * qset + idx, quantum))
            })
    }

    fn grow_segments(&mut self, nr_segments: usize) -> Result<()> {
        let Some(extra) = nr_segments.checked_sub(self.segments.len()) else {
            return Ok(());
        };
        self.segments.try_reserve(extra)?;
        for _ in 0..extra {
            self.segments.push(QuantumSet::new(self.qset)?);
        }
        Ok(())
    }

    /// Fills the slot of logical block `index` with a zeroed quantum if it is
    /// a hole, extending the chain and `total_size` to cover `index`.
    fn commit(&mut self, index: usize) -> Result<&Arc<Quantum>> {
        let Some(end) = index.checked_add(1) else {
            return_errno_with_message!(Errno::EINVAL, "the quantum index overflows");
        };
        let (nr, idx) = (index / self.qset, index % self.qset);
        self.grow_segments(end.div_ceil(self.qset))?;

        let quantum = match self.segments[nr].slots[idx].take() {
            Some(quantum) => quantum,
            None => Quantum::alloc_zeroed(self.quantum_size)?,
        };
        self.total_size = self.total_size.max(end);
        Ok(&*self.segments[nr].slots[idx].insert(quantum))
    }

    /// Turns the slot of logical block `index` into a hole.
    fn decommit(&mut self, index: usize) -> Result<Option<Arc<Quantum>>> {
        let (nr, idx) = (index / self.qset, index % self.qset);
        let Some(slot) = self
            .segments
            .get_mut(nr)
            .and_then(|segment| segment.slots.get_mut(idx))
        else {
            return Ok(None);
        };
        if slot.as_ref().is_some_and(|quantum| quantum.is_pinned()) {
            return_errno_with_message!(Errno::EBUSY, "the quantum is still mapped");
        }
        Ok(slot.take())
    }

    /// Sets `total_size` to `nr_quanta`, dropping every quantum at or beyond
    /// the new end.
    fn truncate(&mut self, nr_quanta: usize) -> Result<()> {
        if self.iter().any(|(idx, quantum)| idx >= nr_quanta && quantum.is_pinned()) {
            return_errno_with_message!(Errno::EBUSY, "a truncated quantum is still mapped");
        }

        let qset = self.qset;
        let nr_segments = nr_quanta.div_ceil(qset);
        self.grow_segments(nr_segments)?;
        self.segments.truncate(nr_segments);
        if let Some(last) = self.segments.last_mut() {
            let keep = nr_quanta - (nr_segments - 1) * qset;
            last.slots[keep..].iter_mut().for_each(|slot| *slot = None);
        }
        self.total_size = nr_quanta;
        Ok(())
    }
}

#[cfg(test)]
impl SegmentedStore {
    pub(crate) fn segments_mut(&mut self) -> &mut Vec<QuantumSet> {
        &mut self.segments
    }
}

/// A [`SegmentedStore`] behind its exclusive lock.
///
/// Besides the lock, a `SharedStore` keeps the store-level mapping count:
/// the number of mappings that currently reference the store across all
/// [`MappingRegion`]s. The allocator-facing methods refuse to release any data
/// while that count is non-zero.
///
/// [`MappingRegion`]: crate::MappingRegion
pub struct SharedStore {
    store: Mutex<SegmentedStore>,
    quantum_size: usize,
    nr_mappings: AtomicUsize,
}

impl Debug for SharedStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedStore")
            .field("quantum_size", &self.quantum_size)
            .field("nr_mappings", &self.nr_mappings())
            .finish_non_exhaustive()
    }
}

impl SharedStore {
    pub(crate) fn new(store: SegmentedStore) -> Self {
        Self {
            quantum_size: store.quantum_size(),
            store: Mutex::new(store),
            nr_mappings: AtomicUsize::new(0),
        }
    }

    /// Locks the store.
    ///
    /// The guard must be held across any walk of the chain and any
    /// reference-count change derived from it.
    pub fn lock(&self) -> MutexGuard<'_, SegmentedStore> {
        self.store.lock()
    }

    /// Tries to lock the store without spinning.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, SegmentedStore>> {
        self.store.try_lock()
    }

    /// Returns the size of a quantum in bytes.
    pub fn quantum_size(&self) -> usize {
        self.quantum_size
    }

    /// Returns the logical length of the store in quanta.
    pub fn total_size(&self) -> usize {
        self.store.lock().total_size()
    }

    /// Returns the number of mappings that currently reference the store.
    pub fn nr_mappings(&self) -> usize {
        self.nr_mappings.load(Ordering::Acquire)
    }

    /// Returns whether the store is mapped anywhere.
    pub fn is_mapped(&self) -> bool {
        self.nr_mappings() > 0
    }

    pub(crate) fn inc_mappings(&self) {
        // Serialized against `trim` and `resize`, which test the count under
        // the store lock.
        let _guard = self.store.lock();
        self.nr_mappings.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one mapping and returns the remaining count.
    pub(crate) fn dec_mappings(&self) -> usize {
        let res = self
            .nr_mappings
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        match res {
            Ok(1) => {
                debug!("no mapping of the store remains");
                0
            }
            Ok(old) => old - 1,
            Err(_) => {
                warn!("unmapping a store that is not mapped");
                0
            }
        }
    }
}

impl SharedStore {
    /// Writes `buf` at byte `offset`, committing every quantum the range
    /// touches.
    ///
    /// `total_size` grows to cover the last quantum written. Returns the
    /// number of bytes written.
    pub fn write(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        if offset.checked_add(buf.len()).is_none() {
            return_errno_with_message!(Errno::EINVAL, "the write range overflows");
        }

        let mut store = self.store.lock();
        let quantum_size = store.quantum_size();
        let mut written = 0;
        while written < buf.len() {
            let pos = offset + written;
            let in_quantum = pos % quantum_size;
            let len = (quantum_size - in_quantum).min(buf.len() - written);
            let quantum = store.commit(pos / quantum_size)?;
            quantum.write_bytes(in_quantum, &buf[written..written + len])?;
            written += len;
        }
        Ok(written)
    }

    /// Fills logical block `index` with a zeroed quantum unless it is
    /// already present.
    pub fn commit(&self, index: usize) -> Result<()> {
        self.store.lock().commit(index).map(|_| ())
    }

    /// Punches a hole at logical block `index`.
    ///
    /// Fails with `EBUSY` if the quantum there is pinned by a page reference.
    pub fn decommit(&self, index: usize) -> Result<()> {
        let removed = self.store.lock().decommit(index)?;
        if removed.is_some() {
            trace!("decommit quantum {}", index);
        }
        Ok(())
    }

    /// Resizes the store to `nr_quanta` quanta.
    ///
    /// Growing only extends the chain with holes. Shrinking releases quanta
    /// and is refused with `EBUSY` while the store is mapped.
    pub fn resize(&self, nr_quanta: usize) -> Result<()> {
        let mut store = self.store.lock();
        if nr_quanta < store.total_size() && self.is_mapped() {
            return_errno_with_message!(Errno::EBUSY, "cannot shrink a mapped store");
        }
        store.truncate(nr_quanta)
    }

    /// Releases all quanta and quantum sets.
    ///
    /// Refused with `EBUSY` while the store is mapped.
    pub fn trim(&self) -> Result<()> {
        let mut store = self.store.lock();
        if self.is_mapped() {
            return_errno_with_message!(Errno::EBUSY, "cannot trim a mapped store");
        }
        store.truncate(0)?;
        debug!("trim store: {:?}", *store);
        Ok(())
    }
}
