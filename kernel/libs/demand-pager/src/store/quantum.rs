// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

/// One block of a [`SegmentedStore`], `quantum_size` bytes long.
///
/// A quantum is owned by the slot of the [`QuantumSet`] that holds it. Page
/// handles handed out by the fault path only keep a weak reference; what they
/// do pin is the quantum's _map count_, an explicit reference count that is
/// raised once per resolved fault and lowered once per unmap.
///
/// [`SegmentedStore`]: super::SegmentedStore
/// [`QuantumSet`]: super::QuantumSet
pub struct Quantum {
    bytes: RwLock<Box<[u8]>>,
    map_count: AtomicUsize,
}

impl Debug for Quantum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Quantum")
            .field("size", &self.size())
            .field("map_count", &self.map_count())
            .finish_non_exhaustive()
    }
}

impl Quantum {
    /// Allocates a zero-filled quantum of `size` bytes.
    pub(super) fn alloc_zeroed(size: usize) -> Result<Arc<Self>> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size)?;
        bytes.resize(size, 0u8);
        Ok(Arc::new(Self {
            bytes: RwLock::new(bytes.into_boxed_slice()),
            map_count: AtomicUsize::new(0),
        }))
    }

    /// Returns the size of the quantum in bytes.
    pub fn size(&self) -> usize {
        self.bytes.read().len()
    }

    /// Returns the number of outstanding page references to this quantum.
    pub fn map_count(&self) -> usize {
        self.map_count.load(Ordering::Acquire)
    }

    /// Returns whether any page reference to this quantum is outstanding.
    pub fn is_pinned(&self) -> bool {
        self.map_count() > 0
    }

    /// Takes one page reference.
    pub(crate) fn get(&self) {
        self.map_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drops one page reference and returns the remaining count.
    ///
    /// Dropping a reference that was never taken is a bug of the caller;
    /// the count saturates at zero.
    pub fn put(&self) -> usize {
        let res = self
            .map_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        match res {
            Ok(old) => old - 1,
            Err(_) => {
                warn!("put on a quantum that has no page reference");
                0
            }
        }
    }

    /// Reads `buf.len()` bytes starting at `offset` within the quantum.
    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.read();
        let end = match offset.checked_add(buf.len()) {
            Some(end) if end <= bytes.len() => end,
            _ => return_errno_with_message!(Errno::EINVAL, "the read range exceeds the quantum"),
        };
        buf.copy_from_slice(&bytes[offset..end]);
        Ok(())
    }

    /// Writes `buf` starting at `offset` within the quantum.
    pub fn write_bytes(&self, offset: usize, buf: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.write();
        let end = match offset.checked_add(buf.len()) {
            Some(end) if end <= bytes.len() => end,
            _ => return_errno_with_message!(Errno::EINVAL, "the write range exceeds the quantum"),
        };
        bytes[offset..end].copy_from_slice(buf);
        Ok(())
    }
}
