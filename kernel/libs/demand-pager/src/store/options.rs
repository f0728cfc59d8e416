// SPDX-License-Identifier: MPL-2.0

//! Options for allocating stores.

use super::{SegmentedStore, SharedStore};
use crate::prelude::*;

/// The size of a page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// The default order of a quantum, i.e., one page per quantum.
pub const DEFAULT_QUANTUM_ORDER: u32 = 0;

/// The largest supported quantum order (4 MiB quanta).
pub const MAX_QUANTUM_ORDER: u32 = 10;

/// The default number of quanta in a quantum set.
pub const DEFAULT_QSET: usize = 500;

/// Options for allocating a [`SharedStore`].
///
/// # Examples
///
/// Creating a store with the default geometry:
/// ```
/// use demand_pager::StoreOptions;
///
/// let store = StoreOptions::new().alloc().unwrap();
/// assert_eq!(store.quantum_size(), demand_pager::PAGE_SIZE);
/// ```
///
/// Creating a store of 16 KiB quanta grouped four to a set:
/// ```
/// use demand_pager::{PAGE_SIZE, StoreOptions};
///
/// let store = StoreOptions::new()
///     .quantum_order(2)
///     .qset(4)
///     .alloc()
///     .unwrap();
/// assert_eq!(store.quantum_size(), 4 * PAGE_SIZE);
/// ```
#[derive(Debug, Clone)]
pub struct StoreOptions {
    quantum_order: u32,
    qset: usize,
}

impl StoreOptions {
    /// Creates a default set of options.
    pub fn new() -> Self {
        Self {
            quantum_order: DEFAULT_QUANTUM_ORDER,
            qset: DEFAULT_QSET,
        }
    }

    /// Sets the quantum order. A quantum is `PAGE_SIZE << order` bytes.
    ///
    /// The default value is [`DEFAULT_QUANTUM_ORDER`].
    pub fn quantum_order(mut self, order: u32) -> Self {
        self.quantum_order = order;
        self
    }

    /// Sets the number of quanta in each quantum set.
    ///
    /// The default value is [`DEFAULT_QSET`].
    pub fn qset(mut self, qset: usize) -> Self {
        self.qset = qset;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreOptions {
    /// Allocates an empty store according to the specified options.
    pub fn alloc(self) -> Result<Arc<SharedStore>> {
        let StoreOptions {
            quantum_order,
            qset,
        } = self;
        if quantum_order > MAX_QUANTUM_ORDER {
            return_errno_with_message!(Errno::EINVAL, "the quantum order is too large");
        }
        if qset == 0 {
            return_errno_with_message!(Errno::EINVAL, "a quantum set must hold at least one quantum");
        }

        let store = SegmentedStore::new(PAGE_SIZE << quantum_order, qset);
        Ok(Arc::new(SharedStore::new(store)))
    }
}
