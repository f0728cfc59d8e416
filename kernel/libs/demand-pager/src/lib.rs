// SPDX-License-Identifier: MPL-2.0

//! Demand paging for sparse, quantum-based device buffers.
//!
//! A device buffer is a [`SegmentedStore`]: a chain of quantum sets, each set
//! a fixed array of slots, each slot either a [`Quantum`] of data or a hole.
//! Consumers map the buffer through a [`MappingRegion`] and do not receive any
//! page up front. Instead, the host environment calls
//! [`FaultDispatcher::handle_fault`] on the first touch of a page and installs
//! whatever it resolves.
//!
//! # Fault outcomes
//!
//! A fault at a byte offset has one of three outcomes ([`FaultResult`]):
//!
//!  * **Resolved.** A quantum backs the offset. Its map count is raised by
//!    one and a [`PageHandle`] is returned. The handle must be released once
//!    the page is unmapped.
//!  * **Hole.** The offset lies within the store but no quantum backs it.
//!  * **Out of range.** The offset lies at or beyond the end of the store.
//!
//! Holes and out-of-range offsets both end up as an access violation for the
//! consumer ([`FaultResult::into_page`]), but they are kept apart so that a
//! hole could one day be filled on fault while the end of the store could not.
//!
//! # Concurrency
//!
//! Every store sits behind one exclusive lock ([`SharedStore`]). A fault holds
//! that lock from the range check until the map count is raised, and so does
//! every allocator operation that changes the chain. Mapping bookkeeping is
//! done with atomic counters.
//!
//! # Examples
//!
//! ```
//! use demand_pager::{FaultDispatcher, MapContext, PAGE_SIZE, StoreOptions};
//!
//! let store = StoreOptions::new().qset(4).alloc().unwrap();
//! store.write(0, b"hello").unwrap();
//! store.resize(2).unwrap();
//!
//! let ctx = MapContext::new();
//! let region = ctx.open(&store);
//!
//! let page = FaultDispatcher::handle_fault(&region, 0)
//!     .unwrap()
//!     .into_page()
//!     .unwrap();
//! let mut buf = [0u8; 5];
//! page.read_bytes(0, &mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! page.release();
//!
//! assert!(FaultDispatcher::handle_fault(&region, PAGE_SIZE).unwrap().is_hole());
//! assert!(ctx.close(&region));
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

mod error;
mod fault;
mod mapping;
mod prelude;
mod resolver;
mod store;

pub use self::{
    error::{Errno, Error, Result},
    fault::{FaultDispatcher, FaultResult, PageHandle},
    mapping::{MapContext, MappingRegion},
    resolver::PageResolver,
    store::{
        DEFAULT_QSET, DEFAULT_QUANTUM_ORDER, MAX_QUANTUM_ORDER, PAGE_SIZE, Quantum, QuantumSet,
        SegmentedStore, SharedStore, StoreOptions,
    },
};
