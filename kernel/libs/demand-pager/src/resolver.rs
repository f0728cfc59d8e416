// SPDX-License-Identifier: MPL-2.0

use crate::{
    prelude::*,
    store::{Quantum, SegmentedStore},
};

/// Translates logical block indices of a store into quanta.
///
/// A resolver has no state of its own and touches no reference count. It
/// only answers which quantum, if any, backs an index; the caller holds the
/// store lock while it asks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageResolver;

impl PageResolver {
    /// Resolves the logical block `index` of `store`.
    ///
    /// Holes and indices past the end of the chain both resolve to `None`.
    pub fn resolve(store: &SegmentedStore, index: usize) -> Option<&Arc<Quantum>> {
        store.locate(index)
    }
}

#[cfg(test)]
mod test {
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::*;
    use crate::store::StoreOptions;

    #[test]
    fn random_holes() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        for qset in [1, 3, 8] {
            let shared = StoreOptions::new().qset(qset).alloc().unwrap();
            let total = 4 * qset + 1;
            let present: Vec<bool> = (0..total).map(|_| rng.random_bool(0.5)).collect();
            for (index, _) in present.iter().enumerate().filter(|(_, p)| **p) {
                shared.commit(index).unwrap();
            }
            shared.resize(total).unwrap();

            let store = shared.lock();
            for (index, &is_present) in present.iter().enumerate() {
                assert_eq!(PageResolver::resolve(&store, index).is_some(), is_present);
            }
            assert!(PageResolver::resolve(&store, total + qset).is_none());
        }
    }

    #[test]
    fn resolve_does_not_pin() {
        let shared = StoreOptions::new().qset(2).alloc().unwrap();
        shared.commit(1).unwrap();
        let store = shared.lock();
        for _ in 0..3 {
            let quantum = PageResolver::resolve(&store, 1).unwrap();
            assert_eq!(quantum.map_count(), 0);
        }
    }
}
