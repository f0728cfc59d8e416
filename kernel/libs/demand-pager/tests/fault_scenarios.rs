// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use demand_pager::{
    Errno, FaultDispatcher, FaultResult, MapContext, PAGE_SIZE, SharedStore, StoreOptions,
};

/// Two quantum sets of four, six quanta long, holes at 2 and 4.
fn two_segment_store() -> Arc<SharedStore> {
    let store = StoreOptions::new().qset(4).alloc().unwrap();
    for index in [0, 1, 3, 5] {
        store.commit(index).unwrap();
    }
    assert_eq!(store.total_size(), 6);
    assert_eq!(store.lock().nr_segments(), 2);
    store
}

fn map_counts(store: &SharedStore) -> Vec<(usize, usize)> {
    store
        .lock()
        .iter()
        .map(|(index, quantum)| (index, quantum.map_count()))
        .collect()
}

#[test]
fn two_segments_with_holes() {
    let store = two_segment_store();
    let ctx = MapContext::new();
    let region = ctx.open(&store);

    let first = FaultDispatcher::handle_fault(&region, 0).unwrap();
    assert!(first.is_resolved());
    assert!(FaultDispatcher::handle_fault(&region, 2 * PAGE_SIZE).unwrap().is_hole());
    let last = FaultDispatcher::handle_fault(&region, 5 * PAGE_SIZE).unwrap();
    assert!(last.is_resolved());
    assert!(
        FaultDispatcher::handle_fault(&region, 6 * PAGE_SIZE)
            .unwrap()
            .is_out_of_range()
    );

    assert_eq!(map_counts(&store), [(0, 1), (1, 0), (3, 0), (5, 1)]);

    first.into_page().unwrap().release();
    last.into_page().unwrap().release();
    assert_eq!(map_counts(&store), [(0, 0), (1, 0), (3, 0), (5, 0)]);
}

#[test]
fn every_index_of_the_scenario() {
    let store = two_segment_store();
    let ctx = MapContext::new();
    let region = ctx.open(&store);

    for index in 0..8 {
        let before = map_counts(&store);
        let res = FaultDispatcher::handle_fault(&region, index * PAGE_SIZE).unwrap();
        let after = map_counts(&store);
        match res {
            FaultResult::Resolved(page) => {
                assert!([0, 1, 3, 5].contains(&index));
                assert_eq!(page.index(), index);
                for ((idx, old), (_, new)) in before.iter().zip(after.iter()) {
                    let delta = if *idx == index { 1 } else { 0 };
                    assert_eq!(*new, old + delta);
                }
                page.release();
            }
            FaultResult::Hole => {
                assert!([2, 4].contains(&index));
                assert_eq!(before, after);
            }
            FaultResult::OutOfRange => {
                assert!(index >= 6);
                assert_eq!(before, after);
            }
        }
    }
}

#[test]
fn empty_store_is_out_of_range() {
    let store = StoreOptions::new().alloc().unwrap();
    let ctx = MapContext::new();
    let region = ctx.open(&store);

    for offset in [0, PAGE_SIZE, 1000 * PAGE_SIZE] {
        let res = FaultDispatcher::handle_fault(&region, offset).unwrap();
        assert!(res.is_out_of_range());
    }
}

#[test]
fn repeated_faults_take_repeated_references() {
    let store = two_segment_store();
    let ctx = MapContext::new();
    let region = ctx.open(&store);

    let pages: Vec<_> = (0..5)
        .map(|_| {
            FaultDispatcher::handle_fault(&region, 3 * PAGE_SIZE)
                .unwrap()
                .into_page()
                .unwrap()
        })
        .collect();
    let quantum = store.lock().locate(3).cloned().unwrap();
    assert_eq!(quantum.map_count(), 5);

    for page in pages {
        page.release();
    }
    assert_eq!(quantum.map_count(), 0);
}

#[test]
fn holes_raise_access_violations() {
    let store = two_segment_store();
    let ctx = MapContext::new();
    let region = ctx.open(&store);

    for offset in [4 * PAGE_SIZE, 7 * PAGE_SIZE] {
        let err = FaultDispatcher::handle_fault(&region, offset)
            .unwrap()
            .into_page()
            .unwrap_err();
        assert_eq!(err.error(), Errno::EFAULT);
    }
}

#[test]
fn larger_quanta() {
    // 16 KiB quanta: every page of a quantum resolves to the same quantum.
    let store = StoreOptions::new().quantum_order(2).qset(2).alloc().unwrap();
    store.write(4 * PAGE_SIZE, &[0xaa; 8]).unwrap();
    let ctx = MapContext::new();
    let region = ctx.open(&store);

    assert!(FaultDispatcher::handle_fault(&region, 0).unwrap().is_hole());
    for page_offset in 0..4 {
        let page = FaultDispatcher::handle_fault(&region, (4 + page_offset) * PAGE_SIZE)
            .unwrap()
            .into_page()
            .unwrap();
        assert_eq!(page.index(), 1);
        page.release();
    }
    assert!(
        FaultDispatcher::handle_fault(&region, 8 * PAGE_SIZE)
            .unwrap()
            .is_out_of_range()
    );
}

#[test]
fn growth_while_mapped() {
    let store = two_segment_store();
    let ctx = MapContext::new();
    let region = ctx.open(&store);

    assert!(FaultDispatcher::handle_fault(&region, 9 * PAGE_SIZE).unwrap().is_out_of_range());
    store.commit(9).unwrap();
    let page = FaultDispatcher::handle_fault(&region, 9 * PAGE_SIZE)
        .unwrap()
        .into_page()
        .unwrap();
    assert_eq!(page.index(), 9);

    // A pinned quantum cannot be punched out.
    assert_eq!(store.decommit(9).unwrap_err().error(), Errno::EBUSY);
    page.release();
    store.decommit(9).unwrap();
    assert!(FaultDispatcher::handle_fault(&region, 9 * PAGE_SIZE).unwrap().is_hole());
}

#[test]
fn trim_after_last_unmap() {
    let store = two_segment_store();
    let ctx = MapContext::new();
    let region = ctx.open(&store);
    let again = ctx.open(&store);

    assert_eq!(store.trim().unwrap_err().error(), Errno::EBUSY);
    assert!(!ctx.close(&again));
    assert_eq!(store.trim().unwrap_err().error(), Errno::EBUSY);
    assert!(ctx.close(&region));

    store.trim().unwrap();
    assert_eq!(store.total_size(), 0);
}
