//! Pointer index construction and chain discovery over a synthetic image

mod common;

use common::{buffer_with_words, init_tracing, make_region, TestMemory};
use pretty_assertions::assert_eq;
use ramscan::{Address, PointerLocator, RegionKind, StaticLayout};
use std::sync::Arc;

// Module image: text + writable data, then two heap blocks
const TEXT_BASE: usize = 0x400000;
const DATA_BASE: usize = 0x450000;
const DATA_SIZE: usize = 0x10000;
const HEAP_BASE: usize = 0x1000000;
const HEAP_SIZE: usize = 0x100000;

const G: usize = DATA_BASE + 0x40; // static global holding addr(H1)
const H1: usize = HEAP_BASE + 0x100;
const H2: usize = HEAP_BASE + 0x5000;

fn build_locator() -> PointerLocator {
    let mut mem = TestMemory::new(8);
    mem.add_segment(
        DATA_BASE,
        buffer_with_words(DATA_SIZE, &[(G - DATA_BASE, H1 as u64)], 8),
    );
    mem.add_segment(
        HEAP_BASE,
        buffer_with_words(HEAP_SIZE, &[(H1 + 0x10 - HEAP_BASE, H2 as u64)], 8),
    );

    let layout = StaticLayout::new(vec![
        make_region(TEXT_BASE, TEXT_BASE + 0x50000, RegionKind::Text, "/usr/bin/game"),
        make_region(DATA_BASE, DATA_BASE + DATA_SIZE, RegionKind::DataRW, "/usr/bin/game"),
        make_region(HEAP_BASE, HEAP_BASE + HEAP_SIZE, RegionKind::Heap, "[heap]"),
    ]);

    PointerLocator::new(Arc::new(mem), Arc::new(layout))
}

#[test]
fn test_locate_pointers_splits_static_and_dynamic() {
    init_tracing();
    let locator = build_locator();
    let index = locator.locate_pointers(None).unwrap();

    // G -> H1 found in static data; H1+0x10 -> H2 found in the heap
    assert_eq!(index.static_len(), 1);
    assert_eq!(index.dynamic_len(), 1);
}

#[test]
fn test_find_chain_root_to_target() {
    init_tracing();
    let locator = build_locator();
    let index = locator.locate_pointers(None).unwrap();

    let target = Address::new(H2 + 0x8);
    let chains = locator.find_chains(&index, target, 3, 0x20).unwrap();
    assert_eq!(chains.len(), 1);

    let chain = &chains[0];
    assert_eq!(chain.root_address, Address::new(G));
    assert_eq!(chain.offsets_root_to_target(), vec![0x0, 0x10, 0x8]);

    // Root resolves into the module image (text span start)
    let (file, offset) = chain.root_file.clone().unwrap();
    assert_eq!(file, "game");
    assert_eq!(offset, (G - TEXT_BASE) as i64);
}

#[test]
fn test_direct_static_chain() {
    init_tracing();
    let locator = build_locator();
    let index = locator.locate_pointers(None).unwrap();

    // H1+0x5 is reachable in one hop from the static global
    let chains = locator
        .find_chains(&index, Address::new(H1 + 0x5), 1, 0x20)
        .unwrap();
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].root_address, Address::new(G));
    assert_eq!(chains[0].offsets_root_to_target(), vec![0x0, 0x5]);
}

#[test]
fn test_depth_limit_prunes_recursion() {
    init_tracing();
    let locator = build_locator();
    let index = locator.locate_pointers(None).unwrap();

    // Reaching the target needs two levels; depth 1 only consults the
    // static index
    let target = Address::new(H2 + 0x8);
    let chains = locator.find_chains(&index, target, 1, 0x20).unwrap();
    assert!(chains.is_empty());
}

#[test]
fn test_max_offset_bounds_hops() {
    init_tracing();
    let locator = build_locator();
    let index = locator.locate_pointers(None).unwrap();

    // The widest hop needs offset 0x10; a tighter bound misses the chain
    let target = Address::new(H2 + 0x8);
    let chains = locator.find_chains(&index, target, 3, 0x4).unwrap();
    assert!(chains.is_empty());

    // An exact bound still finds it
    let chains = locator.find_chains(&index, target, 3, 0x10).unwrap();
    assert_eq!(chains.len(), 1);
}

#[test]
fn test_pointers_to_static_regions_are_not_indexed() {
    init_tracing();
    // A heap word pointing back at static data is not a useful hop
    let mut mem = TestMemory::new(8);
    mem.add_segment(
        DATA_BASE,
        buffer_with_words(DATA_SIZE, &[(0x40, H1 as u64)], 8),
    );
    mem.add_segment(
        HEAP_BASE,
        buffer_with_words(HEAP_SIZE, &[(0x200, G as u64)], 8),
    );
    let layout = StaticLayout::new(vec![
        make_region(DATA_BASE, DATA_BASE + DATA_SIZE, RegionKind::DataRW, "/usr/bin/game"),
        make_region(HEAP_BASE, HEAP_BASE + HEAP_SIZE, RegionKind::Heap, "[heap]"),
    ]);
    let locator = PointerLocator::new(Arc::new(mem), Arc::new(layout));

    let index = locator.locate_pointers(None).unwrap();
    assert_eq!(index.static_len(), 1); // G -> H1 only
    assert_eq!(index.dynamic_len(), 0);
}

#[test]
fn test_address_range_restricts_walk() {
    init_tracing();
    let locator = build_locator();

    // Walk only the data region: the heap-side entry disappears
    let index = locator
        .locate_pointers(Some((
            Address::new(DATA_BASE),
            Address::new(DATA_BASE + DATA_SIZE),
        )))
        .unwrap();
    assert_eq!(index.static_len(), 1);
    assert_eq!(index.dynamic_len(), 0);
}
