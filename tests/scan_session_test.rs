//! Scan session behavior over a synthetic address space

mod common;

use common::{init_tracing, make_region, TestMemory};
use pretty_assertions::assert_eq;
use ramscan::{
    CompareOp, CompareSpec, KindMask, RegionKind, ResultDensity, ScanConfig, ScanError,
    ScanParams, ScanSession, StaticLayout, TypedValue, ValueKind,
};
use std::sync::Arc;

const BASE: usize = 0x100000;
const SIZE: usize = 0x20000; // 32 pages
const SENTINEL: u32 = 0xDEADBEEF;
const PLANTED: [usize; 3] = [10, 5000, 20000]; // element indices

fn build_target() -> (Arc<TestMemory>, Arc<StaticLayout>) {
    let mut data = vec![0u8; SIZE];
    for i in 0..SIZE / 4 {
        data[i * 4..i * 4 + 4].copy_from_slice(&((i % 997) as u32).to_le_bytes());
    }
    for &i in &PLANTED {
        data[i * 4..i * 4 + 4].copy_from_slice(&SENTINEL.to_le_bytes());
    }

    let mut mem = TestMemory::new(8);
    mem.add_segment(BASE, data);
    let layout = StaticLayout::new(vec![make_region(
        BASE,
        BASE + SIZE,
        RegionKind::AnonymousRW,
        "",
    )]);
    (Arc::new(mem), Arc::new(layout))
}

fn make_session(
    mem: Arc<TestMemory>,
    layout: Arc<StaticLayout>,
    threads: usize,
    dir: &std::path::Path,
) -> ScanSession {
    let config = ScanConfig {
        worker_threads: threads,
        ..ScanConfig::default()
    };
    ScanSession::new(mem, layout, config, dir).unwrap()
}

fn collect_addresses(session: &ScanSession) -> Vec<usize> {
    (0..session.result_count())
        .map(|i| session.address_at(i).unwrap().unwrap().as_usize())
        .collect()
}

fn planted_addresses() -> Vec<usize> {
    PLANTED.iter().map(|i| BASE + i * 4).collect()
}

fn equal_spec(value: u32) -> CompareSpec {
    CompareSpec::against(ValueKind::U32, CompareOp::Equal, TypedValue::U32(value))
}

#[test]
fn test_first_sparse_scan_finds_planted_values() {
    init_tracing();
    let (mem, layout) = build_target();
    let dir = tempfile::tempdir().unwrap();
    let mut session = make_session(mem, layout, 4, dir.path());

    session
        .first_scan(&ScanParams::new(ValueKind::U32), &equal_spec(SENTINEL))
        .unwrap();

    assert_eq!(session.result_density(), ResultDensity::Sparse);
    assert_eq!(session.result_byte_size(), 12);
    assert_eq!(collect_addresses(&session), planted_addresses());

    for i in 0..session.result_count() {
        assert_eq!(
            session.previous_value_at(i).unwrap(),
            Some(TypedValue::U32(SENTINEL))
        );
        assert_eq!(
            session.current_value_at(i).unwrap(),
            Some(TypedValue::U32(SENTINEL))
        );
    }
}

#[test]
fn test_unknown_then_equal_same_results_for_any_thread_count() {
    init_tracing();
    let mut sets = Vec::new();
    for threads in [1, 4] {
        let (mem, layout) = build_target();
        let dir = tempfile::tempdir().unwrap();
        let mut session = make_session(mem, layout, threads, dir.path());

        // Unknown-value first scan dumps densely
        session
            .first_scan(
                &ScanParams::new(ValueKind::U32),
                &CompareSpec::previous(ValueKind::U32, CompareOp::Equal),
            )
            .unwrap();
        assert_eq!(session.result_density(), ResultDensity::Dense);
        assert_eq!(session.result_byte_size(), SIZE as u64);
        assert_eq!(session.result_count(), (SIZE / 4) as u64);

        session.next_scan(&equal_spec(SENTINEL)).unwrap();
        assert_eq!(session.result_density(), ResultDensity::Sparse);

        let mut addresses = collect_addresses(&session);
        addresses.sort_unstable();
        assert_eq!(addresses, planted_addresses());
        sets.push(addresses);
    }
    assert_eq!(sets[0], sets[1]);
}

#[test]
fn test_previous_value_comparison_across_passes() {
    init_tracing();
    let (mem, layout) = build_target();
    let dir = tempfile::tempdir().unwrap();
    let mut session = make_session(mem.clone(), layout, 4, dir.path());

    session
        .first_scan(
            &ScanParams::new(ValueKind::U32),
            &CompareSpec::previous(ValueKind::U32, CompareOp::Equal),
        )
        .unwrap();

    // The target mutates between passes
    let changed = [BASE + 4 * 777, BASE + 4 * 13000];
    mem.poke(changed[0], &0xFEEDu32.to_le_bytes());
    mem.poke(changed[1], &0xBEEFu32.to_le_bytes());

    session
        .next_scan(&CompareSpec::previous(ValueKind::U32, CompareOp::NotEqual))
        .unwrap();
    assert_eq!(collect_addresses(&session), changed.to_vec());

    // Sparse refinement re-validates every address against live memory
    mem.poke(changed[0], &0x1234u32.to_le_bytes());
    session
        .next_scan(&CompareSpec::previous(ValueKind::U32, CompareOp::Equal))
        .unwrap();
    assert_eq!(collect_addresses(&session), vec![changed[1]]);
}

#[test]
fn test_page_locality_grouping_is_invisible() {
    init_tracing();
    // Matches clustered in one page and straddling page boundaries
    let offsets = [0x10usize, 0x20, 0x30, 0xFFC, 0x1004, 0x3000];
    let mut data = vec![0u8; 4 * 4096];
    for &o in &offsets {
        data[o..o + 4].copy_from_slice(&SENTINEL.to_le_bytes());
    }
    let mut mem = TestMemory::new(8);
    mem.add_segment(BASE, data);
    let mem = Arc::new(mem);
    let layout = Arc::new(StaticLayout::new(vec![make_region(
        BASE,
        BASE + 4 * 4096,
        RegionKind::AnonymousRW,
        "",
    )]));

    let dir = tempfile::tempdir().unwrap();
    let mut session = make_session(mem, layout, 2, dir.path());
    session
        .first_scan(&ScanParams::new(ValueKind::U32), &equal_spec(SENTINEL))
        .unwrap();

    let expected: Vec<usize> = offsets.iter().map(|o| BASE + o).collect();
    assert_eq!(collect_addresses(&session), expected);

    // The re-scan reads grouped by page; the result set must not change
    session.next_scan(&equal_spec(SENTINEL)).unwrap();
    assert_eq!(collect_addresses(&session), expected);
}

#[test]
fn test_cancellation_rolls_back_to_previous_results() {
    init_tracing();
    let (mem, layout) = build_target();
    let dir = tempfile::tempdir().unwrap();
    let mut session = make_session(mem.clone(), layout, 2, dir.path());

    session
        .first_scan(&ScanParams::new(ValueKind::U32), &equal_spec(SENTINEL))
        .unwrap();
    let count_before = session.result_count();
    let bytes_before = session.result_byte_size();

    // Cancel as soon as a worker touches memory
    let handle = session.stop_handle();
    mem.set_read_hook(move |_| handle.stop());

    let err = session.next_scan(&equal_spec(SENTINEL)).unwrap_err();
    assert!(matches!(err, ScanError::Stopped));
    assert!(err.is_recoverable());

    assert_eq!(session.result_count(), count_before);
    assert_eq!(session.result_byte_size(), bytes_before);
    assert_eq!(collect_addresses(&session), planted_addresses());

    // The session is still usable after the rollback
    mem.clear_read_hook();
    session.next_scan(&equal_spec(SENTINEL)).unwrap();
    assert_eq!(collect_addresses(&session), planted_addresses());
}

#[test]
fn test_results_above_display_threshold_stay_file_backed() {
    init_tracing();
    let (mem_a, layout_a) = build_target();
    let (mem_b, layout_b) = build_target();

    let dir_a = tempfile::tempdir().unwrap();
    let mut in_memory = make_session(mem_a, layout_a, 2, dir_a.path());
    in_memory
        .first_scan(&ScanParams::new(ValueKind::U32), &equal_spec(SENTINEL))
        .unwrap();

    let dir_b = tempfile::tempdir().unwrap();
    let config = ScanConfig {
        worker_threads: 2,
        display_threshold: 2, // below the 3 matches
        ..ScanConfig::default()
    };
    let mut file_backed = ScanSession::new(mem_b, layout_b, config, dir_b.path()).unwrap();
    file_backed
        .first_scan(&ScanParams::new(ValueKind::U32), &equal_spec(SENTINEL))
        .unwrap();

    // Same observable results either way
    assert_eq!(
        collect_addresses(&in_memory),
        collect_addresses(&file_backed)
    );
    assert_eq!(
        in_memory.previous_value_at(1).unwrap(),
        file_backed.previous_value_at(1).unwrap()
    );
}

#[test]
fn test_scan_over_no_regions_is_empty() {
    init_tracing();
    let (mem, layout) = build_target();
    let dir = tempfile::tempdir().unwrap();
    let mut session = make_session(mem, layout, 2, dir.path());

    let params = ScanParams {
        kinds: KindMask::only(RegionKind::Heap), // layout has none
        ..ScanParams::new(ValueKind::U32)
    };
    session.first_scan(&params, &equal_spec(SENTINEL)).unwrap();
    assert_eq!(session.result_count(), 0);
    assert_eq!(session.address_at(0).unwrap(), None);

    session.next_scan(&equal_spec(SENTINEL)).unwrap();
    assert_eq!(session.result_count(), 0);
}

#[test]
fn test_parameter_validation() {
    init_tracing();
    let (mem, layout) = build_target();
    let dir = tempfile::tempdir().unwrap();
    let mut session = make_session(mem, layout, 2, dir.path());

    // Refining before any scan
    assert!(matches!(
        session.next_scan(&equal_spec(1)).unwrap_err(),
        ScanError::Input(_)
    ));

    // Spec kind must match the scan kind
    let mismatched = CompareSpec::against(ValueKind::U8, CompareOp::Equal, TypedValue::U8(1));
    assert!(matches!(
        session
            .first_scan(&ScanParams::new(ValueKind::U32), &mismatched)
            .unwrap_err(),
        ScanError::Config(_)
    ));

    // Element width is pinned for the session once scanned
    session
        .first_scan(&ScanParams::new(ValueKind::U32), &equal_spec(SENTINEL))
        .unwrap();
    assert!(matches!(
        session.next_scan(&mismatched).unwrap_err(),
        ScanError::Config(_)
    ));
}

#[test]
fn test_clear_resets_session() {
    init_tracing();
    let (mem, layout) = build_target();
    let dir = tempfile::tempdir().unwrap();
    let mut session = make_session(mem, layout, 2, dir.path());

    session
        .first_scan(&ScanParams::new(ValueKind::U32), &equal_spec(SENTINEL))
        .unwrap();
    assert!(session.result_count() > 0);

    session.clear();
    assert_eq!(session.result_density(), ResultDensity::Empty);
    assert_eq!(session.result_count(), 0);
    assert_eq!(session.address_at(0).unwrap(), None);
}
