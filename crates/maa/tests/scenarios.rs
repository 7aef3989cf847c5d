//! End-to-end scenarios driven entirely through the public `Maa` facade,
//! one test per literal row of the MAA's testable-properties table:
//! round-trip writes, a plain stream-load, a conditioned stream-load, a
//! strided stream-load, dirty-tile dispatch blocking, and request-table
//! back-pressure recovery.

use maa::{encode_words, CacheIntent, DataType, DispatchOutcome, Maa, MaaConfig, Opcode, Window};

fn small_config() -> MaaConfig {
    MaaConfig {
        n_tiles: 4,
        elements_per_tile: 16,
        if_capacity: 4,
        request_table_lines: 8,
        request_table_entries_per_line: 16,
        n_stream_units: 2,
        n_instr_slots: 2,
        ..MaaConfig::default()
    }
}

/// Submits a stream-load instruction through the three-word instruction-reg
/// protocol and returns its dispatch outcome. `min`/`max`/`stride` are
/// staged into scalar registers 0/1/2 first, matching how `launch_stream`
/// reads them back (`src1_reg`/`src2_reg`/`src3_reg`).
fn submit_stream_load(
    maa: &mut Maa,
    dst: u8,
    cond: Option<u8>,
    base_vaddr: u64,
    min: u32,
    max: u32,
    stride: u32,
) -> DispatchOutcome {
    let reg_base = maa.layout().window_base(Window::ScalarReg);
    maa.write_scalar_reg(reg_base, min);
    maa.write_scalar_reg(reg_base + 8, max);
    maa.write_scalar_reg(reg_base + 16, stride);

    let (w0, w1, w2) = encode_words(
        Opcode::StreamLoad,
        DataType::U32,
        None,
        Some(dst),
        None,
        None,
        None,
        None,
        None,
        Some(0),
        Some(1),
        Some(2),
        cond,
        base_vaddr,
    );
    let instr_base = maa.layout().window_base(Window::InstructionReg);
    assert!(maa.write_instruction_reg(instr_base, w0).is_none());
    assert!(maa.write_instruction_reg(instr_base + 8, w1).is_none());
    maa.write_instruction_reg(instr_base + 16, w2)
        .expect("word2 always returns a dispatch outcome")
}

/// Scenario 1: writing through the noncacheable window and reading back
/// through the cacheable window round-trips the value; the write alone
/// must not touch size or readiness — those are only updated by a
/// completed instruction.
#[test]
fn scenario_1_noncacheable_write_cacheable_read_roundtrips_without_touching_size_or_ready() {
    let mut maa = Maa::new(&small_config());
    let noncacheable = maa.layout().window_base(Window::SpdDataNoncacheable);
    let cacheable = maa.layout().window_base(Window::SpdDataCacheable);

    for (i, v) in (1..=8u32).enumerate() {
        maa.write_spd_noncacheable(noncacheable + i as u64 * 4, v);
    }

    for i in 0..8u64 {
        let (value, _latency) = maa.read_spd_cacheable(cacheable + i * 4, CacheIntent::Shared);
        assert_eq!(value, i as u32 + 1);
    }

    assert_eq!(maa.spd().size(0), 0, "a bare write never sets size");
    for i in 0..8 {
        assert!(!maa.spd().is_ready(0, i), "a bare write never sets ready");
    }
}

/// Scenario 2: an unconditional stream-load over 8 contiguous u32 words
/// (one 64-byte cache line) fills the destination tile, sets its size, and
/// marks every loaded element ready, issuing exactly one cache-line read
/// and one clean-evict.
#[test]
fn scenario_2_unconditional_stream_load_fills_tile_with_one_line_read() {
    let mut maa = Maa::new(&small_config());
    for (i, v) in (10u32..26).enumerate() {
        maa.poke_physical_u32(0x1000 + i as u64 * 4, v);
    }

    let reads_before = maa.cache_reads_issued();
    let evicts_before = maa.clean_evicts_issued();

    let outcome = submit_stream_load(&mut maa, 0, None, 0x1000, 0, 8, 1);
    assert!(matches!(outcome, DispatchOutcome::Accepted(_)));
    maa.run_until_idle();

    assert_eq!(maa.spd().size(0), 8);
    for i in 0..8 {
        assert_eq!(maa.spd().read32(0, i), 10 + i as u32);
        assert!(maa.spd().is_ready(0, i));
    }
    assert_eq!(maa.cache_reads_issued() - reads_before, 1);
    assert_eq!(maa.clean_evicts_issued() - evicts_before, 1);
}

/// Scenario 3: a conditioned stream-load writes zero (without touching
/// memory) wherever the already-Finished condition tile holds zero, and
/// still resolves to a single cache-line read since all 8 words share one
/// line.
#[test]
fn scenario_3_conditioned_stream_load_zeroes_false_elements() {
    let mut maa = Maa::new(&small_config());
    for (i, v) in (10u32..26).enumerate() {
        maa.poke_physical_u32(0x1000 + i as u64 * 4, v);
    }
    // Condition source: alternating 1/0, eight words, one cache line.
    for (i, v) in [1u32, 0, 1, 0, 1, 0, 1, 0].into_iter().enumerate() {
        maa.poke_physical_u32(0x2000 + i as u64 * 4, v);
    }

    // Load the condition tile to completion first so it is genuinely
    // Finished (and its Ready bits set) before the conditioned load reads
    // it, matching the scenario's "already Finished" setup.
    let cond_outcome = submit_stream_load(&mut maa, 1, None, 0x2000, 0, 8, 1);
    assert!(matches!(cond_outcome, DispatchOutcome::Accepted(_)));
    maa.run_until_idle();
    assert_eq!(maa.spd().size(1), 8);

    let reads_before = maa.cache_reads_issued();
    let evicts_before = maa.clean_evicts_issued();

    let outcome = submit_stream_load(&mut maa, 0, Some(1), 0x1000, 0, 8, 1);
    assert!(matches!(outcome, DispatchOutcome::Accepted(_)));
    maa.run_until_idle();

    assert_eq!(maa.spd().size(0), 8);
    let expected = [10u32, 0, 12, 0, 14, 0, 16, 0];
    for (i, exp) in expected.into_iter().enumerate() {
        assert_eq!(maa.spd().read32(0, i), exp);
    }
    assert_eq!(maa.cache_reads_issued() - reads_before, 1);
    assert_eq!(maa.clean_evicts_issued() - evicts_before, 1);
}

/// Scenario 4: a strided stream-load (stride 2) reads every other word;
/// all eight resulting accesses still land in one cache line, so a single
/// read and evict suffice.
#[test]
fn scenario_4_strided_stream_load_reads_every_other_word() {
    let mut maa = Maa::new(&small_config());
    for (i, v) in (0u32..32).enumerate() {
        maa.poke_physical_u32(0x1000 + i as u64 * 4, v);
    }

    let reads_before = maa.cache_reads_issued();
    let outcome = submit_stream_load(&mut maa, 0, None, 0x1000, 0, 16, 2);
    assert!(matches!(outcome, DispatchOutcome::Accepted(_)));
    maa.run_until_idle();

    assert_eq!(maa.spd().size(0), 8);
    for i in 0..8u32 {
        assert_eq!(maa.spd().read32(0, i as usize), i * 2);
    }
    assert_eq!(maa.cache_reads_issued() - reads_before, 1);
}

/// Scenario 5: dispatching an instruction whose destination tile is still
/// Dirty (the CPU wrote it through the cacheable window with write
/// intent) is deferred; once the invalidator's write-back completes and
/// the tile goes Clean, resubmitting the same instruction is admitted.
#[test]
fn scenario_5_dirty_destination_defers_dispatch_until_invalidation_completes() {
    let mut maa = Maa::new(&small_config());
    let cacheable = maa.layout().window_base(Window::SpdDataCacheable);
    // CPU takes the line with write intent: the tile goes Dirty.
    maa.read_spd_cacheable(cacheable, CacheIntent::Exclusive);

    for (i, v) in (10u32..18).enumerate() {
        maa.poke_physical_u32(0x1000 + i as u64 * 4, v);
    }

    let blocked = submit_stream_load(&mut maa, 0, None, 0x1000, 0, 8, 1);
    assert_eq!(blocked, DispatchOutcome::Deferred);

    maa.simulate_invalidation_complete(0);

    let accepted = submit_stream_load(&mut maa, 0, None, 0x1000, 0, 8, 1);
    assert!(matches!(accepted, DispatchOutcome::Accepted(_)));

    maa.run_until_idle();
    assert_eq!(maa.spd().size(0), 8);
    assert_eq!(maa.spd().read32(0, 0), 10);
}

/// Scenario 6: a stream spanning more distinct cache lines than the
/// request table has lines for must stall (incrementing the request-table-
/// full counter) and then resume once responses free up table space,
/// eventually draining every line and producing the correct final tile
/// contents.
#[test]
fn scenario_6_request_table_back_pressure_then_recovers() {
    let mut maa = Maa::new(&MaaConfig {
        n_tiles: 2,
        elements_per_tile: 16,
        if_capacity: 2,
        request_table_lines: 4,
        request_table_entries_per_line: 4,
        n_stream_units: 1,
        n_instr_slots: 1,
        ..MaaConfig::default()
    });

    // stride 8192 words * 4 bytes = 32768 bytes: under the default DRAM
    // mapper (column+bank+bankgroup+rank = 15 bits) that's exactly one
    // channel-field step, so each of the ten iterations lands on a
    // distinct cache line in a distinct DRAM channel. With the per-channel
    // single-outstanding rule allowing one flush per channel per pass, more
    // than `request_table_lines` (4) of these can be outstanding in the
    // table at once, which is what actually drives it to back-pressure.
    for i in 0..10u64 {
        maa.poke_physical_u32(i * 32_768, 100 + i as u32);
    }

    let outcome = submit_stream_load(&mut maa, 0, None, 0, 0, 81_920, 8192);
    assert!(matches!(outcome, DispatchOutcome::Accepted(_)));
    maa.run_until_idle();

    assert!(
        maa.request_table_full_count() > 0,
        "a 4-line table draining 10 distinct lines must back-pressure at least once"
    );
    assert_eq!(maa.spd().size(0), 10);
    for i in 0..10u32 {
        assert_eq!(maa.spd().read32(0, i as usize), 100 + i);
    }
    assert_eq!(maa.cache_reads_issued(), 10);
}
