//! Cycle-level model of a near-memory Memory Access Accelerator (MAA):
//! a co-processor that executes stride-load and related instructions
//! directly against DRAM, staging results into a scratchpad the host CPU
//! reads through a cache-coherent MMIO window.
//!
//! [`Maa`] is the top-level facade: construct one from a [`MaaConfig`],
//! drive it through the physical-address-mapped MMIO contract (the same
//! `write, window` / `read, window` table a real host driver would use),
//! and call [`Maa::run_until_idle`] to let queued work settle between
//! transactions. Everything below the facade — address decode, scratchpad,
//! register file, instruction file, request table, stream units, and the
//! DRAM mapper — lives in its own module and is independently tested.

mod address;
mod controller;
mod dram;
mod instruction;
mod instruction_file;
mod ports;
mod regfile;
mod request_table;
mod scheduler;
mod spd;
mod stream;
mod tile;

pub use address::{AddressLayout, Window};
pub use controller::{CacheIntent, CpuResult, DispatchOutcome};
pub use dram::{DramAddress, DramMapper};
pub use instruction::{encode_words, DataType, Opcode, UnitClass};
pub use instruction_file::Seq;
pub use ports::BlockReason;
pub use regfile::RegisterFile;
pub use spd::Spd;
pub use tile::{Lifecycle, WordSize};

use emu_core::{Observable, Ticks, Value};

use controller::Controller;

/// Upper bound on [`Maa::run_until_idle`] passes, guarding against a
/// configuration error (e.g. a DRAM mapper that never frees a channel)
/// turning into a silent infinite loop.
const MAX_SETTLE_PASSES: u32 = 10_000;

/// Plain configuration for constructing a [`Maa`] instance: no builder,
/// no file format, just the shape of the machine.
#[derive(Debug, Clone)]
pub struct MaaConfig {
    /// Physical address the MAA's MMIO window range starts at.
    pub mmio_base: u64,
    /// Number of 32-bit scratchpad tiles. 64-bit tiles occupy two adjacent
    /// entries and must be an even count apart.
    pub n_tiles: usize,
    /// Elements per tile.
    pub elements_per_tile: usize,
    /// Scalar register count (fixed at 32 by the register file, but kept
    /// here so the address layout's scalar-reg window span is derived from
    /// one place).
    pub n_regs: usize,
    /// In-flight instruction-file slot count.
    pub if_capacity: usize,
    /// Request-table line count (`A`).
    pub request_table_lines: usize,
    /// Request-table entries per line (`E`).
    pub request_table_entries_per_line: usize,
    /// Number of in-scope stream-access units.
    pub n_stream_units: usize,
    /// Instruction slots the instruction-reg MMIO window exposes.
    pub n_instr_slots: usize,
    /// Scratchpad read ports; read latency is accesses-per-port, rounded up.
    pub read_ports: u32,
    /// Scratchpad write ports; write latency is accesses-per-port, rounded up.
    pub write_ports: u32,
    /// DRAM address mapper. Defaults to [`DramMapper::default`] if the
    /// caller has no reason to deviate from it.
    pub dram: DramMapper,
}

impl Default for MaaConfig {
    fn default() -> Self {
        Self {
            mmio_base: 0x8000_0000,
            n_tiles: 8,
            elements_per_tile: 64,
            n_regs: 32,
            if_capacity: 8,
            request_table_lines: 8,
            request_table_entries_per_line: 16,
            n_stream_units: 2,
            n_instr_slots: 4,
            read_ports: 2,
            write_ports: 2,
            dram: DramMapper::default(),
        }
    }
}

/// Flat physical memory standing in for the DRAM/cache side of the
/// machine. The MAA's own DRAM mapper only decomposes addresses for
/// fairness bookkeeping; actual byte storage backing a stream-load's
/// cache-line reads is this array, grown on demand.
struct PhysicalMemory {
    bytes: Vec<u8>,
}

impl PhysicalMemory {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn ensure_len(&mut self, len: usize) {
        if self.bytes.len() < len {
            self.bytes.resize(len, 0);
        }
    }

    fn write_u32(&mut self, addr: u64, value: u32) {
        let addr = addr as usize;
        self.ensure_len(addr + 4);
        self.bytes[addr..addr + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn read_line(&mut self, line_addr: u64) -> [u8; stream::CACHE_LINE_BYTES as usize] {
        let addr = line_addr as usize;
        self.ensure_len(addr + stream::CACHE_LINE_BYTES as usize);
        let mut line = [0u8; stream::CACHE_LINE_BYTES as usize];
        line.copy_from_slice(&self.bytes[addr..addr + stream::CACHE_LINE_BYTES as usize]);
        line
    }
}

/// Top-level MAA facade: wires the address decoder, scratchpad, register
/// file, and controller together behind the MMIO recv-path contract, and
/// owns the flat physical memory stream-loads read from.
pub struct Maa {
    layout: AddressLayout,
    controller: Controller,
    memory: PhysicalMemory,
    /// Coherent read-shared requests issued to the cache side so far,
    /// counted at the facade (statistics collection proper is out of
    /// scope; this mirrors how `request_table_full_count` is already
    /// plumbed through as a bare counter for the same reason).
    cache_reads_issued: u64,
    /// Clean-evicts issued after consuming a response, one per read.
    clean_evicts_issued: u64,
}

impl Maa {
    #[must_use]
    pub fn new(config: &MaaConfig) -> Self {
        let layout = AddressLayout {
            base: config.mmio_base,
            n_tiles: config.n_tiles,
            elements_per_tile: config.elements_per_tile,
            n_regs: config.n_regs,
            n_instr_slots: config.n_instr_slots,
        };
        let spd = Spd::new(config.n_tiles, config.elements_per_tile, config.read_ports, config.write_ports);
        let rf = RegisterFile::new();
        let controller = Controller::new(
            layout,
            spd,
            rf,
            config.if_capacity,
            config.request_table_lines,
            config.request_table_entries_per_line,
            config.dram,
            config.n_stream_units,
        );
        Self {
            layout,
            controller,
            memory: PhysicalMemory::new(),
            cache_reads_issued: 0,
            clean_evicts_issued: 0,
        }
    }

    /// Total coherent read-shared requests issued to the cache side across
    /// this instance's lifetime.
    #[must_use]
    pub fn cache_reads_issued(&self) -> u64 {
        self.cache_reads_issued
    }

    /// Total clean-evicts issued after consuming a cache-line response.
    #[must_use]
    pub fn clean_evicts_issued(&self) -> u64 {
        self.clean_evicts_issued
    }

    #[must_use]
    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    #[must_use]
    pub fn spd(&self) -> &Spd {
        self.controller.spd()
    }

    #[must_use]
    pub fn register_file(&self) -> &RegisterFile {
        self.controller.register_file()
    }

    #[must_use]
    pub fn request_table_full_count(&self) -> u64 {
        self.controller.request_table_full_count()
    }

    /// Seed physical memory at `addr` (used by test harnesses standing in
    /// for a pre-populated DRAM image; real hosts never call this).
    pub fn poke_physical_u32(&mut self, addr: u64, value: u32) {
        self.memory.write_u32(addr, value);
    }

    fn expect_window(&self, addr: u64, want: Window) -> u64 {
        match self.layout.decode(addr) {
            Some((window, off)) if window == want => off,
            Some((window, _)) => panic!("address {addr:#x} decoded to {window:?}, expected {want:?}"),
            None => panic!("address {addr:#x} is outside the MAA's MMIO range"),
        }
    }

    /// `write, spd-data-noncacheable`.
    pub fn write_spd_noncacheable(&mut self, addr: u64, value: u32) -> CpuResult {
        self.controller.write_spd_noncacheable(addr, value)
    }

    /// `read-shared / read-exclusive, spd-data-cacheable`. `Exclusive`
    /// marks the tile Dirty (the CPU may modify the line in its own cache
    /// afterwards); `Shared` is a plain read.
    pub fn read_spd_cacheable(&mut self, addr: u64, intent: CacheIntent) -> (u32, Ticks) {
        let off = self.expect_window(addr, Window::SpdDataCacheable);
        let (tile, element) = self.layout.spd_tile_element(off);
        self.controller.read_spd_cacheable(tile, element, intent)
    }

    /// Test-harness entry point standing in for the out-of-scope
    /// invalidator completing a write-back against `tile` with no
    /// dispatched Invalidate instruction behind it; real host drivers
    /// never call this.
    pub fn simulate_invalidation_complete(&mut self, tile: usize) {
        self.controller.simulate_invalidation_complete(tile);
    }

    /// `snoop-response (dirty data), spd-data-cacheable`.
    pub fn accept_dirty_snoop_response(&mut self, addr: u64, value: u32) {
        let off = self.expect_window(addr, Window::SpdDataCacheable);
        let (tile, element) = self.layout.spd_tile_element(off);
        self.controller.accept_dirty_snoop_response(tile, element, value);
    }

    /// `read, spd-size`.
    pub fn read_spd_size(&mut self, addr: u64) -> u16 {
        let off = self.expect_window(addr, Window::SpdSize);
        self.controller.read_spd_size(self.layout.spd_size_tile(off))
    }

    /// `read, spd-ready`: see [`CpuResult::Deferred`] — the caller should
    /// [`Maa::run_until_idle`] and re-check the tile directly if deferred.
    pub fn read_spd_ready(&mut self, addr: u64) -> CpuResult {
        let off = self.expect_window(addr, Window::SpdReady);
        let tile = self.layout.spd_ready_tile(off);
        self.controller.read_spd_ready(tile, 0)
    }

    /// `write, scalar-reg`.
    pub fn write_scalar_reg(&mut self, addr: u64, value: u32) -> CpuResult {
        self.controller.write_scalar_reg(addr, value)
    }

    /// `read, scalar-reg`.
    pub fn read_scalar_reg(&self, addr: u64) -> u32 {
        let off = self.expect_window(addr, Window::ScalarReg);
        self.controller.read_scalar_reg(self.layout.reg_index(off) as u8)
    }

    /// `write, instruction-reg[0..2]`: word 2 commits the instruction and
    /// returns its dispatch outcome; words 0 and 1 only stage fields and
    /// return `None`.
    pub fn write_instruction_reg(&mut self, addr: u64, word: u64) -> Option<DispatchOutcome> {
        let off = self.expect_window(addr, Window::InstructionReg);
        let (slot, word_idx) = self.layout.instruction_slot_word(off);
        match word_idx {
            0 => {
                self.controller.write_instruction_word0(slot, word);
                None
            }
            1 => {
                self.controller.write_instruction_word1(slot, word);
                None
            }
            2 => Some(self.controller.submit_instruction(slot, word)),
            other => panic!("instruction-reg word index {other} out of range"),
        }
    }

    /// Drive issue, stream request/response handling, and completion
    /// callbacks to a fixed point: every stream unit idle, every admitted
    /// instruction retired, nothing left scheduled.
    ///
    /// # Panics
    /// Panics if the machine fails to settle within an internal pass
    /// bound — almost certainly a configuration bug (e.g. a DRAM mapper
    /// that never frees a channel, starving fairness).
    pub fn run_until_idle(&mut self) {
        for _ in 0..MAX_SETTLE_PASSES {
            if self.controller.is_quiescent() {
                return;
            }
            self.controller.issue();
            if let Some(next) = self.controller.next_due() {
                self.controller.drain_due(next);
            }
            let requests = self.controller.drive_stream_requests();
            for (_unit_id, line_vaddr) in requests {
                self.cache_reads_issued += 1;
                let line = self.memory.read_line(line_vaddr);
                self.controller.route_read_response(line_vaddr, |word_id| {
                    let off = usize::from(word_id) * 4;
                    u32::from_le_bytes(line[off..off + 4].try_into().expect("4-byte slice"))
                });
                self.clean_evicts_issued += 1;
            }
            self.controller.complete_finished_streams();
        }
        panic!("Maa::run_until_idle did not settle within {MAX_SETTLE_PASSES} passes");
    }
}

impl Observable for Maa {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("spd.") {
            self.spd().query(rest)
        } else if let Some(rest) = path.strip_prefix("rf.") {
            let reg: u8 = rest.parse().ok()?;
            Some(Value::U32(self.register_file().read32(reg)))
        } else {
            match path {
                "rt_full_count" => Some(Value::U64(self.request_table_full_count())),
                "last_idle_tick" => Some(Value::U64(self.controller.last_idle_tick().get())),
                _ => None,
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["spd.<tile>.lifecycle", "spd.<tile>.dirty", "spd.<tile>.size", "rf.<reg>", "rt_full_count", "last_idle_tick"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn noncacheable_write_then_cacheable_read_roundtrips() {
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
    }

    #[test]
    fn scalar_reg_write_then_read() {
        let mut maa = Maa::new(&small_config());
        let reg_addr = maa.layout().window_base(Window::ScalarReg);
        maa.write_scalar_reg(reg_addr, 0xCAFE);
        assert_eq!(maa.read_scalar_reg(reg_addr), 0xCAFE);
    }

    #[test]
    fn stream_load_end_to_end_fills_destination_tile() {
        let mut maa = Maa::new(&small_config());
        for (i, v) in (10u32..18).enumerate() {
            maa.poke_physical_u32(0x1000 + i as u64 * 4, v);
        }
        let reg_base = maa.layout().window_base(Window::ScalarReg);
        maa.write_scalar_reg(reg_base, 0); // reg0 = min
        maa.write_scalar_reg(reg_base + 8, 8); // reg1 = max

        let (w0, w1, base_vaddr) = instruction::encode_words(
            Opcode::StreamLoad,
            DataType::U32,
            None,
            Some(0),
            None,
            None,
            None,
            None,
            None,
            Some(0),
            Some(1),
            None,
            None,
            0x1000,
        );
        let instr_base = maa.layout().window_base(Window::InstructionReg);
        assert!(maa.write_instruction_reg(instr_base, w0).is_none());
        assert!(maa.write_instruction_reg(instr_base + 8, w1).is_none());
        let outcome = maa.write_instruction_reg(instr_base + 16, base_vaddr);
        assert_eq!(outcome, Some(DispatchOutcome::Accepted(Seq(0))));

        maa.run_until_idle();

        assert_eq!(maa.spd().size(0), 8);
        for i in 0..8 {
            assert_eq!(maa.spd().read32(0, i), 10 + i as u32);
            assert!(maa.spd().is_ready(0, i));
        }
    }
}
