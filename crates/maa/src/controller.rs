//! MAA Controller (C7): address decode routing, instruction staging and
//! dispatch, issue, per-unit completion, and response routing. This is
//! the machine-level router wiring the address decoder, scratchpad,
//! register file, instruction file, request table, stream units, and
//! DRAM mapper together behind one recv/dispatch/issue/completion
//! contract, with the per-cycle issue decision expressed as a plain data
//! walk over idle units rather than a callback hierarchy.

use std::collections::{HashMap, HashSet};

use emu_core::Ticks;

use crate::address::{AddressLayout, Window};
use crate::dram::DramMapper;
use crate::instruction::{DependencyStatus, Instruction, UnitClass};
use crate::instruction_file::{InstructionFile, OperandStatuses, Seq};
use crate::ports::{BlockReason, Port, CANONICAL_ORDER};
use crate::regfile::RegisterFile;
use crate::request_table::RequestTable;
use crate::scheduler::Scheduler;
use crate::spd::Spd;
use crate::stream::{StreamOperands, StreamUnit, DEFAULT_PAGE_BYTES};
use crate::tile::{Lifecycle, WordSize};

/// Outcome of attempting to classify and act on a CPU-side transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuResult {
    /// The transaction completed or was accepted; respond after `Ticks`.
    Respond(Ticks),
    /// A read against `spd-ready` for a tile that has not finished yet;
    /// no response is scheduled until the tile transitions to Finished.
    Deferred,
    /// Address fell outside every MMIO window.
    OutOfRange,
}

/// A pending read that is deferred until the named tile finishes.
struct PendingReadyQuery {
    tile: usize,
}

/// Coherence intent a CPU-side cacheable access carries: `Shared` for a
/// plain read, `Exclusive` when the CPU intends to modify the line in its
/// own cache afterwards. An `Exclusive` grant marks the tile's cache
/// shadow Dirty immediately — the CPU may now silently modify the line
/// without SPD knowing, until the invalidator writes it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheIntent {
    Shared,
    Exclusive,
}

/// Staging area for a three-word instruction write in progress. A real
/// host writes instruction-reg[0], then [1], then [2] in order; word2
/// triggers decode and dispatch.
#[derive(Default, Clone, Copy)]
struct InstrStaging {
    word0: Option<u64>,
    word1: Option<u64>,
}

/// Outcome of [`Controller::submit_instruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Admitted into the instruction file; destinations' Ready bits were
    /// cleared and, for indirect-store/RMW, `src2` was un-readied.
    Accepted(Seq),
    /// The instruction file was full or a destination is still Dirty;
    /// the transaction is left outstanding for the caller to retry.
    Deferred,
}

/// One external (out-of-scope) functional unit slot: the controller only
/// exposes the contract (issue / finish-compute) to invalidator, indirect,
/// ALU, and range-fuser units — their internal execution is not modeled
/// here.
struct ExternalUnit {
    class: UnitClass,
    busy_with: Option<Seq>,
}

/// Wires C1 (address decode) through C8 (DRAM mapper) together behind the
/// controller's recv/dispatch/issue/completion contract.
pub struct Controller {
    layout: AddressLayout,
    spd: Spd,
    rf: RegisterFile,
    instruction_file: InstructionFile,
    request_table: RequestTable,
    dram: DramMapper,
    streams: Vec<StreamUnit>,
    externals: Vec<ExternalUnit>,
    cache_port: Port,
    instr_staging: Vec<InstrStaging>,
    pending_ready_queries: Vec<(usize, PendingReadyQuery)>,
    scheduler: Scheduler<Seq>,
    num_issued: u64,
    last_idle_tick: Ticks,
    rt_full_count: u64,
    /// Which stream unit requested each outstanding cache line, so a
    /// response can be routed to exactly one unit. Populated by
    /// [`Controller::drive_stream_requests`], consumed by
    /// [`Controller::route_read_response`].
    line_owner: HashMap<u64, u32>,
    /// Stream units launched this pass but still waiting out their issue
    /// stagger; excluded from [`Controller::drive_stream_requests`] until
    /// [`Controller::drain_due`] observes their scheduled tick.
    pending_launch: HashSet<u32>,
}

impl Controller {
    #[must_use]
    pub fn new(
        layout: AddressLayout,
        spd: Spd,
        rf: RegisterFile,
        if_capacity: usize,
        request_table_lines: usize,
        request_table_entries_per_line: usize,
        dram: DramMapper,
        n_stream_units: usize,
    ) -> Self {
        let n_instr_slots = layout.n_instr_slots;
        let mut externals = Vec::new();
        for class in [
            UnitClass::Invalidator,
            UnitClass::Indirect,
            UnitClass::Alu,
            UnitClass::RangeFuser,
        ] {
            externals.push(ExternalUnit { class, busy_with: None });
        }
        Self {
            layout,
            spd,
            rf,
            instruction_file: InstructionFile::new(if_capacity),
            request_table: RequestTable::new(request_table_lines, request_table_entries_per_line),
            dram,
            streams: (0..n_stream_units).map(|i| StreamUnit::new(i as u32)).collect(),
            externals,
            cache_port: Port::new(),
            instr_staging: vec![InstrStaging::default(); n_instr_slots],
            pending_ready_queries: Vec::new(),
            scheduler: Scheduler::new(),
            num_issued: 0,
            last_idle_tick: Ticks::ZERO,
            rt_full_count: 0,
            line_owner: HashMap::new(),
            pending_launch: HashSet::new(),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &AddressLayout {
        &self.layout
    }

    #[must_use]
    pub fn request_table_full_count(&self) -> u64 {
        self.rt_full_count
    }

    // ---- C1 classification + CPU-side recv paths ----

    /// `write, spd-data-noncacheable`.
    pub fn write_spd_noncacheable(&mut self, addr: u64, data: u32) -> CpuResult {
        match self.layout.decode(addr) {
            Some((Window::SpdDataNoncacheable, off)) => {
                let (tile, elem) = self.layout.spd_tile_element(off);
                self.spd.write32(tile, elem, data);
                CpuResult::Respond(self.spd.write_latency(1))
            }
            Some(_) => panic!("write_spd_noncacheable called with a non-matching window"),
            None => CpuResult::OutOfRange,
        }
    }

    /// `write, scalar-reg`.
    pub fn write_scalar_reg(&mut self, addr: u64, data: u32) -> CpuResult {
        match self.layout.decode(addr) {
            Some((Window::ScalarReg, off)) => {
                let reg = self.layout.reg_index(off);
                self.rf.write32(reg as u8, data);
                CpuResult::Respond(Ticks::new(1))
            }
            Some(_) => panic!("write_scalar_reg called with a non-matching window"),
            None => CpuResult::OutOfRange,
        }
    }

    /// `read, scalar-reg`.
    #[must_use]
    pub fn read_scalar_reg(&self, reg: u8) -> u32 {
        self.rf.read32(reg)
    }

    /// `read, spd-size`.
    #[must_use]
    pub fn read_spd_size(&self, tile: usize) -> u16 {
        self.spd.size(tile)
    }

    /// `read, spd-ready`: responds immediately if Finished, otherwise the
    /// query is recorded and resolves the moment the tile transitions —
    /// [`Controller::finish_compute`] drains it, but there is no separate
    /// poll method; the caller's response is considered "sent" implicitly.
    pub fn read_spd_ready(&mut self, tile: usize, context: usize) -> CpuResult {
        if self.spd.is_finished(tile) {
            CpuResult::Respond(Ticks::new(1))
        } else {
            self.pending_ready_queries.push((context, PendingReadyQuery { tile }));
            CpuResult::Deferred
        }
    }

    /// `read-shared`/`read-exclusive, spd-data-cacheable`. An `Exclusive`
    /// intent routes write-intent to the invalidator shadow by marking the
    /// tile Dirty (the CPU may now hold and modify this line in its own
    /// cache); `Shared` is a plain read with no shadow side effect.
    pub fn read_spd_cacheable(&mut self, tile: usize, element: usize, intent: CacheIntent) -> (u32, Ticks) {
        if intent == CacheIntent::Exclusive {
            self.spd.mark_dirty(tile, WordSize::W32);
        }
        (self.spd.read32(tile, element), self.spd.read_latency(1))
    }

    /// `snoop-response (dirty data), spd-data-cacheable`: the invalidator
    /// (out of scope) populates the tile with the dirty line and clears
    /// Dirty.
    pub fn accept_dirty_snoop_response(&mut self, tile: usize, element: usize, value: u32) {
        self.spd.write32(tile, element, value);
    }

    /// `write, instruction-reg[0]`: opcode/data-type/op-subtype/dst1/dst2.
    pub fn write_instruction_word0(&mut self, slot: usize, word0: u64) {
        self.instr_staging[slot].word0 = Some(word0);
    }

    /// `write, instruction-reg[1]`: src1/src2, dst/src registers, cond tile.
    pub fn write_instruction_word1(&mut self, slot: usize, word1: u64) {
        self.instr_staging[slot].word1 = Some(word1);
    }

    /// `write, instruction-reg[2]`: base-vaddr; triggers dispatch attempt.
    ///
    /// # Panics
    /// Panics if word0/word1 for this slot were not written first — a
    /// host protocol violation.
    pub fn submit_instruction(&mut self, slot: usize, base_vaddr: u64) -> DispatchOutcome {
        let staging = self.instr_staging[slot];
        let word0 = staging.word0.expect("instruction-reg[0] not written before [2]");
        let word1 = staging.word1.expect("instruction-reg[1] not written before [2]");
        self.instr_staging[slot] = InstrStaging::default();
        let instruction = Instruction::from_words(word0, word1, base_vaddr);
        self.dispatch(instruction)
    }

    /// Compute dependency status for a source operand tile: `WaitForInvalidation` if Dirty, else the tile's
    /// lifecycle mapped onto {Service, Finished, WaitForService}.
    fn source_status(&self, tile: Option<u8>) -> Option<DependencyStatus> {
        let tile = usize::from(tile?);
        if self.spd.dirty(tile) {
            return Some(DependencyStatus::WaitForInvalidation);
        }
        Some(match self.spd.lifecycle(tile) {
            Lifecycle::Service => DependencyStatus::Service,
            Lifecycle::Finished => DependencyStatus::Finished,
            Lifecycle::Idle => DependencyStatus::WaitForService,
        })
    }

    /// Destination operands are always `WaitForService` unless the tile is
    /// still Dirty, in which case `WaitForInvalidation`
    fn destination_status(&self, tile: Option<u8>) -> Option<DependencyStatus> {
        let tile = usize::from(tile?);
        if self.spd.dirty(tile) {
            Some(DependencyStatus::WaitForInvalidation)
        } else {
            Some(DependencyStatus::WaitForService)
        }
    }

    fn dispatch(&mut self, instruction: Instruction) -> DispatchOutcome {
        let statuses = OperandStatuses {
            src1: self.source_status(instruction.src1),
            src2: self.source_status(instruction.src2),
            cond: self.source_status(instruction.cond),
            dst1: self.destination_status(instruction.dst1),
            dst2: self.destination_status(instruction.dst2),
        };

        let consumes_src2_as_output = instruction.opcode.consumes_src2_as_output();
        let src2_tile = instruction.src2;
        let dst1 = instruction.dst1;
        let dst2 = instruction.dst2;
        let word_size = instruction.data_type.word_size();

        match self.instruction_file.push(instruction, statuses) {
            Some(seq) => {
                // Enter Service now, not at issue: admission is the point a
                // destination tile becomes this instruction's to produce,
                // and set_tile_service both records the word size finish_compute
                // must later match and clears stale ready bits in one step.
                for dst in [dst1, dst2] {
                    if let Some(t) = dst {
                        self.spd.set_tile_service(usize::from(t), word_size);
                    }
                }
                if consumes_src2_as_output {
                    if let Some(t) = src2_tile {
                        self.spd.set_tile_service(usize::from(t), word_size);
                    }
                }
                DispatchOutcome::Accepted(seq)
            }
            None => DispatchOutcome::Deferred,
        }
    }

    // ---- Issue ----

    /// Greedily pair idle units with the oldest ready instruction of their
    /// class, visiting classes in [`CANONICAL_ORDER`]. Returns the
    /// sequences issued this pass.
    pub fn issue(&mut self) -> Vec<Seq> {
        let mut issued = Vec::new();
        let mut stagger: u64 = 0;
        for class in CANONICAL_ORDER {
            match class {
                UnitClass::Stream => {
                    while let Some(unit_idx) = self.streams.iter().position(StreamUnit::is_idle) {
                        let Some(seq) = self.instruction_file.get_ready(class, |_| true) else {
                            break;
                        };
                        stagger += 1;
                        self.launch_stream(unit_idx, seq, stagger);
                        issued.push(seq);
                        self.num_issued += 1;
                    }
                }
                _ => {
                    while let Some(ext_idx) =
                        self.externals.iter().position(|u| u.class == class && u.busy_with.is_none())
                    {
                        let Some(seq) = self.instruction_file.get_ready(class, |_| true) else {
                            break;
                        };
                        self.externals[ext_idx].busy_with = Some(seq);
                        issued.push(seq);
                        self.num_issued += 1;
                    }
                }
            }
        }
        issued
    }

    /// `stagger` is this unit's 1-based position among units issued in the
    /// current [`Controller::issue`] pass, so simultaneously-issued units
    /// wake up on distinct ticks instead of colliding.
    fn launch_stream(&mut self, unit_idx: usize, seq: Seq, stagger: u64) {
        let instruction = self
            .instruction_file
            .instruction(seq)
            .expect("issued sequence must still be admitted")
            .clone();
        let min = u64::from(instruction.src1_reg.map_or(0, |r| self.rf.read32(r)));
        let max = u64::from(instruction.src2_reg.map_or(0, |r| self.rf.read32(r)));
        let stride = u64::from(instruction.src3_reg.map_or(1, |r| self.rf.read32(r)));
        let operands = StreamOperands {
            base_vaddr: instruction.base_vaddr,
            dst_tile: usize::from(instruction.dst1.expect("stream-load requires dst1")),
            cond_tile: instruction.cond.map(usize::from),
            min,
            max,
            stride,
            word_size: instruction.data_type,
        };
        self.streams[unit_idx].launch(
            seq.0,
            operands,
            self.layout.elements_per_tile as u64,
            DEFAULT_PAGE_BYTES,
            &self.dram,
        );
        self.pending_launch.insert(self.streams[unit_idx].id());
        self.scheduler.schedule_after(Ticks::new(stagger), seq);
    }

    /// Advance the scheduler to `up_to`, releasing any stream units whose
    /// issue stagger has now elapsed. The caller (normally a fixed-point
    /// loop in the facade) should call this before
    /// [`Controller::drive_stream_requests`] each pass.
    pub fn drain_due(&mut self, up_to: Ticks) -> Vec<Seq> {
        let due = self.scheduler.drain_due(up_to);
        for seq in &due {
            if let Some(unit) = self.streams.iter().find(|u| u.owner() == Some(seq.0)) {
                self.pending_launch.remove(&unit.id());
            }
        }
        due
    }

    /// Next scheduled stagger release, if any stream unit is still waiting
    /// one out.
    #[must_use]
    pub fn next_due(&self) -> Option<Ticks> {
        self.scheduler.next_due()
    }

    /// Drive every stream unit's request loop once, returning the cache
    /// reads that must be sent.
    pub fn drive_stream_requests(&mut self) -> Vec<(u32, u64)> {
        let mut out = Vec::new();
        for unit in &mut self.streams {
            if unit.is_idle() || self.pending_launch.contains(&unit.id()) {
                continue;
            }
            let outcome = unit.drive_requests(&mut self.spd, &self.dram, &mut self.request_table);
            if outcome.table_full {
                self.rt_full_count += 1;
                self.cache_port.park(UnitClass::Stream, unit.id(), BlockReason::MaxXbarPackets);
            } else {
                self.cache_port.unpark(UnitClass::Stream, unit.id());
            }
            for req in outcome.requests {
                self.line_owner.insert(req.line_vaddr, unit.id());
                out.push((unit.id(), req.line_vaddr));
            }
        }
        out
    }

    /// Route a cache-line read-response to whichever stream unit is
    /// waiting on it, keyed by the owner recorded when the request was
    /// sent. Exactly one unit may claim a response; violating this is a
    /// protocol error.
    ///
    /// # Panics
    /// Panics if no unit recorded as the owner of `line_vaddr` is found.
    pub fn route_read_response(
        &mut self,
        line_vaddr: u64,
        word_value: impl Fn(u8) -> u32 + Copy,
    ) -> u64 {
        let owner_id = self
            .line_owner
            .remove(&line_vaddr)
            .unwrap_or_else(|| panic!("read-response for {line_vaddr:#x} matched no unit"));
        let unit_idx = self
            .streams
            .iter()
            .position(|u| u.id() == owner_id)
            .expect("recorded line owner must be a valid stream unit");
        let evict = self.streams[unit_idx].on_response(
            &mut self.spd,
            &mut self.request_table,
            line_vaddr,
            word_value,
        );
        evict.line_vaddr
    }

    /// Called once per stream unit per scheduler wake-up: if all its
    /// planned work is answered, finish it and free the unit.
    ///
    /// [`StreamUnit::finish`] already marks the destination tile Finished
    /// at its true logical length `L`, which may be shorter than the
    /// tile's full capacity, so completion here only retires the slot and
    /// runs the shared bookkeeping tail — it must not repeat destination
    /// marking the way [`Controller::finish_compute`] does for external
    /// units, or it would clobber `L` back to full tile width.
    pub fn complete_finished_streams(&mut self) -> Vec<Seq> {
        let mut finished = Vec::new();
        for unit in &mut self.streams {
            if unit.all_work_done() {
                let owner = unit.finish(&mut self.spd);
                unit.retire();
                finished.push(Seq(owner));
            }
        }
        for seq in &finished {
            self.retire_instruction(*seq);
        }
        finished
    }

    /// `finish-compute(inst)`: marks destination tiles Finished + Ready,
    /// frees the slot, and re-runs issue/dispatch bookkeeping (the caller
    /// is expected to call [`Controller::issue`] again afterwards). Used
    /// by units whose own completion path does not already mark the
    /// destination tile itself (everything but [`StreamUnit`], which
    /// knows its own logical length and marks its tile directly).
    pub fn finish_compute(&mut self, seq: Seq) {
        if let Some(instruction) = self.instruction_file.instruction(seq) {
            let word_size = instruction.data_type.word_size();
            let size = self.layout.elements_per_tile as u16;
            for dst in [instruction.dst1, instruction.dst2] {
                if let Some(t) = dst {
                    let t = usize::from(t);
                    self.spd.set_tile_finished(t, word_size, size);
                    for elem in 0..self.layout.elements_per_tile {
                        self.spd.set_ready(t, elem, word_size);
                    }
                }
            }
        }
        self.retire_instruction(seq);
    }

    /// Shared tail of instruction completion: free the instruction-file
    /// slot, resolve any `spd-ready` reads the completion may have
    /// satisfied, and stamp the idle tick once nothing is left in flight.
    fn retire_instruction(&mut self, seq: Seq) {
        self.instruction_file.finish_compute(seq);
        self.drain_ready_queries();
        if self.streams.iter().all(StreamUnit::is_idle)
            && self.externals.iter().all(|u| u.busy_with.is_none())
        {
            self.last_idle_tick = self.scheduler.now();
        }
    }

    /// Test-harness entry point standing in for the out-of-scope
    /// invalidator completing a write-back with no dispatched Invalidate
    /// instruction behind it: clears the tile's Dirty shadow directly. A
    /// real invalidator arrives at the same effect via
    /// [`Controller::finish_invalidate`] after being issued an Invalidate
    /// instruction; host drivers never call this.
    pub fn simulate_invalidation_complete(&mut self, tile: usize) {
        self.spd.set_tile_clean(tile, WordSize::W32);
    }

    /// `finish-invalidate(inst, tile)`: marks the tile Clean and frees the
    /// invalidator slot. The invalidator's own logic is out of scope; this
    /// is the contract the controller exposes to it.
    pub fn finish_invalidate(&mut self, seq: Seq, tile: usize) {
        self.spd.set_tile_clean(tile, crate::tile::WordSize::W32);
        for ext in &mut self.externals {
            if ext.class == UnitClass::Invalidator && ext.busy_with == Some(seq) {
                ext.busy_with = None;
            }
        }
        self.instruction_file.finish_compute(seq);
    }

    /// Complete an external (out-of-scope) functional unit's instruction:
    /// the controller contract only requires freeing its slot and running
    /// the same destination-marking as [`Controller::finish_compute`].
    pub fn external_finish_compute(&mut self, class: UnitClass, seq: Seq) {
        for ext in &mut self.externals {
            if ext.class == class && ext.busy_with == Some(seq) {
                ext.busy_with = None;
            }
        }
        self.finish_compute(seq);
    }

    fn drain_ready_queries(&mut self) {
        self.pending_ready_queries
            .retain(|(_, q)| !self.spd.is_finished(q.tile));
    }

    #[must_use]
    pub fn last_idle_tick(&self) -> Ticks {
        self.last_idle_tick
    }

    /// True once every stream and external unit is idle, the instruction
    /// file holds nothing in flight, and no stagger release remains
    /// scheduled. A facade driving loop can stop once this holds.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.streams.iter().all(StreamUnit::is_idle)
            && self.externals.iter().all(|u| u.busy_with.is_none())
            && self.instruction_file.is_empty()
            && self.scheduler.is_empty()
    }

    #[must_use]
    pub fn spd(&self) -> &Spd {
        &self.spd
    }

    pub fn spd_mut(&mut self) -> &mut Spd {
        &mut self.spd
    }

    #[must_use]
    pub fn register_file(&self) -> &RegisterFile {
        &self.rf
    }

    pub fn register_file_mut(&mut self) -> &mut RegisterFile {
        &mut self.rf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{encode_words, DataType, Opcode};

    fn test_layout() -> AddressLayout {
        AddressLayout {
            base: 0,
            n_tiles: 4,
            elements_per_tile: 8,
            n_regs: 32,
            n_instr_slots: 2,
        }
    }

    fn test_controller() -> Controller {
        Controller::new(
            test_layout(),
            Spd::new(4, 8, 1, 1),
            RegisterFile::new(),
            4,
            4,
            8,
            DramMapper::default(),
            1,
        )
    }

    fn stream_load_instruction(dst: u8, base_vaddr: u64) -> Instruction {
        let (w0, w1, _) = encode_words(
            Opcode::StreamLoad,
            DataType::U32,
            None,
            Some(dst),
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
            base_vaddr,
        );
        Instruction::from_words(w0, w1, base_vaddr)
    }

    #[test]
    fn exclusive_read_marks_tile_dirty_shared_does_not() {
        let mut c = test_controller();
        c.read_spd_cacheable(0, 0, CacheIntent::Shared);
        assert!(!c.spd.dirty(0));
        c.read_spd_cacheable(0, 0, CacheIntent::Exclusive);
        assert!(c.spd.dirty(0));
    }

    #[test]
    fn dispatch_defers_when_destination_tile_is_dirty() {
        let mut c = test_controller();
        c.read_spd_cacheable(0, 0, CacheIntent::Exclusive);
        let outcome = c.dispatch(stream_load_instruction(0, 0x1000));
        assert_eq!(outcome, DispatchOutcome::Deferred);
        assert_eq!(c.instruction_file.len(), 0);
    }

    #[test]
    fn invalidation_completion_unblocks_dispatch() {
        let mut c = test_controller();
        c.read_spd_cacheable(0, 0, CacheIntent::Exclusive);
        assert_eq!(
            c.dispatch(stream_load_instruction(0, 0x1000)),
            DispatchOutcome::Deferred
        );
        c.simulate_invalidation_complete(0);
        let outcome = c.dispatch(stream_load_instruction(0, 0x1000));
        assert!(matches!(outcome, DispatchOutcome::Accepted(_)));
    }

    #[test]
    fn dispatch_sets_destination_tile_service_immediately() {
        let mut c = test_controller();
        let outcome = c.dispatch(stream_load_instruction(1, 0x2000));
        assert!(matches!(outcome, DispatchOutcome::Accepted(_)));
        assert_eq!(c.spd.lifecycle(1), Lifecycle::Service);
    }

    #[test]
    fn issue_pairs_idle_stream_unit_with_oldest_ready_instruction() {
        let mut c = test_controller();
        let outcome = c.dispatch(stream_load_instruction(2, 0x3000));
        let DispatchOutcome::Accepted(seq) = outcome else {
            panic!("expected acceptance");
        };
        let issued = c.issue();
        assert_eq!(issued, vec![seq]);
        assert!(!c.streams[0].is_idle());
    }

    #[test]
    fn is_quiescent_true_on_a_freshly_constructed_controller() {
        let c = test_controller();
        assert!(c.is_quiescent());
    }
}
