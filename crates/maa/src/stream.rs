//! Stream Access Unit (C6): executes one stride-load instruction end to
//! end — decode, page pre-plan, line-request loop with DRAM-group and
//! per-channel fairness, and response handling.
//!
//! The unit is a small phase state machine (`Idle`, `Decode`, `Request`,
//! `Response`) driving one stream instruction to completion a page at a
//! time, with slot-style arbitration over the page pre-plan: each pass
//! walks the currently active pages and skips any whose DRAM group
//! already has outstanding work this round.

use std::collections::{HashSet, VecDeque};

use emu_core::Ticks;

use crate::dram::DramMapper;
use crate::instruction::DataType;
use crate::request_table::{AddResult, RequestTable};
use crate::spd::Spd as Scratchpad;
pub use crate::tile::WordSize;

/// Fixed cache-line size.
pub const CACHE_LINE_BYTES: u64 = 64;
/// Default page size used for the page pre-plan.
pub const DEFAULT_PAGE_BYTES: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Decode,
    Request,
    Response,
}

/// Decoded stride-load operands.
#[derive(Debug, Clone, Copy)]
pub struct StreamOperands {
    pub base_vaddr: u64,
    pub dst_tile: usize,
    pub cond_tile: Option<usize>,
    pub min: u64,
    pub max: u64,
    pub stride: u64,
    pub word_size: DataType,
}

/// One planned page window: an anchor iteration, its DRAM group, and the
/// bound the inner request loop must stop at.
#[derive(Debug, Clone, Copy)]
struct PagePlan {
    /// Next iteration counter to process; advances by `stride` as the
    /// request loop makes progress, so a deferred page resumes exactly
    /// where it left off.
    cursor: u64,
    max_iter: u64,
    group: (u32, u32, u32),
    last_line: Option<u64>,
}

fn plan_pages(
    min: u64,
    max: u64,
    stride: u64,
    word_bytes: u64,
    base_vaddr: u64,
    page_bytes: u64,
    tile_capacity: u64,
    dram: &DramMapper,
) -> VecDeque<PagePlan> {
    let stride = stride.max(1);
    let words_per_page = (page_bytes / word_bytes).max(1);
    let mut pages = VecDeque::new();
    let mut window_start = min;
    while window_start <= max {
        let window_end = window_start.saturating_add(words_per_page);
        let rem = (window_start - min) % stride;
        let first = if rem == 0 { window_start } else { window_start + (stride - rem) };
        let idx = (first - min) / stride;
        if first < window_end && first <= max && idx < tile_capacity {
            let vaddr = base_vaddr + word_bytes * first;
            let group = dram.map(vaddr).group();
            let mut last = first;
            while last + stride < window_end && last + stride <= max {
                last += stride;
            }
            pages.push_back(PagePlan {
                cursor: first,
                max_iter: last,
                group,
                last_line: None,
            });
        }
        window_start = window_end;
    }
    if let Some(last) = pages.back_mut() {
        last.max_iter = max;
    }
    pages
}

/// A physical line that must be sent as a coherent read-shared request on
/// the cache-side port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub line_vaddr: u64,
}

/// A clean-evict to emit after a response has been fully consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanEvict {
    pub line_vaddr: u64,
}

/// Result of one call to [`StreamUnit::drive_requests`].
#[derive(Debug, Default)]
pub struct RequestOutcome {
    pub requests: Vec<LineRequest>,
    /// The request table refused an insert this pass; the caller should
    /// back-pressure (stop filling, flush outstanding packets, await
    /// responses).
    pub table_full: bool,
}

pub struct StreamUnit {
    id: u32,
    state: State,
    owner: Option<u64>,
    operands: Option<StreamOperands>,
    tile_capacity: u64,
    page_bytes: u64,
    l: u64,

    all_pages: VecDeque<PagePlan>,
    current_pages: Vec<PagePlan>,

    sent_requests: u64,
    received_requests: u64,

    /// SPD-read, SPD-write, request-table-access finish-tick counters.
    spd_read_ticks: Ticks,
    spd_write_ticks: Ticks,
    rt_access_ticks: Ticks,
}

impl StreamUnit {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            state: State::Idle,
            owner: None,
            operands: None,
            tile_capacity: 0,
            page_bytes: DEFAULT_PAGE_BYTES,
            l: 0,
            all_pages: VecDeque::new(),
            current_pages: Vec::new(),
            sent_requests: 0,
            received_requests: 0,
            spd_read_ticks: Ticks::new(0),
            spd_write_ticks: Ticks::new(0),
            rt_access_ticks: Ticks::new(0),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    /// Decode operands and build the page pre-plan, moving the unit from
    /// Idle straight to Request (Decode is instantaneous — it has no
    /// internal suspension point).
    ///
    /// # Panics
    /// Panics if the unit is not idle — the controller must only issue to
    /// an idle unit.
    pub fn launch(
        &mut self,
        owner: u64,
        operands: StreamOperands,
        tile_capacity: u64,
        page_bytes: u64,
        dram: &DramMapper,
    ) {
        assert!(self.is_idle(), "stream unit must be idle to launch a new instruction");
        self.state = State::Decode;
        let word_bytes = operands.word_size.byte_width();
        let count = (operands.max - operands.min).div_ceil(operands.stride.max(1));
        self.l = count.min(tile_capacity);
        self.tile_capacity = tile_capacity;
        self.page_bytes = page_bytes;
        self.all_pages = plan_pages(
            operands.min,
            operands.max,
            operands.stride,
            word_bytes,
            operands.base_vaddr,
            page_bytes,
            tile_capacity,
            dram,
        );
        self.current_pages.clear();
        self.sent_requests = 0;
        self.received_requests = 0;
        self.owner = Some(owner);
        self.operands = Some(operands);
        self.state = State::Request;
    }

    #[must_use]
    pub fn owner(&self) -> Option<u64> {
        self.owner
    }

    fn refill_current_pages(&mut self) {
        let mut used: HashSet<(u32, u32, u32)> =
            self.current_pages.iter().map(|p| p.group).collect();
        let mut leftover = VecDeque::new();
        while let Some(page) = self.all_pages.pop_front() {
            if used.contains(&page.group) {
                leftover.push_back(page);
            } else {
                used.insert(page.group);
                self.current_pages.push(page);
            }
        }
        self.all_pages = leftover;
    }

    /// Run one request-loop pass, attempting
    /// to drain as much of the current page set into `rt` as the
    /// per-channel single-outstanding rule and table capacity allow.
    /// Words read as zero (condition false) are written to `spd`
    /// immediately; words that must come from memory are left for
    /// [`StreamUnit::on_response`].
    pub fn drive_requests(&mut self, spd: &mut Scratchpad, dram: &DramMapper, rt: &mut RequestTable) -> RequestOutcome {
        let operands = self.operands.expect("drive_requests called before launch");
        let word_bytes = operands.word_size.byte_width();
        let mut outcome = RequestOutcome::default();

        self.refill_current_pages();

        let mut channels_used: HashSet<u32> = HashSet::new();
        let mut next_round = Vec::new();

        for mut page in self.current_pages.drain(..) {
            if outcome.table_full {
                next_round.push(page);
                continue;
            }
            let mut defer_to_all_pages = false;
            let mut defer_to_current = false;

            // `max_iter` on the final page is the raw (exclusive) `max`
            // bound per the page-plan record contract; `cursor < max` keeps
            // that bound exclusive the way every other page's window-based
            // max_iter already is, so `max` itself is never visited.
            while page.cursor <= page.max_iter && page.cursor < operands.max {
                let idx = (page.cursor - operands.min) / operands.stride.max(1);
                if idx >= self.tile_capacity {
                    break;
                }
                if let Some(cond_tile) = operands.cond_tile {
                    if !spd.is_ready(cond_tile, idx as usize) {
                        defer_to_all_pages = true;
                        break;
                    }
                }

                let read_from_memory = match operands.cond_tile {
                    None => true,
                    Some(c) => spd.read32(c, idx as usize) != 0,
                };

                if read_from_memory {
                    let vaddr = operands.base_vaddr + word_bytes * page.cursor;
                    let line = vaddr & !(CACHE_LINE_BYTES - 1);

                    if page.last_line != Some(line) {
                        if let Some(prev_line) = page.last_line {
                            let channel = dram.map(prev_line).channel;
                            if channels_used.contains(&channel) {
                                defer_to_current = true;
                                break;
                            }
                            channels_used.insert(channel);
                            outcome.requests.push(LineRequest { line_vaddr: prev_line });
                            self.sent_requests += 1;
                        }
                        page.last_line = Some(line);
                    }

                    let word_id = ((vaddr - line) / word_bytes) as u8;
                    match rt.add(idx, line, word_id) {
                        AddResult::Added => {}
                        AddResult::Full => {
                            outcome.table_full = true;
                            break;
                        }
                    }
                } else {
                    spd.write32(operands.dst_tile, idx as usize, 0);
                }

                page.cursor += operands.stride.max(1);
            }

            if outcome.table_full {
                next_round.push(page);
                continue;
            }
            if defer_to_all_pages {
                page.last_line = None;
                self.all_pages.push_back(page);
                continue;
            }
            if defer_to_current {
                next_round.push(page);
                continue;
            }

            // Page exhausted: flush its trailing line, if any.
            if let Some(prev_line) = page.last_line {
                let channel = dram.map(prev_line).channel;
                if channels_used.contains(&channel) {
                    next_round.push(page);
                } else {
                    outcome.requests.push(LineRequest { line_vaddr: prev_line });
                    self.sent_requests += 1;
                    // page fully drained, drop it
                }
            }
            // else: page had no lines left to flush, drop it.
        }

        self.current_pages = next_round;
        outcome
    }

    /// A response for `line_vaddr` has arrived with 64 bytes of data,
    /// accessed word-by-word through `word_value`. Writes the words this
    /// unit requested from that line into the destination tile and
    /// returns the clean-evict to emit.
    pub fn on_response(
        &mut self,
        spd: &mut Scratchpad,
        rt: &mut RequestTable,
        line_vaddr: u64,
        mut word_value: impl FnMut(u8) -> u32,
    ) -> CleanEvict {
        let dst_tile = self.operands.expect("on_response before launch").dst_tile;
        for (idx, word_id) in rt.drain(line_vaddr) {
            spd.write32(dst_tile, idx as usize, word_value(word_id));
        }
        self.received_requests += 1;
        CleanEvict { line_vaddr }
    }

    /// True once every planned line has been sent and answered and no
    /// page remains queued — the unit may transition Request -> Response
    /// and report completion.
    #[must_use]
    pub fn all_work_done(&self) -> bool {
        self.state == State::Request
            && self.all_pages.is_empty()
            && self.current_pages.is_empty()
            && self.sent_requests == self.received_requests
    }

    /// Marks the tile Finished at size `L`, parks the unit in Response,
    /// and returns the owning instruction so the controller can run its
    /// `finish-compute` callback.
    ///
    /// # Panics
    /// Panics if [`StreamUnit::all_work_done`] is not yet true.
    pub fn finish(&mut self, spd: &mut Scratchpad) -> u64 {
        assert!(self.all_work_done(), "finish called before all planned lines were answered");
        let operands = self.operands.expect("finish before launch");
        spd.set_tile_finished(operands.dst_tile, operands.word_size.word_size(), self.l as u16);
        self.state = State::Response;
        self.owner.expect("finish before launch")
    }

    /// Return the unit to Idle, ready for the controller to issue a new
    /// instruction onto it.
    pub fn retire(&mut self) {
        assert_eq!(self.state, State::Response, "retire called outside Response");
        self.state = State::Idle;
        self.owner = None;
        self.operands = None;
        self.all_pages.clear();
        self.current_pages.clear();
    }

    #[must_use]
    pub fn logical_length(&self) -> u64 {
        self.l
    }

    /// Bump the SPD-read/write/request-table-access finish-tick counters
    /// by one batch; the next wake-up the controller schedules for this
    /// unit is `max` of the three.
    pub fn account_batch(&mut self, spd_read: Ticks, spd_write: Ticks, rt_access: Ticks) -> Ticks {
        self.spd_read_ticks = self.spd_read_ticks + spd_read;
        self.spd_write_ticks = self.spd_write_ticks + spd_write;
        self.rt_access_ticks = self.rt_access_ticks + rt_access;
        spd_read.max(spd_write).max(rt_access)
    }
}
