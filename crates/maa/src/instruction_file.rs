//! Instruction File (IF, C4): a finite pool of in-flight instruction slots,
//! admitting new instructions when dependencies allow and handing out the
//! oldest ready instruction per functional-unit class.

use std::collections::VecDeque;

use crate::instruction::{DependencyStatus, Instruction, UnitClass};

/// Snapshot of each operand's dependency status at admission time, used
/// only to gate admission — live readiness is re-evaluated on every
/// `get_ready` call via the caller-supplied source-readiness query.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperandStatuses {
    pub src1: Option<DependencyStatus>,
    pub src2: Option<DependencyStatus>,
    pub cond: Option<DependencyStatus>,
    pub dst1: Option<DependencyStatus>,
    pub dst2: Option<DependencyStatus>,
}

impl OperandStatuses {
    fn any_wait_for_invalidation(&self) -> bool {
        [self.src1, self.src2, self.cond, self.dst1, self.dst2]
            .into_iter()
            .any(|s| s == Some(DependencyStatus::WaitForInvalidation))
    }
}

struct Slot {
    seq: u64,
    instruction: Instruction,
    dispatched: bool,
}

/// Opaque handle identifying an admitted instruction within the IF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seq(pub u64);

pub struct InstructionFile {
    capacity: usize,
    slots: VecDeque<Slot>,
    next_seq: u64,
}

impl InstructionFile {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: VecDeque::new(),
            next_seq: 0,
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Admit `instruction` if a slot is free and no operand is currently
    /// `WaitForInvalidation`. A destination tile that is still Dirty is
    /// therefore not admitted at all; the caller (the controller's
    /// dispatch loop) is expected to retry once some Invalidate
    /// instruction clears the tile.
    ///
    /// Returns the admission sequence number on success.
    pub fn push(&mut self, instruction: Instruction, statuses: OperandStatuses) -> Option<Seq> {
        if self.is_full() || statuses.any_wait_for_invalidation() {
            return None;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.push_back(Slot {
            seq,
            instruction,
            dispatched: false,
        });
        Some(Seq(seq))
    }

    #[must_use]
    pub fn instruction(&self, seq: Seq) -> Option<&Instruction> {
        self.slots.iter().find(|s| s.seq == seq.0).map(|s| &s.instruction)
    }

    /// Oldest admitted, not-yet-dispatched instruction of `unit_class`
    /// whose sources are all reported ready by `src_ready`. In-order issue
    /// per class: if the oldest instruction of this class is not ready,
    /// no instruction of this class issues this round, even if a younger
    /// one would be ready.
    pub fn get_ready(
        &mut self,
        unit_class: UnitClass,
        mut src_ready: impl FnMut(&Instruction) -> bool,
    ) -> Option<Seq> {
        let oldest = self
            .slots
            .iter()
            .filter(|s| !s.dispatched && s.instruction.unit_class == unit_class)
            .min_by_key(|s| s.seq)?;
        if src_ready(&oldest.instruction) {
            let seq = oldest.seq;
            if let Some(slot) = self.slots.iter_mut().find(|s| s.seq == seq) {
                slot.dispatched = true;
            }
            Some(Seq(seq))
        } else {
            None
        }
    }

    /// Clear the slot for a finished instruction.
    pub fn finish_compute(&mut self, seq: Seq) {
        self.slots.retain(|s| s.seq != seq.0);
    }
}
