//! Port and back-pressure model shared by the controller and functional
//! units. Each port holds a small array, indexed by (unit-class, unit-id),
//! recording why that unit is currently parked; the unblock routine walks
//! the array in canonical order and calls back into each parked unit in
//! turn. Plain data in place of a virtual-port hierarchy.

use crate::instruction::UnitClass;

/// Canonical order units are walked in for both issue and unblock
/// callbacks.
pub const CANONICAL_ORDER: [UnitClass; 5] = [
    UnitClass::Invalidator,
    UnitClass::Stream,
    UnitClass::Indirect,
    UnitClass::Alu,
    UnitClass::RangeFuser,
];

/// Why a unit is currently unable to make forward progress on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    NotBlocked,
    MaxXbarPackets,
    CacheFailed,
    MemFailed,
}

/// A unit parked on a port, recorded by (class, id) so the unblock pass
/// can call back into the owning unit without a virtual dispatch table.
#[derive(Debug, Clone, Copy)]
struct Parked {
    class: UnitClass,
    id: u32,
    reason: BlockReason,
}

/// One coherent send/receive port (e.g. the cache-side request port).
#[derive(Default)]
pub struct Port {
    parked: Vec<Parked>,
}

impl Port {
    #[must_use]
    pub fn new() -> Self {
        Self { parked: Vec::new() }
    }

    /// Record that `(class, id)` is parked for `reason`, replacing any
    /// earlier parked entry for the same unit.
    pub fn park(&mut self, class: UnitClass, id: u32, reason: BlockReason) {
        self.unpark(class, id);
        self.parked.push(Parked { class, id, reason });
    }

    pub fn unpark(&mut self, class: UnitClass, id: u32) {
        self.parked.retain(|p| !(p.class == class && p.id == id));
    }

    #[must_use]
    pub fn reason_for(&self, class: UnitClass, id: u32) -> Option<BlockReason> {
        self.parked
            .iter()
            .find(|p| p.class == class && p.id == id)
            .map(|p| p.reason)
    }

    #[must_use]
    pub fn is_blocked(&self, class: UnitClass, id: u32) -> bool {
        self.reason_for(class, id).is_some()
    }

    /// All currently-parked units, visited in [`CANONICAL_ORDER`] — the
    /// order the port's unblock routine calls back into parked units.
    /// Does not clear parked state; callers resolve each unit and call
    /// [`Port::unpark`] themselves once it has retried.
    #[must_use]
    pub fn parked_in_canonical_order(&self) -> Vec<(UnitClass, u32)> {
        let mut out = Vec::new();
        for class in CANONICAL_ORDER {
            for p in self.parked.iter().filter(|p| p.class == class) {
                out.push((p.class, p.id));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn park_and_query_reason() {
        let mut port = Port::new();
        port.park(UnitClass::Stream, 0, BlockReason::MaxXbarPackets);
        assert_eq!(
            port.reason_for(UnitClass::Stream, 0),
            Some(BlockReason::MaxXbarPackets)
        );
        assert!(port.is_blocked(UnitClass::Stream, 0));
    }

    #[test]
    fn unpark_clears_the_entry() {
        let mut port = Port::new();
        port.park(UnitClass::Stream, 0, BlockReason::CacheFailed);
        port.unpark(UnitClass::Stream, 0);
        assert!(!port.is_blocked(UnitClass::Stream, 0));
    }

    #[test]
    fn canonical_order_visits_invalidator_before_streams() {
        let mut port = Port::new();
        port.park(UnitClass::Stream, 1, BlockReason::MaxXbarPackets);
        port.park(UnitClass::Invalidator, 0, BlockReason::CacheFailed);
        let order = port.parked_in_canonical_order();
        assert_eq!(order, vec![(UnitClass::Invalidator, 0), (UnitClass::Stream, 1)]);
    }
}
