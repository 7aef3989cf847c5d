//! Tile lifecycle, dirty, and per-element ready state.
//!
//! A tile is SPD's unit of ownership: exactly one producer (a functional
//! unit, or "nobody yet") may hold a tile at a time, tracked by
//! [`Lifecycle`]. 64-bit tiles are modeled as a pair of adjacent 32-bit
//! tiles that must agree on every externally observable field; [`Spd`]
//! (in `spd.rs`) is responsible for keeping the pair in lock-step, not
//! `Tile` itself.

/// Element word width, as configured per instruction/tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    W32,
    W64,
}

impl WordSize {
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            WordSize::W32 => 4,
            WordSize::W64 => 8,
        }
    }
}

/// A tile's position in its current owner instruction's lifetime.
///
/// Idle = no producer has ever written. Service = a unit is actively
/// producing into it. Finished = content valid and visible to consumers.
/// Transitions are monotone within one owning instruction: Idle -> Service
/// -> Finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Service,
    Finished,
}

/// Per-tile state: lifecycle, CPU-dirty flag, per-element ready bits, size.
pub struct Tile {
    lifecycle: Lifecycle,
    /// True iff the CPU modified this tile through the cacheable window and
    /// the invalidator has not yet written it back into SPD storage.
    dirty: bool,
    /// Per-element readiness. Consumers must not read past this promise.
    ready: Vec<bool>,
    /// Current logical length (<= capacity).
    size: u16,
    /// Word size of the instruction currently (or most recently) producing
    /// this tile. Set when the tile enters Service; subsequent lifecycle/
    /// ready calls for the same instruction must agree with it.
    word_size: WordSize,
}

impl Tile {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            dirty: false,
            ready: vec![false; capacity],
            size: 0,
            word_size: WordSize::W32,
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn size(&self) -> u16 {
        self.size
    }

    #[must_use]
    pub fn is_ready(&self, element: usize) -> bool {
        self.ready[element]
    }

    /// Every tile starts Finished-equivalent-readiness check for `spd-ready`:
    /// the whole tile, not a single element, is what the `spd-ready` MMIO
    /// window stalls on.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lifecycle == Lifecycle::Finished
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Begin production. Clears all ready bits and records the word size
    /// this instruction is using, so later calls can assert consistency.
    ///
    /// # Panics
    /// Panics if the tile is already in `Service` under a different word
    /// size than requested — two producers racing the same tile is a
    /// controller bug, not a recoverable condition.
    pub fn set_service(&mut self, word_size: WordSize) {
        assert!(
            self.lifecycle != Lifecycle::Service || self.word_size == word_size,
            "tile already in Service under a different word size"
        );
        self.lifecycle = Lifecycle::Service;
        self.word_size = word_size;
        self.ready.iter_mut().for_each(|r| *r = false);
    }

    /// Complete production: lifecycle -> Finished, size set, no ready bits
    /// touched (callers set ready explicitly, possibly before this call).
    ///
    /// # Panics
    /// Panics on a word-size mismatch with the in-progress `Service` state.
    pub fn set_finished(&mut self, word_size: WordSize, size: u16) {
        assert_eq!(
            self.word_size, word_size,
            "finish word size disagrees with service word size"
        );
        self.lifecycle = Lifecycle::Finished;
        self.size = size;
    }

    /// Reset to Idle (boot state, or explicit controller reset).
    pub fn set_idle(&mut self) {
        self.lifecycle = Lifecycle::Idle;
        self.size = 0;
        self.ready.iter_mut().for_each(|r| *r = false);
    }

    pub fn set_ready(&mut self, element: usize, word_size: WordSize) {
        assert_eq!(
            self.word_size, word_size,
            "set_ready word size disagrees with tile's service word size"
        );
        self.ready[element] = true;
    }

    pub fn clear_ready_all(&mut self, word_size: WordSize) {
        assert_eq!(
            self.word_size, word_size,
            "clear_ready word size disagrees with tile's service word size"
        );
        self.ready.iter_mut().for_each(|r| *r = false);
    }

    #[must_use]
    pub fn word_size(&self) -> WordSize {
        self.word_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_tile_has_no_ready_bits_set() {
        let tile = Tile::new(8);
        assert_eq!(tile.lifecycle(), Lifecycle::Idle);
        for i in 0..8 {
            assert!(!tile.is_ready(i));
        }
    }

    #[test]
    fn service_then_finished_is_monotone() {
        let mut tile = Tile::new(4);
        tile.set_service(WordSize::W32);
        assert_eq!(tile.lifecycle(), Lifecycle::Service);
        tile.set_ready(0, WordSize::W32);
        tile.set_finished(WordSize::W32, 4);
        assert_eq!(tile.lifecycle(), Lifecycle::Finished);
        assert!(tile.is_ready(0));
        assert!(!tile.is_ready(1));
    }

    #[test]
    #[should_panic(expected = "disagrees")]
    fn word_size_mismatch_on_finish_panics() {
        let mut tile = Tile::new(4);
        tile.set_service(WordSize::W32);
        tile.set_finished(WordSize::W64, 4);
    }

    #[test]
    fn dirty_is_independent_of_lifecycle() {
        let mut tile = Tile::new(4);
        tile.mark_dirty();
        assert!(tile.dirty());
        tile.set_service(WordSize::W32);
        assert!(tile.dirty(), "dirty only cleared by the invalidator");
        tile.clear_dirty();
        assert!(!tile.dirty());
    }
}
