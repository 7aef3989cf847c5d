//! Address-Range Decoder (C1): classifies a physical address into one of
//! the MAA's MMIO windows and an offset within it.
//!
//! Pure and side-effect free. Windows are contiguous, non-overlapping, and
//! visited in the fixed order below, so decode is unambiguous by
//! construction.

/// Which MMIO window a decoded address falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    SpdDataCacheable,
    SpdDataNoncacheable,
    SpdSize,
    SpdReady,
    ScalarReg,
    InstructionReg,
}

/// Layout of the MAA's address-mapped window span, in element counts.
#[derive(Debug, Clone, Copy)]
pub struct AddressLayout {
    pub base: u64,
    pub n_tiles: usize,
    pub elements_per_tile: usize,
    pub n_regs: usize,
    pub n_instr_slots: usize,
}

impl AddressLayout {
    const SPD_ELEM_BYTES: u64 = 4;
    const SIZE_ELEM_BYTES: u64 = 2;
    const READY_ELEM_BYTES: u64 = 2;
    const REG_ELEM_BYTES: u64 = 8;
    /// 3 words x 8 bytes per instruction slot.
    const INSTR_SLOT_BYTES: u64 = 24;

    fn spd_data_span(&self) -> u64 {
        self.n_tiles as u64 * self.elements_per_tile as u64 * Self::SPD_ELEM_BYTES
    }

    fn spd_size_span(&self) -> u64 {
        self.n_tiles as u64 * Self::SIZE_ELEM_BYTES
    }

    fn spd_ready_span(&self) -> u64 {
        self.n_tiles as u64 * Self::READY_ELEM_BYTES
    }

    fn scalar_reg_span(&self) -> u64 {
        self.n_regs as u64 * Self::REG_ELEM_BYTES
    }

    fn instruction_reg_span(&self) -> u64 {
        self.n_instr_slots as u64 * Self::INSTR_SLOT_BYTES
    }

    /// Total span of the MAA's address range, `S`.
    #[must_use]
    pub fn total_span(&self) -> u64 {
        self.spd_data_span() * 2
            + self.spd_size_span()
            + self.spd_ready_span()
            + self.scalar_reg_span()
            + self.instruction_reg_span()
    }

    /// Decode `addr` into `(window, offset-within-window)`, or `None` if
    /// the address falls outside `[base, base + total_span)`.
    #[must_use]
    pub fn decode(&self, addr: u64) -> Option<(Window, u64)> {
        if addr < self.base {
            return None;
        }
        let mut off = addr - self.base;

        macro_rules! window {
            ($span:expr, $window:expr) => {
                let span = $span;
                if off < span {
                    return Some(($window, off));
                }
                off -= span;
            };
        }

        window!(self.spd_data_span(), Window::SpdDataCacheable);
        window!(self.spd_data_span(), Window::SpdDataNoncacheable);
        window!(self.spd_size_span(), Window::SpdSize);
        window!(self.spd_ready_span(), Window::SpdReady);
        window!(self.scalar_reg_span(), Window::ScalarReg);
        window!(self.instruction_reg_span(), Window::InstructionReg);

        None
    }

    /// Tile/element indices for an SPD-data-window offset.
    #[must_use]
    pub fn spd_tile_element(&self, offset: u64) -> (usize, usize) {
        let elem_idx = offset / Self::SPD_ELEM_BYTES;
        let tile = elem_idx as usize / self.elements_per_tile;
        let element = elem_idx as usize % self.elements_per_tile;
        (tile, element)
    }

    /// Tile index for an spd-size/spd-ready window offset.
    #[must_use]
    pub fn size_or_ready_tile(&self, offset: u64, elem_bytes: u64) -> usize {
        (offset / elem_bytes) as usize
    }

    /// Tile index for an `spd-size` window offset.
    #[must_use]
    pub fn spd_size_tile(&self, offset: u64) -> usize {
        self.size_or_ready_tile(offset, Self::SIZE_ELEM_BYTES)
    }

    /// Tile index for an `spd-ready` window offset.
    #[must_use]
    pub fn spd_ready_tile(&self, offset: u64) -> usize {
        self.size_or_ready_tile(offset, Self::READY_ELEM_BYTES)
    }

    /// Register index for a scalar-reg window offset.
    #[must_use]
    pub fn reg_index(&self, offset: u64) -> usize {
        (offset / Self::REG_ELEM_BYTES) as usize
    }

    /// Absolute address of the first byte of `window`.
    #[must_use]
    pub fn window_base(&self, window: Window) -> u64 {
        let mut off = 0u64;
        for (w, span) in [
            (Window::SpdDataCacheable, self.spd_data_span()),
            (Window::SpdDataNoncacheable, self.spd_data_span()),
            (Window::SpdSize, self.spd_size_span()),
            (Window::SpdReady, self.spd_ready_span()),
            (Window::ScalarReg, self.scalar_reg_span()),
            (Window::InstructionReg, self.instruction_reg_span()),
        ] {
            if w == window {
                return self.base + off;
            }
            off += span;
        }
        unreachable!("all Window variants are listed above")
    }

    /// (instruction slot, word-in-slot) for an instruction-reg window offset.
    #[must_use]
    pub fn instruction_slot_word(&self, offset: u64) -> (usize, usize) {
        let slot = (offset / Self::INSTR_SLOT_BYTES) as usize;
        let word = ((offset % Self::INSTR_SLOT_BYTES) / 8) as usize;
        (slot, word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> AddressLayout {
        AddressLayout {
            base: 0x1000_0000,
            n_tiles: 4,
            elements_per_tile: 8,
            n_regs: 32,
            n_instr_slots: 1,
        }
    }

    #[test]
    fn decodes_cacheable_window_at_base() {
        let l = layout();
        assert_eq!(l.decode(l.base), Some((Window::SpdDataCacheable, 0)));
    }

    #[test]
    fn decodes_noncacheable_window_right_after_cacheable() {
        let l = layout();
        let cacheable_span = l.spd_data_span();
        assert_eq!(
            l.decode(l.base + cacheable_span),
            Some((Window::SpdDataNoncacheable, 0))
        );
    }

    #[test]
    fn decodes_size_ready_reg_instr_in_order() {
        let l = layout();
        let mut off = l.base + l.spd_data_span() * 2;
        assert_eq!(l.decode(off), Some((Window::SpdSize, 0)));
        off += l.spd_size_span();
        assert_eq!(l.decode(off), Some((Window::SpdReady, 0)));
        off += l.spd_ready_span();
        assert_eq!(l.decode(off), Some((Window::ScalarReg, 0)));
        off += l.scalar_reg_span();
        assert_eq!(l.decode(off), Some((Window::InstructionReg, 0)));
    }

    #[test]
    fn out_of_range_address_is_external() {
        let l = layout();
        assert_eq!(l.decode(l.base - 1), None);
        assert_eq!(l.decode(l.base + l.total_span()), None);
    }

    #[test]
    fn spd_tile_element_indexes_correctly() {
        let l = layout();
        // element 9 (tile 1, element 1) at 4 bytes/word
        assert_eq!(l.spd_tile_element(9 * 4), (1, 1));
    }

    #[test]
    fn window_base_matches_decode_order() {
        let l = layout();
        assert_eq!(l.window_base(Window::SpdDataCacheable), l.base);
        assert_eq!(
            l.window_base(Window::SpdDataNoncacheable),
            l.base + l.spd_data_span()
        );
        assert_eq!(
            l.decode(l.window_base(Window::InstructionReg)),
            Some((Window::InstructionReg, 0))
        );
    }

    #[test]
    fn instruction_slot_word_indexes_correctly() {
        let l = AddressLayout {
            n_instr_slots: 2,
            ..layout()
        };
        assert_eq!(l.instruction_slot_word(0), (0, 0));
        assert_eq!(l.instruction_slot_word(16), (0, 2));
        assert_eq!(l.instruction_slot_word(24), (1, 0));
    }
}
