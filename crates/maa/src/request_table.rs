//! Request Table (C5): a coalescing buffer mapping a cache-line address to
//! the (iteration-index, word-id) pairs that need bytes from that line.
//! Bounded `A` lines x `E` entries/line.

/// Outcome of [`RequestTable::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    Added,
    /// The line exists but has no free entry slot, or no free line is
    /// available for a new address. Either way the caller back-pressures:
    /// stop filling, flush outstanding requests, await responses.
    Full,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    iter: u64,
    word_id: u8,
}

struct Line {
    addr: u64,
    entries: Vec<Option<Entry>>,
}

pub struct RequestTable {
    entries_per_line: usize,
    lines: Vec<Option<Line>>,
}

impl RequestTable {
    #[must_use]
    pub fn new(n_lines: usize, entries_per_line: usize) -> Self {
        Self {
            entries_per_line,
            lines: (0..n_lines).map(|_| None).collect(),
        }
    }

    #[must_use]
    pub fn capacity_lines(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn contains(&self, line_addr: u64) -> bool {
        self.lines
            .iter()
            .flatten()
            .any(|l| l.addr == line_addr)
    }

    /// Add `(iter, word_id)` under `line_addr`. Allocates a new line if
    /// `line_addr` is not yet present.
    pub fn add(&mut self, iter: u64, line_addr: u64, word_id: u8) -> AddResult {
        if let Some(line) = self.lines.iter_mut().flatten().find(|l| l.addr == line_addr) {
            match line.entries.iter_mut().find(|e| e.is_none()) {
                Some(slot) => {
                    *slot = Some(Entry { iter, word_id });
                    AddResult::Added
                }
                None => AddResult::Full,
            }
        } else {
            match self.lines.iter_mut().find(|l| l.is_none()) {
                Some(free) => {
                    let mut entries = vec![None; self.entries_per_line];
                    entries[0] = Some(Entry { iter, word_id });
                    *free = Some(Line {
                        addr: line_addr,
                        entries,
                    });
                    AddResult::Added
                }
                None => AddResult::Full,
            }
        }
    }

    /// Returns and invalidates all entries for `line_addr`, in the order
    /// they were added.
    pub fn drain(&mut self, line_addr: u64) -> Vec<(u64, u8)> {
        let Some(slot) = self.lines.iter_mut().find(|l| matches!(l, Some(line) if line.addr == line_addr)) else {
            return Vec::new();
        };
        let line = slot.take().expect("matched Some above");
        line.entries
            .into_iter()
            .flatten()
            .map(|e| (e.iter, e.word_id))
            .collect()
    }

    /// Zero all valid bits (full table reset).
    pub fn reset(&mut self) {
        for line in &mut self.lines {
            *line = None;
        }
    }

    #[must_use]
    pub fn lines_in_use(&self) -> usize {
        self.lines.iter().filter(|l| l.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_allocates_new_line_then_coalesces() {
        let mut rt = RequestTable::new(4, 4);
        assert_eq!(rt.add(0, 0x1000, 0), AddResult::Added);
        assert_eq!(rt.add(1, 0x1000, 4), AddResult::Added);
        assert_eq!(rt.lines_in_use(), 1);
    }

    #[test]
    fn line_full_reports_full_without_spilling() {
        let mut rt = RequestTable::new(4, 1);
        assert_eq!(rt.add(0, 0x1000, 0), AddResult::Added);
        assert_eq!(rt.add(1, 0x1000, 1), AddResult::Full);
    }

    #[test]
    fn table_full_when_all_lines_used() {
        let mut rt = RequestTable::new(1, 2);
        assert_eq!(rt.add(0, 0x1000, 0), AddResult::Added);
        assert_eq!(rt.add(0, 0x2000, 0), AddResult::Full);
    }

    #[test]
    fn drain_returns_in_insertion_order_and_invalidates() {
        let mut rt = RequestTable::new(2, 4);
        rt.add(0, 0x1000, 0);
        rt.add(1, 0x1000, 4);
        rt.add(2, 0x1000, 8);
        let drained = rt.drain(0x1000);
        assert_eq!(drained, vec![(0, 0), (1, 4), (2, 8)]);
        assert!(!rt.contains(0x1000));
    }

    #[test]
    fn reset_clears_all_lines() {
        let mut rt = RequestTable::new(2, 2);
        rt.add(0, 0x1000, 0);
        rt.add(0, 0x2000, 0);
        rt.reset();
        assert_eq!(rt.lines_in_use(), 0);
    }
}
