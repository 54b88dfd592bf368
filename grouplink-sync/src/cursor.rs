//! Offset/limit pagination for one phase of a batch.

use serde::{Deserialize, Serialize};

/// Page size used when a job is created without an explicit one.
pub const DEFAULT_STEP_SIZE: u64 = 25;

/// Pagination state: an offset into the phase's listing and a page size.
///
/// A `step_size` of `0` means "no paging": the whole listing is one page.
///
/// `offset` is a position in the listing as it was when the phase started.
/// Rows the phase itself deleted before that position are counted in
/// `removed`, and the page is read at `offset - removed` in the current
/// listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCursor {
    offset: u64,
    step_size: u64,
    #[serde(default)]
    removed: u64,
}

impl Default for StepCursor {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_SIZE)
    }
}

impl StepCursor {
    pub fn new(step_size: u64) -> Self {
        Self {
            offset: 0,
            step_size,
            removed: 0,
        }
    }

    /// Offset of the page to process now.
    pub fn initialise(&self) -> u64 {
        self.offset
    }

    /// Advance past the current page.
    pub fn next(&mut self) {
        self.offset = self.offset.saturating_add(self.step_size);
    }

    pub fn step_count_get(&self) -> u64 {
        self.step_size
    }

    pub fn step_count_set(&mut self, step_size: u64) {
        self.step_size = step_size;
    }

    /// First row of the current page ("from").
    pub fn get(&self) -> u64 {
        self.offset
    }

    /// One past the last row of the current page ("to").
    pub fn next_get(&self) -> u64 {
        self.offset.saturating_add(self.step_size)
    }

    /// Where the current page starts in the listing as it is now.
    pub fn fetch_offset(&self) -> u64 {
        self.offset.saturating_sub(self.removed)
    }

    /// Note `count` rows deleted from the listing before the next page.
    pub fn record_removed(&mut self, count: u64) {
        self.removed = self.removed.saturating_add(count);
    }

    /// Back to the first page; the page size is kept.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.removed = 0;
    }

    pub fn is_unpaged(&self) -> bool {
        self.step_size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_advances_by_step_size() {
        let mut cursor = StepCursor::new(10);
        assert_eq!(cursor.initialise(), 0);
        cursor.next();
        cursor.next();
        assert_eq!(cursor.initialise(), 20);
        assert_eq!(cursor.get(), 20);
        assert_eq!(cursor.next_get(), 30);
    }

    #[test]
    fn zero_step_never_moves() {
        let mut cursor = StepCursor::new(0);
        cursor.next();
        assert_eq!(cursor.initialise(), 0);
        assert!(cursor.is_unpaged());
    }

    #[test]
    fn reset_keeps_step_size() {
        let mut cursor = StepCursor::new(5);
        cursor.next();
        cursor.reset();
        assert_eq!(cursor.initialise(), 0);
        assert_eq!(cursor.step_count_get(), 5);
    }

    #[test]
    fn removed_rows_pull_fetch_offset_back() {
        let mut cursor = StepCursor::new(2);
        cursor.next();
        cursor.record_removed(1);
        cursor.next();
        assert_eq!(cursor.get(), 4);
        assert_eq!(cursor.fetch_offset(), 3);
        cursor.reset();
        assert_eq!(cursor.fetch_offset(), 0);
    }

    #[test]
    fn default_step_size() {
        assert_eq!(StepCursor::default().step_count_get(), DEFAULT_STEP_SIZE);
    }
}
