//! Per-partition hint of the next free row
//!
//! A hint is a lower bound on the first empty row of its partition. It is
//! only advanced after a confirmed write and never persisted, so a fresh
//! process (or [`RowCursorCache::clear`]) starts every partition at row 0
//! and rescans.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct RowCursorCache {
    hints: HashMap<String, u32>,
}

impl RowCursorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hint for `partition`, 0 when unknown.
    pub fn get(&self, partition: &str) -> u32 {
        self.hints.get(partition).copied().unwrap_or(0)
    }

    /// Record that every row below `next_free_row` is in use.
    /// Never moves a hint backwards.
    pub fn advance(&mut self, partition: &str, next_free_row: u32) {
        let hint = self.hints.entry(partition.to_string()).or_insert(0);
        if next_free_row > *hint {
            *hint = next_free_row;
        }
    }

    /// Drop every hint, as after a restart.
    pub fn clear(&mut self) {
        self.hints.clear();
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_partition_starts_at_zero() {
        let cache = RowCursorCache::new();
        assert_eq!(cache.get("2024-05"), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut cache = RowCursorCache::new();
        cache.advance("2024-05", 3);
        cache.advance("2024-05", 1);
        assert_eq!(cache.get("2024-05"), 3);
        assert_eq!(cache.get("2024-06"), 0);
    }

    #[test]
    fn test_clear_forgets_hints() {
        let mut cache = RowCursorCache::new();
        cache.advance("2024-05", 7);
        cache.clear();
        assert_eq!(cache.get("2024-05"), 0);
    }
}
