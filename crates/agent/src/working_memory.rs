//! Working memory: bounded scratchpad for a single run.
//!
//! Holds drafts, critiques and tool results the loops want the gateway to
//! see again. Capacity is fixed at construction; appending to a full store
//! evicts exactly the oldest item. Items are never promoted or reused.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use toolwright_core::memory::{MemoryItem, MemoryKind, render_memory};

/// A FIFO store of [`MemoryItem`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    items: VecDeque<MemoryItem>,
    capacity: usize,
    next_seq: u64,
}

impl WorkingMemory {
    /// Create an empty store. A capacity of 0 retains nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    /// Append an item, returning the one evicted to make room (if any).
    pub fn append(&mut self, kind: MemoryKind, content: impl Into<String>) -> Option<MemoryItem> {
        let item = MemoryItem {
            kind,
            content: content.into(),
            seq: self.next_seq,
        };
        self.next_seq += 1;

        if self.capacity == 0 {
            return Some(item);
        }

        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// The `k` most recent items, oldest first.
    pub fn recent(&self, k: usize) -> Vec<MemoryItem> {
        let k = k.min(self.items.len());
        self.items
            .iter()
            .skip(self.items.len() - k)
            .cloned()
            .collect()
    }

    /// Drop everything. Sequence numbers start again from 0.
    pub fn clear(&mut self) {
        self.items.clear();
        self.next_seq = 0;
    }

    /// Text block of the `k` most recent items, for prompts.
    pub fn render(&self, k: usize) -> String {
        render_memory(&self.recent(k))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(items: &[MemoryItem]) -> Vec<&str> {
        items.iter().map(|i| i.content.as_str()).collect()
    }

    #[test]
    fn recent_returns_insertion_order() {
        let mut wm = WorkingMemory::new(4);
        wm.append(MemoryKind::Draft, "a");
        wm.append(MemoryKind::Critique, "b");
        wm.append(MemoryKind::ToolResult, "c");

        assert_eq!(contents(&wm.recent(2)), vec!["b", "c"]);
        assert_eq!(contents(&wm.recent(10)), vec!["a", "b", "c"]);
        assert!(wm.recent(0).is_empty());
    }

    #[test]
    fn overflow_evicts_exactly_the_oldest() {
        let mut wm = WorkingMemory::new(3);
        for i in 0..3 {
            assert!(wm.append(MemoryKind::Draft, format!("d{i}")).is_none());
        }

        let evicted = wm.append(MemoryKind::Draft, "d3").unwrap();
        assert_eq!(evicted.content, "d0");
        assert_eq!(wm.len(), 3);
        assert_eq!(contents(&wm.recent(3)), vec!["d1", "d2", "d3"]);
    }

    #[test]
    fn bound_holds_after_many_appends() {
        let capacity = 5;
        let mut wm = WorkingMemory::new(capacity);
        for i in 0..100 {
            wm.append(MemoryKind::ToolResult, i.to_string());
            assert!(wm.len() <= capacity);
        }

        let recent = wm.recent(capacity);
        assert_eq!(contents(&recent), vec!["95", "96", "97", "98", "99"]);
        let seqs: Vec<u64> = recent.iter().map(|i| i.seq).collect();
        assert_eq!(seqs, vec![95, 96, 97, 98, 99]);
    }

    #[test]
    fn clear_resets_sequence() {
        let mut wm = WorkingMemory::new(2);
        wm.append(MemoryKind::Draft, "x");
        wm.append(MemoryKind::Draft, "y");
        wm.clear();

        assert!(wm.is_empty());
        assert_eq!(wm.capacity(), 2);
        wm.append(MemoryKind::Critique, "z");
        assert_eq!(wm.recent(1)[0].seq, 0);
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let mut wm = WorkingMemory::new(0);
        let evicted = wm.append(MemoryKind::Draft, "gone");
        assert_eq!(evicted.map(|i| i.content), Some("gone".to_string()));
        assert!(wm.is_empty());
    }

    #[test]
    fn render_labels_items() {
        let mut wm = WorkingMemory::new(8);
        wm.append(MemoryKind::ToolResult, "convert_currency: 92.5");
        wm.append(MemoryKind::Draft, "100 USD is 92.50 EUR");
        assert_eq!(
            wm.render(8),
            "[0] Tool result: convert_currency: 92.5\n[1] Draft: 100 USD is 92.50 EUR"
        );
    }
}
