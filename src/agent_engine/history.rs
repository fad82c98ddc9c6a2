use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One past turn as replayed to the decision model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    /// Screen the model looked at, PNG encoded.
    #[serde(skip)]
    pub screenshot_png: Vec<u8>,
    /// Raw model response for that screen.
    pub response: String,
}

/// Rolling window of the most recent turns. Oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct TurnHistory {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl TurnHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, screenshot_png: Vec<u8>, response: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            ts: chrono::Utc::now().timestamp_millis(),
            screenshot_png,
            response: response.into(),
        });
        tracing::debug!(len = self.entries.len(), capacity = self.capacity, "history entry pushed");
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_turn_is_evicted_first() {
        let mut h = TurnHistory::new(2);
        h.push(vec![1], "a");
        h.push(vec![2], "b");
        h.push(vec![3], "c");
        let responses: Vec<_> = h.iter().map(|e| e.response.as_str()).collect();
        assert_eq!(responses, vec!["b", "c"]);
        assert_eq!(h.iter().next().map(|e| e.screenshot_png.clone()), Some(vec![2]));
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut h = TurnHistory::new(0);
        h.push(vec![1], "a");
        assert!(h.is_empty());
    }
}
