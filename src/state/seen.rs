//! Deduplication registry
//!
//! The seen-set is the single authority on whether a document id has already
//! been dispatched. It only ever grows.

use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct SeenSet {
    ids: Mutex<HashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the id and returns true if it was not seen before
    ///
    /// Check and insert happen under one lock, so of two concurrent callers
    /// with the same id exactly one gets `true`.
    pub fn insert(&self, id: &str) -> bool {
        let mut ids = self.ids.lock();
        if ids.contains(id) {
            return false;
        }
        ids.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_once() {
        let seen = SeenSet::new();
        assert!(seen.insert("https://example.org/paper/1"));
        assert!(!seen.insert("https://example.org/paper/1"));
        assert!(seen.contains("https://example.org/paper/1"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_concurrent_inserts_admit_one() {
        let seen = Arc::new(SeenSet::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = Arc::clone(&seen);
                std::thread::spawn(move || seen.insert("https://example.org/paper/d"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|first| *first)
            .count();
        assert_eq!(admitted, 1);
    }
}
