//! Bounded set of recently seen block hashes.

use std::collections::{HashSet, VecDeque};

use tessera_types::BlockHash;

/// Keeps the last `capacity` hashes in insertion order; the oldest is evicted
/// first.
pub struct RecentHashes {
    capacity: usize,
    hashes: HashSet<BlockHash>,
    order: VecDeque<BlockHash>,
}

impl RecentHashes {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            hashes: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Record `hash`. Returns `true` if it was already present.
    pub fn check_and_insert(&mut self, hash: &BlockHash) -> bool {
        if !self.hashes.insert(*hash) {
            return true;
        }
        self.order.push_back(*hash);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.hashes.remove(&evicted);
            }
        }
        false
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.hashes.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> BlockHash {
        BlockHash::new([b; 32])
    }

    #[test]
    fn second_insert_is_duplicate() {
        let mut recent = RecentHashes::new(8);
        assert!(!recent.check_and_insert(&h(1)));
        assert!(recent.check_and_insert(&h(1)));
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn oldest_is_evicted() {
        let mut recent = RecentHashes::new(2);
        recent.check_and_insert(&h(1));
        recent.check_and_insert(&h(2));
        recent.check_and_insert(&h(3));
        assert!(!recent.contains(&h(1)));
        assert!(recent.contains(&h(2)));
        assert!(recent.contains(&h(3)));
    }
}
