//! Bounded sliding window of recently emitted event IDs (spec §3, §4.6).

use std::collections::{HashSet, VecDeque};

const DEFAULT_CAPACITY: usize = 1000;
const COMPACTION_THRESHOLD: usize = 1024;

/// Call-local deduplication window. Not shared across streaming calls
/// (spec §3 lifecycle: "dedup windows live for the duration of one
/// streaming call").
pub struct DedupWindow {
    queue: VecDeque<String>,
    set: HashSet<String>,
    head: usize,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Pre-seed from persisted recent IDs (spec §4.6: "callers pre-seed it
    /// ... to suppress duplicates introduced by the replay window after a
    /// restart").
    pub fn seeded(capacity: usize, seed: impl IntoIterator<Item = String>) -> Self {
        let mut window = Self::new(capacity);
        for id in seed {
            window.add(id);
        }
        window
    }

    pub fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }

    /// Returns `true` if `id` was newly added, `false` if it was already
    /// present (a no-op in that case).
    pub fn add(&mut self, id: String) -> bool {
        if self.set.contains(&id) {
            return false;
        }
        self.set.insert(id.clone());
        self.queue.push_back(id);

        while self.queue.len() - self.head > self.capacity {
            self.evict_oldest();
        }
        self.maybe_compact();
        true
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.queue.get(self.head).cloned() {
            self.set.remove(&oldest);
            self.head += 1;
        }
    }

    fn maybe_compact(&mut self) {
        if self.head >= COMPACTION_THRESHOLD || self.head * 2 > self.queue.len() {
            self.queue.drain(0..self.head);
            self.head = 0;
        }
    }

    /// Filter `items`, dropping any whose id is already present and adding
    /// survivors to the window (spec §4.7.2 step 5).
    pub fn deduplicate<T>(&mut self, items: Vec<T>, id_of: impl Fn(&T) -> &str) -> Vec<T> {
        items
            .into_iter()
            .filter(|item| self.add(id_of(item).to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Invariant check used by tests: the set and the live portion of the
    /// queue must always agree in size (spec §3 invariant).
    #[cfg(test)]
    fn invariant_holds(&self) -> bool {
        self.set.len() == self.queue.len() - self.head
    }
}
