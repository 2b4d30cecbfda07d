use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Remembers recently seen deduplication keys, bounded by both count and
/// age. The oldest key is forgotten first.
#[derive(Debug)]
pub struct DeduplicationWindow {
    capacity: usize,
    ttl: Duration,
    seen: HashMap<String, Instant>,
    order: VecDeque<(String, Instant)>,
}

impl DeduplicationWindow {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Records `key` and returns `true` if it was not already in the window.
    pub fn first_sighting(&mut self, key: &str) -> bool {
        self.first_sighting_at(key, Instant::now())
    }

    pub fn first_sighting_at(&mut self, key: &str, now: Instant) -> bool {
        self.expire(now);

        if self.seen.contains_key(key) {
            return false;
        }

        while self.seen.len() >= self.capacity {
            if !self.evict_oldest() {
                break;
            }
        }

        self.seen.insert(key.to_string(), now);
        self.order.push_back((key.to_string(), now));
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn expire(&mut self, now: Instant) {
        while let Some((_, inserted)) = self.order.front() {
            if now.saturating_duration_since(*inserted) < self.ttl {
                break;
            }
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((key, inserted)) = self.order.pop_front() else {
            return false;
        };
        // Only drop the map entry if it still belongs to this insertion
        if self.seen.get(&key) == Some(&inserted) {
            self.seen.remove(&key);
        }
        true
    }
}
