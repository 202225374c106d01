use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum-interval gate keyed by `K`.
///
/// A call is accepted when no accepted call for the same key happened in the
/// last `min_interval`. Rejected calls do not move the window.
#[derive(Debug)]
pub struct Throttle<K> {
    min_interval: Duration,
    last_accepted: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> Throttle<K> {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last_accepted: HashMap::new() }
    }

    pub fn try_acquire(&mut self, key: &K, now: Instant) -> bool {
        match self.last_accepted.get(key) {
            Some(prev) if now.saturating_duration_since(*prev) < self.min_interval => false,
            _ => {
                self.last_accepted.insert(key.clone(), now);
                true
            }
        }
    }

    /// Drop entries older than the window, so the map does not grow forever.
    pub fn prune(&mut self, now: Instant) {
        let window = self.min_interval;
        self.last_accepted
            .retain(|_, prev| now.saturating_duration_since(*prev) < window);
    }

    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_calls_inside_the_window() {
        let mut t = Throttle::new(Duration::from_millis(200));
        let start = Instant::now();
        assert!(t.try_acquire(&1, start));
        assert!(!t.try_acquire(&1, start + Duration::from_millis(150)));
        // il rifiuto non sposta la finestra
        assert!(t.try_acquire(&1, start + Duration::from_millis(200)));
    }

    #[test]
    fn keys_are_independent() {
        let mut t = Throttle::new(Duration::from_millis(200));
        let now = Instant::now();
        assert!(t.try_acquire(&(1, 2), now));
        assert!(t.try_acquire(&(1, 3), now));
        assert!(!t.try_acquire(&(1, 2), now));
    }

    #[test]
    fn prune_removes_stale_entries() {
        let mut t = Throttle::new(Duration::from_millis(200));
        let now = Instant::now();
        t.try_acquire(&"a", now);
        t.prune(now + Duration::from_secs(1));
        assert!(t.is_empty());
    }
}
