//! Timer and queue fabric backing the agent.
//!
//! [`Timers`] is a registry of named one-shot deadlines multiplexed onto a
//! single sleep in the agent's select loop; setting an existing name
//! replaces it, and clearing the registry on close guarantees no late
//! fires. [`RateLimit`] is a fixed-window counter, [`ThrottledQueue`] a
//! size-bounded FIFO drained in rate-limited batches.
//!
//! All instants are `tokio::time::Instant`, so virtual-time tests can
//! drive every timeout path deterministically.

use std::collections::{HashMap, VecDeque};

use tokio::time::{Duration, Instant};

/// Named one-shot timer registry.
#[derive(Default)]
pub struct Timers {
    deadlines: HashMap<String, Instant>,
}

impl Timers {
    pub fn new() -> Self {
        Timers::default()
    }

    /// Arm a timer. An existing timer under the same name is replaced.
    pub fn set(&mut self, name: impl Into<String>, deadline: Instant) {
        self.deadlines.insert(name.into(), deadline);
    }

    /// Disarm a timer. Returns whether it was pending.
    pub fn cancel(&mut self, name: &str) -> bool {
        self.deadlines.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.deadlines.contains_key(name)
    }

    /// Disarm everything.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<String> {
        let mut expired: Vec<(String, Instant)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(name, deadline)| (name.clone(), *deadline))
            .collect();
        expired.sort_by_key(|(_, deadline)| *deadline);
        for (name, _) in &expired {
            self.deadlines.remove(name);
        }
        expired.into_iter().map(|(name, _)| name).collect()
    }
}

/// Fixed-window counter bounding a quantity per window.
pub struct RateLimit {
    max: usize,
    window: Duration,
    window_start: Instant,
    used: usize,
}

impl RateLimit {
    pub fn new(max: usize, window: Duration) -> Self {
        RateLimit {
            max,
            window,
            window_start: Instant::now(),
            used: 0,
        }
    }

    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.used = 0;
        }
    }

    /// Charge `n` units atomically: either the whole amount fits in the
    /// current window and is recorded, or nothing is.
    pub fn note(&mut self, n: usize, now: Instant) -> bool {
        self.roll(now);
        if self.used + n > self.max {
            return false;
        }
        self.used += n;
        true
    }

    /// Units still available in the current window.
    pub fn remaining(&mut self, now: Instant) -> usize {
        self.roll(now);
        self.max - self.used
    }
}

/// Size-bounded FIFO drained in rate-limited batches.
///
/// Two limits apply on top of the size cap: at most `batch_size` items per
/// [`ThrottledQueue::dequeue_batch`] call, and at most the window budget
/// across calls within one window.
pub struct ThrottledQueue<T> {
    queue: VecDeque<T>,
    max_size: usize,
    batch_size: usize,
    budget: RateLimit,
}

impl<T> ThrottledQueue<T> {
    pub fn new(max_size: usize, batch_size: usize, max_per_window: usize, window: Duration) -> Self {
        ThrottledQueue {
            queue: VecDeque::new(),
            max_size,
            batch_size,
            budget: RateLimit::new(max_per_window, window),
        }
    }

    /// Append an item, dropping the oldest entry when full.
    pub fn enqueue(&mut self, item: T) {
        if self.queue.len() >= self.max_size {
            self.queue.pop_front();
            tracing::debug!("throttled queue full, dropping oldest entry");
        }
        self.queue.push_back(item);
    }

    /// Drain the next batch, bounded by the batch size and the window
    /// budget. May be empty when the budget is exhausted.
    pub fn dequeue_batch(&mut self, now: Instant) -> Vec<T> {
        let n = self
            .batch_size
            .min(self.queue.len())
            .min(self.budget.remaining(now));
        if n == 0 {
            return Vec::new();
        }
        self.budget.note(n, now);
        self.queue.drain(..n).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_replaces_existing_name() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.set("verack", now + Duration::from_secs(1));
        timers.set("verack", now + Duration::from_secs(5));
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn take_expired_returns_in_deadline_order() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.set("b", now + Duration::from_millis(20));
        timers.set("a", now + Duration::from_millis(10));
        timers.set("later", now + Duration::from_secs(10));
        let expired = timers.take_expired(now + Duration::from_millis(50));
        assert_eq!(expired, vec!["a".to_string(), "b".to_string()]);
        assert!(timers.contains("later"));
    }

    #[tokio::test]
    async fn cancel_prevents_expiry() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.set("ping_42", now + Duration::from_millis(10));
        assert!(timers.cancel("ping_42"));
        assert!(!timers.cancel("ping_42"));
        assert!(timers.take_expired(now + Duration::from_secs(1)).is_empty());
    }

    #[tokio::test]
    async fn clear_disarms_everything() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.set("version", now);
        timers.set("verack", now);
        timers.clear();
        assert!(timers.is_empty());
        assert_eq!(timers.next_deadline(), None);
    }

    #[tokio::test]
    async fn rate_limit_charges_atomically() {
        let now = Instant::now();
        let mut limit = RateLimit::new(10, Duration::from_secs(60));
        assert!(limit.note(6, now));
        assert!(!limit.note(5, now));
        // The rejected batch must not consume budget
        assert_eq!(limit.remaining(now), 4);
        assert!(limit.note(4, now));
    }

    #[tokio::test]
    async fn rate_limit_window_resets() {
        let now = Instant::now();
        let mut limit = RateLimit::new(10, Duration::from_secs(60));
        assert!(limit.note(10, now));
        assert!(!limit.note(1, now + Duration::from_secs(59)));
        assert!(limit.note(10, now + Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn queue_drops_oldest_beyond_capacity() {
        let now = Instant::now();
        let mut queue: ThrottledQueue<u32> =
            ThrottledQueue::new(3, 10, 100, Duration::from_secs(60));
        for i in 0..5 {
            queue.enqueue(i);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue_batch(now), vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn queue_batches_respect_both_caps() {
        let now = Instant::now();
        let mut queue: ThrottledQueue<u32> = ThrottledQueue::new(100, 3, 5, Duration::from_secs(60));
        for i in 0..10 {
            queue.enqueue(i);
        }
        assert_eq!(queue.dequeue_batch(now).len(), 3);
        assert_eq!(queue.dequeue_batch(now).len(), 2);
        // Window budget exhausted
        assert!(queue.dequeue_batch(now).is_empty());
        assert_eq!(queue.dequeue_batch(now + Duration::from_secs(60)).len(), 3);
    }
}
