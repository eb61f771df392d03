//! Round-robin selection across a model's workers.
//!
//! The pool of a model grows and shrinks between calls, so the balancer
//! keeps only a monotonic cursor and reduces it modulo the live count at
//! selection time.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Lock-free round-robin cursor.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    cursor: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next index in `0..count`, or `None` for an empty pool.
    pub fn next(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(idx % count)
    }

    /// Pick the next candidate from a slice.
    pub fn pick<'a, T>(&self, candidates: &'a [T]) -> Option<&'a T> {
        self.next(candidates.len()).map(|idx| &candidates[idx])
    }

    /// Total selections made so far.
    pub fn selections(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_indices() {
        let lb = RoundRobinBalancer::new();

        assert_eq!(lb.next(3), Some(0));
        assert_eq!(lb.next(3), Some(1));
        assert_eq!(lb.next(3), Some(2));
        assert_eq!(lb.next(3), Some(0));
    }

    #[test]
    fn empty_pool_returns_none() {
        let lb = RoundRobinBalancer::new();
        assert_eq!(lb.next(0), None);
        assert_eq!(lb.pick::<u16>(&[]), None);
        assert_eq!(lb.selections(), 0);
    }

    #[test]
    fn pick_does_not_pin_the_newest_worker() {
        let lb = RoundRobinBalancer::new();
        let ports = [11434u16, 11435, 11436];

        let picked: Vec<u16> = (0..6).map(|_| *lb.pick(&ports).unwrap()).collect();
        assert_eq!(picked, vec![11434, 11435, 11436, 11434, 11435, 11436]);
    }

    #[test]
    fn follows_pool_resizes() {
        let lb = RoundRobinBalancer::new();

        assert_eq!(lb.next(2), Some(0));
        assert_eq!(lb.next(2), Some(1));
        // Scale-up to four workers.
        assert_eq!(lb.next(4), Some(2));
        assert_eq!(lb.next(4), Some(3));
        // Scale-down to one.
        assert_eq!(lb.next(1), Some(0));
    }

    #[test]
    fn concurrent_selection_counts_every_call() {
        use std::sync::Arc;
        use std::thread;

        let lb = Arc::new(RoundRobinBalancer::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lb = lb.clone();
                thread::spawn(move || (0..100).map(|_| lb.next(4).unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let all: Vec<usize> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();

        assert_eq!(lb.selections(), 400);
        assert!(all.iter().all(|&idx| idx < 4));
    }
}
