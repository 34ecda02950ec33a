//! Reception barrier.
//!
//! Counts fragments received against fragments announced for the current
//! cycle and releases the single waiting command handler once they match.
//! The announcement and the last fragment may arrive in either order, on
//! different threads.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counters {
    received: u64,
    expected: u64,
    /// Single-slot release. Setting it twice is the same as setting it once.
    released: bool,
}

impl Counters {
    fn release_if_complete(&mut self) -> bool {
        if self.received == self.expected && !self.released {
            self.released = true;
            return true;
        }
        false
    }
}

/// Summary of a completed cycle, handed to the waiter on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReception {
    pub received: u64,
    pub expected: u64,
}

/// Mutex-guarded counters plus a condition variable for the waiter.
///
/// Counters reset each time a waiter consumes a release, so every cycle
/// starts from zero.
#[derive(Debug, Default)]
pub struct ReceptionBarrier {
    state: Mutex<Counters>,
    signal: Condvar,
}

impl ReceptionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fragment has been written to the staging area.
    pub fn record_fragment_received(&self) {
        let mut state = self.state.lock().unwrap();
        state.received += 1;
        if state.release_if_complete() {
            debug!(received = state.received, "last fragment arrived, releasing barrier");
            self.signal.notify_one();
        }
    }

    /// Generators announced `count` more fragments for this cycle.
    pub fn record_expected_increase(&self, count: u64) {
        let mut state = self.state.lock().unwrap();
        state.expected += count;
        if state.release_if_complete() {
            debug!(expected = state.expected, "all fragments already present, releasing barrier");
            self.signal.notify_one();
        }
    }

    /// Block until the current cycle is complete, then re-arm for the next.
    pub fn await_all_received(&self) -> CycleReception {
        let mut state = self.state.lock().unwrap();
        while !state.released {
            state = self.signal.wait(state).unwrap();
        }
        Self::consume(&mut state)
    }

    /// Like [`await_all_received`](Self::await_all_received) but gives up
    /// after `timeout`, leaving the counters untouched.
    pub fn await_all_received_timeout(&self, timeout: Duration) -> Option<CycleReception> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        while !state.released {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self.signal.wait_timeout(state, deadline - now).unwrap().0;
        }
        Some(Self::consume(&mut state))
    }

    fn consume(state: &mut Counters) -> CycleReception {
        let reception = CycleReception { received: state.received, expected: state.expected };
        if state.received != state.expected {
            warn!(
                received = state.received,
                expected = state.expected,
                "fragments kept arriving after the barrier released"
            );
        }
        *state = Counters::default();
        reception
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_fragments_before_announcement() {
        let barrier = ReceptionBarrier::new();
        barrier.record_fragment_received();
        barrier.record_fragment_received();
        assert!(barrier.await_all_received_timeout(SHORT).is_none());
        barrier.record_expected_increase(2);
        let reception = barrier.await_all_received_timeout(SHORT).unwrap();
        assert_eq!(reception, CycleReception { received: 2, expected: 2 });
    }

    #[test]
    fn test_announcement_before_fragments() {
        let barrier = ReceptionBarrier::new();
        barrier.record_expected_increase(2);
        barrier.record_fragment_received();
        assert!(barrier.await_all_received_timeout(SHORT).is_none());
        barrier.record_fragment_received();
        assert!(barrier.await_all_received_timeout(SHORT).is_some());
    }

    #[test]
    fn test_zero_fragment_announcement_releases() {
        let barrier = ReceptionBarrier::new();
        barrier.record_expected_increase(0);
        assert_eq!(
            barrier.await_all_received_timeout(SHORT),
            Some(CycleReception { received: 0, expected: 0 })
        );
    }

    #[test]
    fn test_release_is_single_slot() {
        let barrier = ReceptionBarrier::new();
        barrier.record_expected_increase(0);
        barrier.record_expected_increase(0);
        assert!(barrier.await_all_received_timeout(SHORT).is_some());
        assert!(barrier.await_all_received_timeout(SHORT).is_none());
    }

    #[test]
    fn test_counters_reset_between_cycles() {
        let barrier = ReceptionBarrier::new();
        barrier.record_expected_increase(1);
        barrier.record_fragment_received();
        assert!(barrier.await_all_received_timeout(SHORT).is_some());

        barrier.record_fragment_received();
        barrier.record_fragment_received();
        barrier.record_expected_increase(2);
        assert_eq!(
            barrier.await_all_received_timeout(SHORT),
            Some(CycleReception { received: 2, expected: 2 })
        );
    }

    #[test]
    fn test_waiter_woken_from_other_thread() {
        let barrier = Arc::new(ReceptionBarrier::new());
        barrier.record_expected_increase(3);
        let producer = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            for _ in 0..3 {
                thread::sleep(Duration::from_millis(5));
                producer.record_fragment_received();
            }
        });
        let reception = barrier.await_all_received();
        assert_eq!(reception.received, 3);
        handle.join().unwrap();
    }
}
