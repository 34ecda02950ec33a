//! Bounded readiness polling for externally spawned services.

use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

/// Fixed-backoff retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts, backoff }
    }

    /// Longest time a caller can be kept waiting, ignoring probe latency.
    pub fn budget(&self) -> Duration {
        self.backoff * self.max_attempts.saturating_sub(1)
    }
}

/// Outcome of a retried predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The predicate held on this (1-based) attempt.
    Ready(u32),
    /// The predicate asked to stop retrying.
    Aborted(u32),
    Exhausted,
}

/// Verdict of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Ready,
    Retry,
    Abort,
}

/// Call `attempt` up to `policy.max_attempts` times, sleeping `backoff`
/// between calls. Never sleeps after the last attempt.
pub fn retry_until<F>(policy: RetryPolicy, mut attempt: F) -> Probe
where
    F: FnMut(u32) -> Attempt,
{
    for n in 1..=policy.max_attempts {
        match attempt(n) {
            Attempt::Ready => return Probe::Ready(n),
            Attempt::Abort => return Probe::Aborted(n),
            Attempt::Retry if n < policy.max_attempts => thread::sleep(policy.backoff),
            Attempt::Retry => {}
        }
    }
    Probe::Exhausted
}

/// Whether something accepts TCP connections on `address` right now.
pub fn port_is_open(address: &str, timeout: Duration) -> bool {
    let Ok(addrs) = address.to_socket_addrs() else {
        return false;
    };
    addrs.into_iter().any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
}
