//! Ownership of one spawned external process.

use crate::endpoint::probe::{self, Attempt, Probe, RetryPolicy};
use crate::error::{AdapterError, Result};
use std::io::ErrorKind;
use std::process::Child;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);

/// A running child process. The process is killed when the handle drops.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Mutex<Child>,
    pid: u32,
    program: String,
    started_at: Instant,
}

impl ProcessHandle {
    pub fn new(child: Child, program: &str) -> Self {
        let pid = child.id();
        Self { child: Mutex::new(child), pid, program: program.to_string(), started_at: Instant::now() }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.child.lock().unwrap().try_wait(), Ok(None))
    }

    /// Poll `address` until it accepts connections, the process exits, or
    /// the retry budget runs out.
    pub fn wait_until_reachable(&self, address: &str, policy: RetryPolicy) -> Result<u32> {
        let probe = probe::retry_until(policy, |attempt| {
            if probe::port_is_open(address, CONNECT_TIMEOUT) {
                return Attempt::Ready;
            }
            if !self.is_alive() {
                warn!(pid = self.pid, attempt, "process exited before becoming reachable");
                return Attempt::Abort;
            }
            debug!(pid = self.pid, attempt, address, "not reachable yet");
            Attempt::Retry
        });
        match probe {
            Probe::Ready(attempt) => {
                info!(pid = self.pid, address, attempt, "process reachable");
                Ok(attempt)
            }
            Probe::Aborted(attempt) => Err(AdapterError::EndpointStartTimeout {
                address: format!("{} (process exited)", address),
                attempts: attempt,
            }),
            Probe::Exhausted => Err(AdapterError::EndpointStartTimeout {
                address: address.to_string(),
                attempts: policy.max_attempts,
            }),
        }
    }

    /// Kill the process and reap it. Calling this on an exited process is fine.
    pub fn terminate(&self) -> Result<()> {
        let mut child = self.child.lock().unwrap();
        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid = self.pid, %status, "process already exited");
            return Ok(());
        }
        match child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        let status = child.wait()?;
        info!(pid = self.pid, program = %self.program, %status, "process terminated");
        Ok(())
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            warn!(pid = self.pid, error = %e, "could not terminate process on drop");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::process::Command;

    fn sleeper() -> ProcessHandle {
        let child = Command::new("sleep").arg("30").spawn().unwrap();
        ProcessHandle::new(child, "sleep")
    }

    #[test]
    fn test_terminate_kills_and_is_repeatable() {
        let handle = sleeper();
        assert!(handle.is_alive());
        handle.terminate().unwrap();
        assert!(!handle.is_alive());
        handle.terminate().unwrap();
    }

    #[test]
    fn test_reachable_when_port_listens() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = sleeper();
        let attempt = handle
            .wait_until_reachable(&address, RetryPolicy::new(3, Duration::from_millis(10)))
            .unwrap();
        assert_eq!(attempt, 1);
    }

    #[test]
    fn test_exited_process_aborts_wait() {
        let child = Command::new("true").spawn().unwrap();
        let handle = ProcessHandle::new(child, "true");
        std::thread::sleep(Duration::from_millis(100));
        let err = handle
            .wait_until_reachable("127.0.0.1:9", RetryPolicy::new(50, Duration::from_millis(10)))
            .unwrap_err();
        assert!(matches!(err, AdapterError::EndpointStartTimeout { .. }));
    }
}
