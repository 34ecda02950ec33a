//! In-process bus that records everything sent through it.

use crate::bus::{Command, MessageBus};
use crate::core::TaskResult;
use crate::error::Result;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Sent {
    commands: Vec<Command>,
    results: Vec<TaskResult>,
}

/// Records outgoing commands and results so callers can inspect them.
#[derive(Default)]
pub struct RecordingBus {
    sent: Mutex<Sent>,
    changed: Condvar,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.sent.lock().unwrap().commands.clone()
    }

    pub fn results(&self) -> Vec<TaskResult> {
        self.sent.lock().unwrap().results.clone()
    }

    /// Block until at least `count` commands were sent or `timeout` passes.
    pub fn wait_for_commands(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut sent = self.sent.lock().unwrap();
        while sent.commands.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sent = self.changed.wait_timeout(sent, deadline - now).unwrap().0;
        }
        true
    }
}

impl MessageBus for RecordingBus {
    fn send_command(&self, command: Command) -> Result<()> {
        self.sent.lock().unwrap().commands.push(command);
        self.changed.notify_all();
        Ok(())
    }

    fn send_result(&self, result: &TaskResult) -> Result<()> {
        self.sent.lock().unwrap().results.push(result.clone());
        self.changed.notify_all();
        Ok(())
    }
}
