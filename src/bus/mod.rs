//! Message bus between the adapter and the benchmark components.
//!
//! The adapter core only talks to the bus through [`MessageBus`] (outgoing
//! commands and results) and is driven through [`BusHandler`] (incoming
//! data, commands and tasks). Incoming handlers may be invoked concurrently.

use crate::core::TaskResult;
use crate::error::Result;

pub mod memory;
pub mod mqtt;
pub mod protocol;

pub use memory::RecordingBus;
pub use mqtt::MqttBus;
pub use protocol::{Command, DataFragment};

/// Outgoing side of the bus.
pub trait MessageBus: Send + Sync {
    /// Send a command to the benchmark controller.
    fn send_command(&self, command: Command) -> Result<()>;

    /// Hand a task result to evaluation storage, keyed by its task id.
    fn send_result(&self, result: &TaskResult) -> Result<()>;
}

/// Incoming side of the bus, implemented by the system adapter.
pub trait BusHandler: Send + Sync {
    fn receive_generated_data(&self, message: &[u8]);

    fn receive_command(&self, opcode: u8, payload: &[u8]);

    fn receive_generated_task(&self, task_id: &str, body: &[u8]);
}
