pub mod manager;
pub mod probe;
pub mod process;

pub use manager::QueryEndpointManager;
pub use probe::{port_is_open, retry_until, Attempt, Probe, RetryPolicy};
pub use process::ProcessHandle;
