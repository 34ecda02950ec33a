pub mod barrier;
pub mod staging;

pub use barrier::{CycleReception, ReceptionBarrier};
pub use staging::{sanitize_file_name, StagingArea};
