//! # Versioned Adapter
//!
//! A benchmark system adapter that drives a versioned RDF store through
//! repeated cycles of bulk ingestion followed by query execution.
//!
//! Data generators push version fragments, the benchmark controller
//! announces when a version has been fully sent, and a task generator sends
//! ingestion, storage-space and query tasks. The adapter stages fragments,
//! waits until every announced fragment has arrived, loads the version
//! through an external ingester and answers queries through an external
//! SPARQL endpoint process that it starts on demand.
//!
//! ## Example
//!
//! ```rust
//! use versioned_adapter::reception::ReceptionBarrier;
//!
//! let barrier = ReceptionBarrier::new();
//! barrier.record_fragment_received();
//! barrier.record_expected_increase(1);
//! barrier.await_all_received();
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::new_without_default)]

/// Core data structures shared by every component
pub mod core;

/// Error types and result definitions
pub mod error;

/// Adapter configuration
pub mod config;

/// Wire codec and message bus bindings
pub mod bus;

/// Fragment staging and the reception barrier
pub mod reception;

/// Version loader port and its bindings
pub mod loader;

/// Query endpoint subprocess lifecycle
pub mod endpoint;

/// SPARQL protocol client
pub mod querying;

/// Version cycle state machine
pub mod cycle;

/// Task classification and handling
pub mod dispatch;

pub mod adapter;

/// Snapshot store used by the bundled ingester and endpoint programs
pub mod store;

// Re-export commonly used types
pub use adapter::SystemAdapter;
pub use config::AdapterConfig;
pub use error::{AdapterError, Result};
