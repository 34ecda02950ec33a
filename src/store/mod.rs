//! Reference versioned store behind the bundled `version-ingester` and
//! `sparql-endpoint` programs.

pub mod descriptor;
pub mod engine;
pub mod snapshot;

pub use descriptor::{EndpointFileConfig, SourceDescriptor};
pub use engine::SnapshotEngine;
pub use snapshot::{list_snapshots, materialize_version, snapshot_path, version_graph};
