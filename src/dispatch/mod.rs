pub mod dispatcher;

pub use dispatcher::{directory_size, parse_ingest_payload, query_kind, DispatchSettings, TaskDispatcher};
