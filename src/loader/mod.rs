//! Version loader port.
//!
//! The cycle state machine and the ingest task only know this trait; the
//! store itself stays behind whichever binding the configuration selects.

use crate::config::{AdapterConfig, LoaderKind};
use crate::core::{LoadResult, VersionId};
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;

pub mod file_drop;
pub mod ingester;

pub use file_drop::FileDropLoader;
pub use ingester::ExternalIngester;

pub trait VersionLoader: Send + Sync {
    /// Ingest every file of `source_dir` as version `version`.
    fn load_version(&self, version: VersionId, source_dir: &Path) -> Result<LoadResult>;
}

/// Parse a terminal `recordCount,elapsedMillis` line.
///
/// Only a line made of exactly two unsigned integers qualifies, so progress
/// lines that merely contain a comma are ignored.
pub fn parse_result_line(line: &str) -> Option<LoadResult> {
    let (count, millis) = line.trim().split_once(',')?;
    let record_count = count.trim().parse::<u64>().ok()?;
    let elapsed_millis = millis.trim().parse::<u64>().ok()?;
    Some(LoadResult { record_count, elapsed_millis })
}

/// Build the loader binding named by the configuration.
pub fn from_config(config: &AdapterConfig) -> Arc<dyn VersionLoader> {
    match config.loader.kind {
        LoaderKind::Ingester => {
            Arc::new(ExternalIngester::new(config.loader.command.clone(), &config.store_dir))
        }
        LoaderKind::FileDrop => Arc::new(FileDropLoader::new(&config.store_dir)),
    }
}
