//! Task dispatcher: turns benchmark tasks into result segments.

use crate::bus::MessageBus;
use crate::core::{Task, TaskResult, TaskType, VersionId};
use crate::cycle::VersionCycle;
use crate::endpoint::QueryEndpointManager;
use crate::error::{AdapterError, Result};
use crate::loader::VersionLoader;
use crate::querying::SparqlClient;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Settings the dispatcher reads on every task.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub staging_dir: PathBuf,
    pub store_dir: PathBuf,
    pub query_kind_offset: usize,
    pub warm_endpoint_on_storage_task: bool,
}

pub struct TaskDispatcher {
    settings: DispatchSettings,
    cycle: Arc<VersionCycle>,
    loader: Arc<dyn VersionLoader>,
    endpoint: Arc<QueryEndpointManager>,
    client: SparqlClient,
}

impl TaskDispatcher {
    pub fn new(
        settings: DispatchSettings,
        cycle: Arc<VersionCycle>,
        loader: Arc<dyn VersionLoader>,
        endpoint: Arc<QueryEndpointManager>,
    ) -> Result<Self> {
        let client =
            SparqlClient::new(&endpoint.config().url(), endpoint.config().request_timeout())?;
        Ok(Self { settings, cycle, loader, endpoint, client })
    }

    /// Execute one task and build its result.
    pub fn dispatch(&self, task: &Task) -> Result<TaskResult> {
        let kind = task.kind()?;
        debug!(task_id = %task.task_id, ?kind, "dispatching task");
        match kind {
            TaskType::Ingest => self.ingest(task),
            TaskType::StorageSpace => self.storage_space(task),
            TaskType::Query => self.query(task),
        }
    }

    /// Dispatch and hand the result to evaluation storage. Failures are
    /// logged and nothing is sent for the task.
    pub fn handle(&self, task: &Task, bus: &dyn MessageBus) {
        let started = Instant::now();
        match self.dispatch(task) {
            Ok(result) => {
                info!(
                    task_id = %task.task_id,
                    segments = result.segments.len(),
                    elapsed_millis = started.elapsed().as_millis() as u64,
                    "task executed"
                );
                if let Err(e) = bus.send_result(&result) {
                    error!(task_id = %task.task_id, error = %e, "could not send result to evaluation storage");
                }
            }
            Err(e) => {
                error!(task_id = %task.task_id, kind = e.kind(), error = %e, "task failed");
            }
        }
    }

    fn ingest(&self, task: &Task) -> Result<TaskResult> {
        self.cycle.check_ingest_allowed()?;
        let (version, source_dir) = parse_ingest_payload(&task.payload, &self.settings.staging_dir)?;
        info!(task_id = %task.task_id, version, source = %source_dir.display(), "ingest task");
        let loaded = self.loader.load_version(version, &source_dir)?;
        Ok(TaskResult::new(&task.task_id, TaskType::Ingest)
            .with_field(loaded.record_count)
            .with_field(loaded.elapsed_millis))
    }

    fn storage_space(&self, task: &Task) -> Result<TaskResult> {
        let bytes = directory_size(&self.settings.store_dir)?;
        info!(task_id = %task.task_id, bytes, store = %self.settings.store_dir.display(), "storage space measured");

        if self.settings.warm_endpoint_on_storage_task {
            if let Err(e) = self.endpoint.ensure_started() {
                warn!(error = %e, "could not warm up query endpoint");
            }
        }
        Ok(TaskResult::new(&task.task_id, TaskType::StorageSpace).with_field(bytes))
    }

    fn query(&self, task: &Task) -> Result<TaskResult> {
        self.cycle.check_query_allowed()?;
        let query_kind = query_kind(&task.payload, self.settings.query_kind_offset)?;
        self.endpoint.ensure_started()?;

        let results = self.client.query(&task.payload)?;
        let rows = results.row_count();
        info!(task_id = %task.task_id, query_kind, rows, "query answered");
        Ok(TaskResult::new(&task.task_id, TaskType::Query)
            .with_field(query_kind)
            .with_field(rows)
            .with_bytes(results.to_json_bytes()?))
    }
}

/// Parse `version[:sourceDir]`. A missing directory means the staging area.
pub fn parse_ingest_payload(payload: &str, staging_dir: &Path) -> Result<(VersionId, PathBuf)> {
    let payload = payload.trim();
    let (version, dir) = match payload.split_once(':') {
        Some((version, dir)) => (version, Some(dir.trim())),
        None => (payload, None),
    };
    let version = version.trim().parse::<VersionId>().map_err(|_| {
        AdapterError::ProtocolViolation(format!("malformed ingest payload {:?}", payload))
    })?;
    let dir = match dir {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => staging_dir.to_path_buf(),
    };
    Ok((version, dir))
}

/// The one-character query-kind marker at `offset` of the query text.
pub fn query_kind(query: &str, offset: usize) -> Result<&str> {
    let end = offset.checked_add(1);
    end.and_then(|end| query.get(offset..end)).ok_or_else(|| {
        AdapterError::QueryExecution(format!("query has no kind marker at offset {}", offset))
    })
}

/// Total size in bytes of every regular file below `dir`.
///
/// A directory that does not exist yet has size zero.
pub fn directory_size(dir: &Path) -> Result<u64> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += directory_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ingest_payload() {
        let staging = Path::new("/staging");
        assert_eq!(
            parse_ingest_payload("3:/data/v3", staging).unwrap(),
            (3, PathBuf::from("/data/v3"))
        );
        assert_eq!(parse_ingest_payload("4", staging).unwrap(), (4, PathBuf::from("/staging")));
        assert_eq!(parse_ingest_payload(" 5: ", staging).unwrap(), (5, PathBuf::from("/staging")));
        assert!(matches!(
            parse_ingest_payload("v5:/x", staging),
            Err(AdapterError::ProtocolViolation(_))
        ));
        assert!(parse_ingest_payload("", staging).is_err());
    }

    #[test]
    fn test_query_kind_marker() {
        let query = "#version-materialized2\nSELECT * WHERE { ?s ?p ?o }";
        assert_eq!(query_kind(query, 21).unwrap(), "2");
        assert!(matches!(query_kind("SELECT", 21), Err(AdapterError::QueryExecution(_))));
        // Offsets inside a multi-byte character are rejected, not split.
        assert!(query_kind("é", 1).is_err());
        assert!(matches!(query_kind(query, usize::MAX), Err(AdapterError::QueryExecution(_))));
    }

    #[test]
    fn test_directory_size_recurses() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a"), b"12345").unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("b"), b"123").unwrap();
        assert_eq!(directory_size(tmp.path()).unwrap(), 8);
        assert_eq!(directory_size(&tmp.path().join("missing")).unwrap(), 0);
    }
}
