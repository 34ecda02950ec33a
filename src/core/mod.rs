//! Core data structures for the versioned benchmark adapter

use crate::error::{AdapterError, Result};
use std::fmt;

/// Identifier of a dataset version. Strictly increasing, starting at 0.
pub type VersionId = u32;

/// Phase of the current version cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclePhase {
    /// Fragments of the current version are being received.
    #[default]
    AwaitingData,
    /// The current version is being ingested into the store.
    Loading,
    /// At least one version is loaded and queries may run.
    ReadyForQuery,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::AwaitingData => write!(f, "awaiting-data"),
            CyclePhase::Loading => write!(f, "loading"),
            CyclePhase::ReadyForQuery => write!(f, "ready-for-query"),
        }
    }
}

/// Outcome of loading a version into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadResult {
    pub record_count: u64,
    pub elapsed_millis: u64,
}

/// The kinds of benchmark task, tagged on the wire as "1", "2" and "3".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Ingest,
    StorageSpace,
    Query,
}

impl TaskType {
    /// Parse the declared wire tag of a task.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim() {
            "1" => Ok(TaskType::Ingest),
            "2" => Ok(TaskType::StorageSpace),
            "3" => Ok(TaskType::Query),
            other => Err(AdapterError::UnknownTaskType(other.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            TaskType::Ingest => "1",
            TaskType::StorageSpace => "2",
            TaskType::Query => "3",
        }
    }
}

/// A benchmark task as delivered by the task generator.
///
/// The declared type is kept verbatim so that classification, and the
/// rejection of unknown kinds, happens in the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub task_id: String,
    pub declared_type: String,
    pub payload: String,
}

impl Task {
    pub fn new(task_id: &str, declared_type: &str, payload: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            declared_type: declared_type.to_string(),
            payload: payload.to_string(),
        }
    }

    pub fn kind(&self) -> Result<TaskType> {
        TaskType::from_tag(&self.declared_type)
    }
}

/// Result of a task: ordered opaque segments, the first being the type tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub task_id: String,
    pub segments: Vec<Vec<u8>>,
}

impl TaskResult {
    pub fn new(task_id: &str, task_type: TaskType) -> Self {
        Self { task_id: task_id.to_string(), segments: vec![task_type.tag().as_bytes().to_vec()] }
    }

    /// Append a textual field.
    pub fn with_field(mut self, value: impl fmt::Display) -> Self {
        self.segments.push(value.to_string().into_bytes());
        self
    }

    /// Append a raw byte field.
    pub fn with_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.segments.push(bytes);
        self
    }

    /// Segment `index` decoded as UTF-8, if present.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.segments.get(index).and_then(|s| std::str::from_utf8(s).ok())
    }
}
