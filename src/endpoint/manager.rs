//! Lifecycle of the query-serving subprocess.

use crate::config::EndpointConfig;
use crate::endpoint::probe::RetryPolicy;
use crate::endpoint::process::ProcessHandle;
use crate::error::{AdapterError, Result};
use crate::store::SourceDescriptor;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Starts the endpoint on demand and keeps at most one instance alive.
///
/// The slot mutex is held for the whole start-and-poll sequence, so
/// overlapping callers wait for the first start instead of spawning twice.
pub struct QueryEndpointManager {
    config: EndpointConfig,
    store_dir: PathBuf,
    current: Mutex<Option<Arc<ProcessHandle>>>,
}

impl QueryEndpointManager {
    pub fn new(config: EndpointConfig, store_dir: impl Into<PathBuf>) -> Self {
        Self { config, store_dir: store_dir.into(), current: Mutex::new(None) }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Source descriptor handed to the endpoint as its last argument.
    pub fn source_descriptor(store_dir: &Path) -> String {
        SourceDescriptor::for_store(store_dir).to_json()
    }

    /// Return the live endpoint, starting it first if needed.
    pub fn ensure_started(&self) -> Result<Arc<ProcessHandle>> {
        let mut current = self.current.lock().unwrap();
        if let Some(handle) = current.as_ref() {
            if handle.is_alive() {
                return Ok(Arc::clone(handle));
            }
            warn!(pid = handle.pid(), "query endpoint died, restarting");
        }
        // The previous handle must be gone before a replacement is spawned.
        if let Some(stale) = current.take() {
            stale.terminate()?;
        }

        let handle = Arc::new(self.spawn()?);
        let policy = RetryPolicy::new(self.config.max_attempts, self.config.backoff());
        if let Err(e) = handle.wait_until_reachable(&self.config.address(), policy) {
            error!(pid = handle.pid(), error = %e, "query endpoint did not come up");
            handle.terminate()?;
            return Err(e);
        }
        *current = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn spawn(&self) -> Result<ProcessHandle> {
        let (program, leading) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| AdapterError::Config("endpoint command is empty".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(leading)
            .arg(Self::source_descriptor(&self.store_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(config_file) = &self.config.config_file {
            command.env(&self.config.config_env_var, config_file);
        }

        let child = command.spawn().map_err(|e| {
            AdapterError::Config(format!("cannot start query endpoint {}: {}", program, e))
        })?;
        info!(pid = child.id(), program = %program, address = %self.config.address(), "query endpoint spawned");
        Ok(ProcessHandle::new(child, program))
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().unwrap().as_ref().is_some_and(|handle| handle.is_alive())
    }

    /// Kill the endpoint if one was started. A no-op otherwise.
    pub fn shutdown(&self) -> Result<()> {
        let handle = self.current.lock().unwrap().take();
        match handle {
            Some(handle) => {
                info!(pid = handle.pid(), uptime_secs = handle.uptime().as_secs(), "stopping query endpoint");
                handle.terminate()
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(command: &[&str], port: u16) -> EndpointConfig {
        EndpointConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            port,
            max_attempts: 3,
            backoff_millis: 10,
            ..EndpointConfig::default()
        }
    }

    #[test]
    fn test_source_descriptor_names_store() {
        let descriptor = QueryEndpointManager::source_descriptor(Path::new("/data/store"));
        let value: serde_json::Value = serde_json::from_str(&descriptor).unwrap();
        assert_eq!(value["sources"][0]["value"], "/data/store");
    }

    #[test]
    fn test_shutdown_without_start_is_noop() {
        let manager = QueryEndpointManager::new(config(&["sparql-endpoint"], 3000), "/tmp");
        manager.shutdown().unwrap();
        manager.shutdown().unwrap();
        assert!(!manager.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreachable_endpoint_times_out() {
        // The shell ignores the appended descriptor and never listens.
        let manager = QueryEndpointManager::new(config(&["sh", "-c", "sleep 30"], 9), "/tmp");
        let err = manager.ensure_started().unwrap_err();
        assert!(matches!(err, AdapterError::EndpointStartTimeout { attempts: 3, .. }));
        assert!(!manager.is_running());
    }

    #[test]
    fn test_missing_program() {
        let manager = QueryEndpointManager::new(config(&["/nonexistent/endpoint"], 3000), "/tmp");
        assert!(matches!(manager.ensure_started(), Err(AdapterError::Config(_))));
    }
}
