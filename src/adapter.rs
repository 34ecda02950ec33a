//! System adapter: wires the reception barrier, version cycle, loader,
//! query endpoint and task dispatcher to the message bus.

use crate::bus::protocol::decode_task_body;
use crate::bus::{BusHandler, Command, DataFragment, MessageBus};
use crate::config::AdapterConfig;
use crate::cycle::{CycleSnapshot, VersionCycle};
use crate::dispatch::{DispatchSettings, TaskDispatcher};
use crate::endpoint::QueryEndpointManager;
use crate::error::Result;
use crate::loader::{self, VersionLoader};
use crate::reception::{ReceptionBarrier, StagingArea};
use std::fs;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct SystemAdapter {
    config: AdapterConfig,
    bus: Arc<dyn MessageBus>,
    barrier: Arc<ReceptionBarrier>,
    staging: Arc<StagingArea>,
    cycle: Arc<VersionCycle>,
    endpoint: Arc<QueryEndpointManager>,
    dispatcher: TaskDispatcher,
}

impl SystemAdapter {
    /// Build an adapter whose loader is chosen by the configuration.
    pub fn new(config: AdapterConfig, bus: Arc<dyn MessageBus>) -> Result<Self> {
        let loader = loader::from_config(&config);
        Self::with_loader(config, bus, loader)
    }

    pub fn with_loader(
        config: AdapterConfig,
        bus: Arc<dyn MessageBus>,
        loader: Arc<dyn VersionLoader>,
    ) -> Result<Self> {
        config.validate()?;
        let barrier = Arc::new(ReceptionBarrier::new());
        let staging = Arc::new(StagingArea::new(&config.staging_dir));
        let cycle = Arc::new(VersionCycle::new(
            config.cycle_policy,
            Arc::clone(&barrier),
            Arc::clone(&staging),
            Arc::clone(&loader),
            Arc::clone(&bus),
        ));
        let endpoint =
            Arc::new(QueryEndpointManager::new(config.endpoint.clone(), &config.store_dir));
        let settings = DispatchSettings {
            staging_dir: config.staging_dir.clone(),
            store_dir: config.store_dir.clone(),
            query_kind_offset: config.query_kind_offset,
            warm_endpoint_on_storage_task: config.warm_endpoint_on_storage_task,
        };
        let dispatcher =
            TaskDispatcher::new(settings, Arc::clone(&cycle), loader, Arc::clone(&endpoint))?;

        Ok(Self { config, bus, barrier, staging, cycle, endpoint, dispatcher })
    }

    /// Create the staging and store directories.
    pub fn init(&self) -> Result<()> {
        self.staging.init()?;
        fs::create_dir_all(&self.config.store_dir)?;
        info!(
            staging = %self.config.staging_dir.display(),
            store = %self.config.store_dir.display(),
            policy = ?self.cycle.policy(),
            "system adapter initialized"
        );
        Ok(())
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        self.cycle.snapshot()
    }

    pub fn endpoint(&self) -> &QueryEndpointManager {
        &self.endpoint
    }

    /// Stop the query endpoint, if one was started.
    pub fn close(&self) -> Result<()> {
        info!("closing system adapter");
        self.endpoint.shutdown()
    }
}

impl BusHandler for SystemAdapter {
    fn receive_generated_data(&self, message: &[u8]) {
        let fragment = match DataFragment::decode(message) {
            Ok(fragment) => fragment,
            Err(e) => {
                error!(error = %e, "dropping malformed data message");
                return;
            }
        };

        self.cycle.note_fragment();
        if fragment.content.is_empty() {
            error!(file = %fragment.file_name, "received data was empty");
        } else if let Err(e) = self.staging.write_fragment(&fragment.file_name, &fragment.content) {
            error!(file = %fragment.file_name, error = %e, "could not stage fragment");
        }
        // Counted even when dropped, so the announced total can still be met.
        self.barrier.record_fragment_received();
    }

    fn receive_command(&self, opcode: u8, payload: &[u8]) {
        match Command::decode(opcode, payload) {
            Ok(Command::GenerationFinished { count, is_last_phase }) => {
                if let Err(e) = self.cycle.on_generation_finished(count as u64, is_last_phase) {
                    error!(error = %e, kind = e.kind(), "generation finished signal rejected");
                }
            }
            Ok(command) => debug!(?command, "ignoring command"),
            Err(e) => warn!(opcode, error = %e, "dropping malformed command"),
        }
    }

    fn receive_generated_task(&self, task_id: &str, body: &[u8]) {
        match decode_task_body(task_id, body) {
            Ok(task) => {
                info!(task_id, task_type = %task.declared_type, "task received");
                self.dispatcher.handle(&task, self.bus.as_ref());
            }
            Err(e) => error!(task_id, error = %e, "dropping malformed task"),
        }
    }
}

impl Drop for SystemAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.endpoint.shutdown() {
            warn!(error = %e, "could not stop query endpoint");
        }
    }
}
