//! Version cycle state machine.
//!
//! ```text
//! AwaitingData --(barrier released)--> Loading --(load done)--> ReadyForQuery
//!      ^                                  |                          |
//!      +-------(not ready yet)------------+                          |
//!      +-----------------(next fragment or announcement)-------------+
//! ```
//!
//! Loads are best effort: a failed load is logged and the cycle still
//! advances, so one bad version never wedges the benchmark run.

use crate::bus::{Command, MessageBus};
use crate::config::CyclePolicy;
use crate::core::{CyclePhase, LoadResult, VersionId};
use crate::error::{AdapterError, Result};
use crate::loader::VersionLoader;
use crate::reception::{CycleReception, ReceptionBarrier, StagingArea};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSnapshot {
    /// Version the next completed cycle will be loaded as.
    pub version: VersionId,
    pub phase: CyclePhase,
    /// Set once the machine first reaches `ReadyForQuery`; never cleared.
    pub queries_allowed: bool,
    /// The controller announced that no further loading phase follows.
    pub last_phase_seen: bool,
    pub loaded_versions: u32,
    pub failed_loads: u32,
}

/// What one call to `on_generation_finished` did.
#[derive(Debug)]
pub struct CycleOutcome {
    pub version: VersionId,
    pub reception: CycleReception,
    pub load: Result<LoadResult>,
    pub phase: CyclePhase,
}

pub struct VersionCycle {
    policy: CyclePolicy,
    barrier: Arc<ReceptionBarrier>,
    staging: Arc<StagingArea>,
    loader: Arc<dyn VersionLoader>,
    bus: Arc<dyn MessageBus>,
    state: Mutex<CycleSnapshot>,
    /// Serializes announcements so each cycle is waited for exactly once.
    cycle_lock: Mutex<()>,
}

impl VersionCycle {
    pub fn new(
        policy: CyclePolicy,
        barrier: Arc<ReceptionBarrier>,
        staging: Arc<StagingArea>,
        loader: Arc<dyn VersionLoader>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            policy,
            barrier,
            staging,
            loader,
            bus,
            state: Mutex::new(CycleSnapshot::default()),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> CyclePolicy {
        self.policy
    }

    pub fn snapshot(&self) -> CycleSnapshot {
        *self.state.lock().unwrap()
    }

    pub fn current_version(&self) -> VersionId {
        self.state.lock().unwrap().version
    }

    /// A fragment of the next cycle was staged.
    pub fn note_fragment(&self) {
        self.enter_awaiting_data();
    }

    fn enter_awaiting_data(&self) {
        let mut state = self.state.lock().unwrap();
        if state.phase == CyclePhase::ReadyForQuery && !state.last_phase_seen {
            state.phase = CyclePhase::AwaitingData;
        }
    }

    /// Handle `GENERATION_FINISHED`: wait for every announced fragment, load
    /// the version, clear the staging area and report upstream.
    pub fn on_generation_finished(&self, count: u64, is_last_phase: bool) -> Result<CycleOutcome> {
        let _cycle = self.cycle_lock.lock().unwrap();
        if self.state.lock().unwrap().last_phase_seen {
            return Err(AdapterError::ProtocolViolation(
                "generation finished after the last loading phase".to_string(),
            ));
        }
        self.enter_awaiting_data();

        let version = self.current_version();
        info!(version, count, is_last_phase, "all data of version announced, waiting for fragments");
        self.barrier.record_expected_increase(count);
        let reception = self.barrier.await_all_received();
        info!(version, received = reception.received, "all fragments received, loading");

        self.state.lock().unwrap().phase = CyclePhase::Loading;
        let load = self.loader.load_version(version, self.staging.dir());
        match &load {
            Ok(result) => info!(
                version,
                records = result.record_count,
                elapsed_millis = result.elapsed_millis,
                "version loaded"
            ),
            Err(e) => error!(version, error = %e, kind = e.kind(), "version load failed, advancing anyway"),
        }

        // Staged files go before the upstream signal so the next cycle's
        // fragments cannot be purged along with this one's.
        if let Err(e) = self.staging.purge() {
            warn!(version, error = %e, "could not clear staging area");
        }

        let phase = {
            let mut state = self.state.lock().unwrap();
            state.version += 1;
            state.last_phase_seen = is_last_phase;
            if load.is_ok() {
                state.loaded_versions += 1;
            } else {
                state.failed_loads += 1;
            }
            let ready = match self.policy {
                CyclePolicy::Immediate => load.is_ok() || state.queries_allowed,
                CyclePolicy::AfterLastPhase => is_last_phase,
            };
            state.phase = if ready { CyclePhase::ReadyForQuery } else { CyclePhase::AwaitingData };
            state.queries_allowed |= ready;
            state.phase
        };

        info!(version, %phase, "signalling loading finished");
        if let Err(e) = self.bus.send_command(Command::LoadingFinished) {
            error!(version, error = %e, "could not signal loading finished");
        }

        Ok(CycleOutcome { version, reception, load, phase })
    }

    /// Ingest tasks are only valid while further loading phases may follow.
    pub fn check_ingest_allowed(&self) -> Result<()> {
        if self.state.lock().unwrap().last_phase_seen {
            return Err(AdapterError::ProtocolViolation(
                "ingest task received after the last loading phase".to_string(),
            ));
        }
        Ok(())
    }

    /// Queries need at least one version to have reached `ReadyForQuery`.
    pub fn check_query_allowed(&self) -> Result<()> {
        if !self.state.lock().unwrap().queries_allowed {
            return Err(AdapterError::ProtocolViolation(
                "query task received before any version was loaded".to_string(),
            ));
        }
        Ok(())
    }
}
