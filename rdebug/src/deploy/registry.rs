//! Registry of supervised processes, one slot per project identity.
//!
//! A session claims the slot for its identity before touching the old
//! deployment and keeps the claim until the new process is registered, so
//! deployments of one project are serialized while different projects proceed
//! in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as SlotMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::deploy::proctable::{ProcessTable, SystemProcessTable};
use crate::errors::DeployError;
use crate::models::deployment::ProjectIdentity;
use crate::storage::settings::PreemptSettings;

/// Timings used when replacing a running process
#[derive(Debug, Clone)]
pub struct PreemptPolicy {
    pub graceful_timeout: Duration,
    pub kill_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for PreemptPolicy {
    fn default() -> Self {
        Self::from(&PreemptSettings::default())
    }
}

impl From<&PreemptSettings> for PreemptPolicy {
    fn from(settings: &PreemptSettings) -> Self {
        Self {
            graceful_timeout: Duration::from_secs(settings.graceful_timeout_secs),
            kill_timeout: Duration::from_secs(settings.kill_timeout_secs),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
        }
    }
}

/// Set once the supervisor has seen the process exit
#[derive(Debug, Clone, Default)]
pub struct ExitFlag(Arc<AtomicBool>);

impl ExitFlag {
    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The process currently holding an identity
#[derive(Debug, Clone)]
pub struct ProcessRecord {
    pub identity: ProjectIdentity,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    exit: ExitFlag,
}

impl ProcessRecord {
    pub fn new(identity: ProjectIdentity, pid: u32) -> Self {
        Self {
            identity,
            pid,
            started_at: Utc::now(),
            exit: ExitFlag::default(),
        }
    }

    /// Flag shared with whoever waits on the process
    pub fn exit_flag(&self) -> ExitFlag {
        self.exit.clone()
    }

    pub fn exit_observed(&self) -> bool {
        self.exit.is_set()
    }

    fn is_gone(&self, table: &dyn ProcessTable) -> bool {
        self.exit_observed() || !table.is_alive(self.pid)
    }
}

type Slot = Arc<SlotMutex<Option<ProcessRecord>>>;

/// Process-wide registry shared by all sessions
pub struct ProcessRegistry {
    slots: Mutex<HashMap<ProjectIdentity, Slot>>,
    policy: PreemptPolicy,
    table: Arc<dyn ProcessTable>,
}

impl ProcessRegistry {
    pub fn new(policy: PreemptPolicy) -> Self {
        Self::with_process_table(policy, Arc::new(SystemProcessTable))
    }

    /// Registry checking and signalling processes through `table`
    pub fn with_process_table(policy: PreemptPolicy, table: Arc<dyn ProcessTable>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            policy,
            table,
        }
    }

    fn slot(&self, identity: &ProjectIdentity) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(identity.clone()).or_default().clone()
    }

    fn all_slots(&self) -> Vec<(ProjectIdentity, Slot)> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .iter()
            .map(|(identity, slot)| (identity.clone(), slot.clone()))
            .collect()
    }

    /// Take exclusive ownership of the identity's slot, waiting for any
    /// other session deploying the same project
    pub async fn claim(&self, identity: &ProjectIdentity) -> SlotClaim {
        let guard = self.slot(identity).lock_owned().await;
        SlotClaim {
            identity: identity.clone(),
            guard,
            policy: self.policy.clone(),
            table: self.table.clone(),
        }
    }

    /// Claim the slot and stop whatever runs there
    pub async fn preempt(&self, identity: &ProjectIdentity) -> Result<Option<u32>, DeployError> {
        self.claim(identity).await.preempt().await
    }

    /// Forget a process that exited on its own.
    ///
    /// Only clears the slot if it still refers to `pid`; a newer deployment
    /// may already have replaced it.
    pub async fn observe_exit(&self, identity: &ProjectIdentity, pid: u32) -> bool {
        let mut slot = self.slot(identity).lock_owned().await;
        if !slot.as_ref().is_some_and(|record| record.pid == pid) {
            return false;
        }

        if let Some(record) = slot.take() {
            record.exit.mark();
        }
        debug!("Cleared registry slot of {} (pid {})", identity, pid);
        true
    }

    /// Pid registered for an identity, if any
    pub async fn current_pid(&self, identity: &ProjectIdentity) -> Option<u32> {
        let slot = self.slot(identity);
        let guard = slot.lock().await;
        guard.as_ref().map(|record| record.pid)
    }

    /// Registered processes, sorted by identity
    pub async fn snapshot(&self) -> Vec<(ProjectIdentity, u32)> {
        let mut records = Vec::new();
        for (identity, slot) in self.all_slots() {
            if let Some(record) = slot.lock().await.as_ref() {
                records.push((identity, record.pid));
            }
        }
        records.sort();
        records
    }

    /// Preempt every registered process, returning how many were stopped
    pub async fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for (identity, _) in self.all_slots() {
            match self.preempt(&identity).await {
                Ok(Some(_)) => stopped += 1,
                Ok(None) => {}
                Err(e) => warn!("Failed to stop {}: {}", identity, e),
            }
        }
        stopped
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new(PreemptPolicy::default())
    }
}

/// Exclusive hold on one identity's slot
pub struct SlotClaim {
    identity: ProjectIdentity,
    guard: OwnedMutexGuard<Option<ProcessRecord>>,
    policy: PreemptPolicy,
    table: Arc<dyn ProcessTable>,
}

impl SlotClaim {
    pub fn identity(&self) -> &ProjectIdentity {
        &self.identity
    }

    pub fn current(&self) -> Option<&ProcessRecord> {
        self.guard.as_ref()
    }

    /// Stop the registered process and wait until it has left the process
    /// table. Escalates to a kill after the graceful timeout.
    pub async fn preempt(&mut self) -> Result<Option<u32>, DeployError> {
        let Some(record) = self.guard.as_ref() else {
            return Ok(None);
        };
        let pid = record.pid;
        let table = self.table.as_ref();

        if !record.is_gone(table) {
            info!(
                "Stopping previous deployment of {} (pid {}, started {})",
                self.identity,
                pid,
                record.started_at.format("%Y-%m-%d %H:%M:%S")
            );
            if !table.terminate(pid) {
                debug!("Termination signal to pid {} was not delivered", pid);
            }

            if !wait_until_gone(record, table, self.policy.graceful_timeout, self.policy.poll_interval).await {
                warn!(
                    "Process {} of {} ignored termination for {:?}, killing it",
                    pid, self.identity, self.policy.graceful_timeout
                );
                table.force_kill(pid);

                if !wait_until_gone(record, table, self.policy.kill_timeout, self.policy.poll_interval).await {
                    return Err(DeployError::PreemptTimeout(format!(
                        "process {} of '{}' is still running after being killed",
                        pid, self.identity
                    )));
                }
            }
        }

        *self.guard = None;
        info!("Previous deployment of {} (pid {}) is gone", self.identity, pid);
        Ok(Some(pid))
    }

    /// Store the record of a freshly launched process
    pub fn register(&mut self, record: ProcessRecord) -> Result<(), DeployError> {
        if record.identity != self.identity {
            return Err(DeployError::Internal(format!(
                "record for '{}' registered under '{}'",
                record.identity, self.identity
            )));
        }
        if let Some(existing) = self.guard.as_ref() {
            return Err(DeployError::Internal(format!(
                "'{}' is still held by pid {}",
                self.identity, existing.pid
            )));
        }

        debug!("Registered {} (pid {})", record.identity, record.pid);
        *self.guard = Some(record);
        Ok(())
    }
}

async fn wait_until_gone(
    record: &ProcessRecord,
    table: &dyn ProcessTable,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let started = Instant::now();
    loop {
        if record.is_gone(table) {
            return true;
        }
        if started.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}
