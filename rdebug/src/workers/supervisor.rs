//! Supervisor worker watching one launched process

use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use crate::deploy::fsm::{SessionEvent, SessionFsm, SessionState};
use crate::deploy::registry::{ExitFlag, ProcessRegistry};
use crate::models::deployment::ProjectIdentity;

/// Spawn a detached task that waits for `child` to exit and clears its
/// registry slot.
///
/// The task belongs to the process, not the connection that launched it.
/// Once the session has reported, it hands its state machine over through
/// `session` so the exit closes it.
pub fn spawn(
    registry: Arc<ProcessRegistry>,
    identity: ProjectIdentity,
    pid: u32,
    child: Child,
    exit: ExitFlag,
    session: oneshot::Receiver<SessionFsm>,
) -> JoinHandle<Option<SessionState>> {
    let span = tracing::info_span!("supervisor", project = %identity, pid);
    tokio::spawn(run(registry, identity, pid, child, exit, session).instrument(span))
}

/// Wait for the process, report its exit to the registry and close the
/// session. Returns the session's final state if it was handed over.
pub async fn run(
    registry: Arc<ProcessRegistry>,
    identity: ProjectIdentity,
    pid: u32,
    mut child: Child,
    exit: ExitFlag,
    session: oneshot::Receiver<SessionFsm>,
) -> Option<SessionState> {
    debug!("Supervising process");

    match child.wait().await {
        Ok(status) => info!("Process exited: {}", status),
        Err(e) => error!("Failed to wait for process: {}", e),
    }
    exit.mark();

    if registry.observe_exit(&identity, pid).await {
        debug!("Registry slot released");
    } else {
        debug!("Registry slot already taken by a newer deployment");
    }

    // Dropped sender: the session failed to report and is already terminal
    let mut fsm = session.await.ok()?;
    match fsm.process(SessionEvent::ProcessExited) {
        Ok(state) => {
            debug!("Session {:?}", state);
            Some(state)
        }
        Err(e) => {
            warn!("{}", e);
            Some(fsm.state())
        }
    }
}
