//! Per-connection deployment session

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn, Instrument};

use crate::app::state::AppState;
use crate::deploy::fsm::{SessionEvent, SessionFsm, SessionState};
use crate::deploy::launcher::LaunchedProcess;
use crate::deploy::registry::{ExitFlag, ProcessRecord};
use crate::errors::DeployError;
use crate::models::deployment::{DeploymentRequest, DeploymentResult};
use crate::transport::frame;
use crate::workers::supervisor;

/// Drive one connection from the deployment request to the reported result.
///
/// Returns the state the session reached on this connection; `Supervising`
/// means the process was launched and its supervisor now owns the state
/// machine until the process exits.
pub async fn handle_session<S>(stream: &mut S, state: Arc<AppState>) -> SessionState
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let session_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("session", id = %session_id);
    run(stream, state).instrument(span).await
}

async fn run<S>(stream: &mut S, state: Arc<AppState>) -> SessionState
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = Instant::now();
    let mut fsm = SessionFsm::new();

    let (request, launched, exit) = match deploy(stream, &state, &mut fsm).await {
        Ok(deployed) => deployed,
        Err(e) => {
            error!("Deployment failed in {:?}: {}", fsm.state(), e);
            fail(&mut fsm, &e);

            // Best effort; the client may already be gone
            if let Err(send_err) = frame::send_message(stream, &DeploymentResult::failure(&e)).await {
                debug!("Could not report failure: {}", send_err);
            }
            return fsm.state();
        }
    };

    let LaunchedProcess { pid, child } = launched;
    let identity = request.identity();

    // The process is already registered; it gets a supervisor even if the
    // client never reads the result
    let (handover, session) = oneshot::channel();
    supervisor::spawn(state.registry.clone(), identity.clone(), pid, child, exit, session);

    match frame::send_message(stream, &DeploymentResult::success(pid)).await {
        Ok(()) => {
            transition(&mut fsm, SessionEvent::Reported);
            info!(
                "Deployed {} (pid {}) in {}ms",
                identity,
                pid,
                started.elapsed().as_millis()
            );
        }
        Err(e) => {
            warn!("Deployed {} (pid {}) but could not report it: {}", identity, pid, e);
            fail(&mut fsm, &e);
            return fsm.state();
        }
    }

    let reported = fsm.state();
    if handover.send(fsm).is_err() {
        debug!("Supervisor finished before the session was handed over");
    }
    reported
}

async fn deploy<S>(
    stream: &mut S,
    state: &AppState,
    fsm: &mut SessionFsm,
) -> Result<(DeploymentRequest, LaunchedProcess, ExitFlag), DeployError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request: DeploymentRequest = frame::receive_message(stream, state.max_frame_bytes).await?;
    request.validate()?;
    let identity = request.identity();
    info!(
        "Deployment request for {} (module '{}', entry {}, packed by client in {}ms)",
        identity, request.module_path, request.entry_point, request.archive_time_millis
    );
    transition(fsm, SessionEvent::RequestReceived);

    // Held until the new process is registered, serializing deployments of
    // the same project
    let mut claim = state.registry.claim(&identity).await;
    if let Some(pid) = claim.preempt().await? {
        info!("Replaced previous process {}", pid);
    }
    transition(fsm, SessionEvent::Preempted);

    let receive_started = Instant::now();
    let archive = tokio::time::timeout(
        state.archive_timeout,
        frame::receive_data(stream, state.max_frame_bytes),
    )
    .await
    .map_err(|_| {
        DeployError::Protocol(format!(
            "timed out waiting for the archive after {:?}",
            state.archive_timeout
        ))
    })??;
    info!(
        "Received {} byte archive in {}ms",
        archive.len(),
        receive_started.elapsed().as_millis()
    );
    transition(fsm, SessionEvent::ArchiveReceived);

    let workspace = state.workspace.prepare(&identity, archive).await?;
    transition(fsm, SessionEvent::Unpacked);

    let resolve_started = Instant::now();
    let dependencies = state
        .resolver
        .resolve(workspace.path(), &request.normalized_module_path())
        .await?;
    info!("Resolved dependencies in {}ms", resolve_started.elapsed().as_millis());
    transition(fsm, SessionEvent::Resolved);

    let log_file = state.layout.project_log_file(&identity);
    let launched = state
        .launcher
        .launch(&request, workspace.path(), &dependencies, &log_file)
        .await?;
    let record = ProcessRecord::new(identity, launched.pid);
    let exit = record.exit_flag();
    if let Err(e) = claim.register(record) {
        launched.abort().await;
        return Err(e);
    }
    drop(claim);
    transition(fsm, SessionEvent::Launched { pid: launched.pid });

    Ok((request, launched, exit))
}

fn transition(fsm: &mut SessionFsm, event: SessionEvent) {
    if let Err(e) = fsm.process(event) {
        warn!("{}", e);
    }
}

fn fail(fsm: &mut SessionFsm, err: &DeployError) {
    transition(
        fsm,
        SessionEvent::Fail {
            kind: err.kind(),
            message: err.to_string(),
        },
    );
}
