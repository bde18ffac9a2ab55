//! Deploy listener setup

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::app::options::ServerOptions;
use crate::app::state::AppState;
use crate::deploy::session::handle_session;
use crate::errors::DeployError;

/// Bind the listener and start accepting deployments
pub async fn serve(
    options: &ServerOptions,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployError>>, DeployError> {
    let addr = options.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployError::Config(format!("failed to bind {}: {}", addr, e)))?;
    info!("Listening for deployments on {}", listener.local_addr()?);

    Ok(tokio::spawn(accept_loop(listener, state, shutdown_signal)))
}

/// Accept connections until the shutdown signal fires, one session task per
/// connection. Sessions already running are not cancelled.
pub async fn accept_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployError> {
    tokio::pin!(shutdown_signal);

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deploy listener shutting down...");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (mut stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                info!("Accepted connection from {}", peer);
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                }

                let state = state.clone();
                tokio::spawn(async move {
                    let outcome = handle_session(&mut stream, state).await;
                    debug!("Session with {} ended in {:?}", peer, outcome);
                });
            }
        }
    }
}
