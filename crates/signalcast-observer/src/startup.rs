//! Background startup for the dashboard server.
//!
//! [`spawn_observer`] binds the listener eagerly, so a port conflict is
//! reported to the caller, then serves on a background Tokio task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// A running dashboard server.
#[derive(Debug)]
pub struct ObserverHandle {
    /// Address the server is listening on.
    pub addr: SocketAddr,
    /// The serving task. Completes after the shutdown token fires.
    pub task: JoinHandle<()>,
}

/// Bind and spawn the dashboard server on a background task.
///
/// The server runs until `shutdown` is cancelled; await
/// [`ObserverHandle::task`] to wait for in-flight requests to finish.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the address is invalid or in use.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<ObserverHandle, ServerError> {
    let listener = server::bind(config).await?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address: {e}")))?;

    let task = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state, shutdown).await {
            tracing::error!(error = %e, "Dashboard server exited with error");
        }
    });

    tracing::info!(%addr, "Dashboard server listening");

    Ok(ObserverHandle { addr, task })
}
