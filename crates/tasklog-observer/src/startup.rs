//! Launch the observer server next to the scheduler loops.
//!
//! ```rust,ignore
//! let state = Arc::new(AppState::with_capacity(64));
//! let handle = spawn_observer(&ServerConfig::default(), Arc::clone(&state)).await?;
//! // ... later
//! state.shutdown.trigger();
//! handle.await?;
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the observer listener, then serve it on a background task.
///
/// Binding happens before spawning so a taken port is reported to the
/// caller instead of being logged from inside the task. The task ends once
/// `state.shutdown` fires.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address cannot be bound.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = server::bind(config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(port = config.port, "Observer server spawned on background task");
    Ok(handle)
}
