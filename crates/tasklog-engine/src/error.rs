//! Error types for the engine binary.

/// Top-level error for the engine binary.
///
/// Each variant wraps a subsystem error so `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: tasklog_core::ConfigError,
    },

    /// A database connection or migration failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: tasklog_db::DbError,
    },

    /// The observer server failed to start.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying startup error.
        #[from]
        source: tasklog_observer::StartupError,
    },

    /// A background task panicked or was cancelled.
    #[error("task {name} failed: {message}")]
    Task {
        /// Which task.
        name: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Installing the log subscriber failed.
    #[error("runtime setup error: {message}")]
    Setup {
        /// Description of the failure.
        message: String,
    },
}
