//! Error types shared by every engine module.
//!
//! Per-asset and per-task failures are recovered where they happen and only
//! show up here so they can be logged with context. Pool construction and
//! component initialisation failures are returned to the caller and stop the
//! engine from starting.

use thiserror::Error;
use uuid::Uuid;

/// The main error type for the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    // ========================================================================
    // Runtime Failures
    // ========================================================================
    /// An asset instance could not be produced or loaded.
    #[error("Failed to load asset {uuid}: {reason}")]
    LoadFailure {
        /// Identity of the definition that was requested
        uuid: Uuid,
        /// What went wrong
        reason: String,
    },

    /// A task panicked while executing.
    #[error("Task {task} faulted: {message}")]
    TaskFault {
        /// Task name and id
        task: String,
        /// Panic payload, when it was a string
        message: String,
    },

    /// A node was mutated while sitting in the delete queue.
    #[error("Lifecycle violation: {0}")]
    LifecycleViolation(String),

    // ========================================================================
    // Startup Failures
    // ========================================================================
    /// The worker pool could not be started with the requested size.
    #[error("Failed to start task pool: {0}")]
    PoolInitFailure(String),

    /// A component refused to initialise.
    #[error("Component {component} failed to initialise: {reason}")]
    ComponentInit {
        /// Name reported by the component
        component: String,
        /// Failure description
        reason: String,
    },

    // ========================================================================
    // Project Errors
    // ========================================================================
    /// No asset definition is registered under this uuid.
    #[error("No asset definition for {0}")]
    MissingDefinition(Uuid),

    /// The project has no scene with this uuid.
    #[error("Unknown scene {0}")]
    UnknownScene(Uuid),

    /// A node id did not resolve to a live node.
    #[error("Unknown scene node")]
    UnknownNode,

    /// The project description is structurally invalid.
    #[error("Invalid project: {0}")]
    InvalidProject(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Shorthand for a [`EngineError::LoadFailure`].
    pub fn load_failure(uuid: Uuid, reason: impl Into<String>) -> Self {
        Self::LoadFailure {
            uuid,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failure_message_names_the_asset() {
        let uuid = Uuid::nil();
        let err = EngineError::load_failure(uuid, "missing file");
        assert_eq!(
            err.to_string(),
            "Failed to load asset 00000000-0000-0000-0000-000000000000: missing file"
        );
    }

    #[test]
    fn io_errors_convert() {
        fn open() -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(EngineError::Io(_))));
    }
}
