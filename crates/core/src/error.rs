/// Domain error shared by every crate in the workspace.
///
/// Crate-local error enums (store, ffmpeg, backends) convert into this type
/// at their boundary so that the orchestrator and the HTTP layer deal with a
/// single taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An external collaborator (storyboard generator, shot backend, media
    /// tool) failed or timed out.
    #[error("{stage} failed: {message}")]
    Collaborator { stage: &'static str, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a collaborator failure in the given pipeline stage.
    pub fn collaborator(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Collaborator {
            stage,
            message: message.into(),
        }
    }

    /// Shorthand for a missing job.
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "Job",
            id: id.into(),
        }
    }
}
