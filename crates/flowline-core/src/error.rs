use thiserror::Error;

/// Core error type for Flowline services
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Flow record does not exist in the project
    #[error("Flow not found: {id}")]
    FlowNotFound {
        /// ID of the missing flow
        id: String,
    },

    /// Flow version does not exist
    #[error("Flow version not found: {id}")]
    FlowVersionNotFound {
        /// ID of the missing version (or of the flow when no version exists)
        id: String,
    },

    /// Flow run does not exist in the project
    #[error("Flow run not found: {id}")]
    FlowRunNotFound {
        /// ID of the missing run
        id: String,
    },

    /// Project does not exist
    #[error("Project not found: {id}")]
    ProjectNotFound {
        /// ID of the missing project
        id: String,
    },

    /// The keyed lock could not be acquired in time
    #[error("Timed out after {timeout_ms}ms acquiring lock {key}")]
    LockTimeout {
        /// Lock key
        key: String,
        /// Bound on the wait in milliseconds
        timeout_ms: u64,
    },

    /// Attempt to mutate a LOCKED version in place
    #[error("Flow version is locked: {id}")]
    VersionLocked {
        /// ID of the locked version
        id: String,
    },

    /// Attempt to finish a run twice
    #[error("Flow run already finished: {id}")]
    RunAlreadyFinished {
        /// ID of the run
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// State store error
    #[error("State store error: {0}")]
    StateStore(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Stable code exposed to API clients
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::FlowNotFound { .. }
            | CoreError::FlowVersionNotFound { .. }
            | CoreError::FlowRunNotFound { .. }
            | CoreError::ProjectNotFound { .. } => "ENTITY_NOT_FOUND",
            CoreError::LockTimeout { .. } => "LOCK_TIMEOUT",
            CoreError::VersionLocked { .. } => "FLOW_VERSION_LOCKED",
            CoreError::RunAlreadyFinished { .. } => "FLOW_RUN_ALREADY_FINISHED",
            CoreError::Validation(_) => "VALIDATION",
            CoreError::StateStore(_) => "STATE_STORE",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Other(_) => "UNKNOWN",
        }
    }

    /// Whether this error means the addressed entity does not exist
    pub fn is_not_found(&self) -> bool {
        self.code() == "ENTITY_NOT_FOUND"
    }

    /// Shorthand for a not-found flow
    pub fn flow_not_found(id: impl Into<String>) -> Self {
        CoreError::FlowNotFound { id: id.into() }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}
