use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RoadmapError {
    #[error("not initialized: run 'roadmap init'")]
    NotInitialized,

    #[error("phase not found: {0}")]
    NotFound(String),

    #[error("phase already exists: {0}")]
    PhaseExists(String),

    #[error("phase '{phase}' is already claimed by '{holder}'")]
    AlreadyClaimed { phase: String, holder: String },

    #[error("phase '{phase}' is blocked by: {}", .waiting_on.join(", "))]
    Blocked {
        phase: String,
        waiting_on: Vec<String>,
    },

    #[error("no unblocked phase is available")]
    NoUnblockedWork,

    #[error("agent '{agent}' does not hold phase '{phase}'")]
    NotOwner { phase: String, agent: String },

    #[error("invalid phase id '{0}': must start with a letter or digit and contain only letters, digits, '.', '_' or '-'")]
    InvalidPhaseId(String),

    #[error("invalid agent id '{0}': must be non-empty and contain no whitespace")]
    InvalidAgentId(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("conflict on phase '{phase}': {reason}")]
    Conflict { phase: String, reason: String },

    #[error("timed out after {waited_ms}ms waiting for lock {path:?}")]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RoadmapError>;

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Another agent got there first or the work is gated. Pick other work.
    Contention,
    /// The caller asked for something that does not exist or is not theirs.
    Caller,
    /// Store corruption, conflicting reports, lock failures. Needs an operator.
    Integrity,
}

impl RoadmapError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RoadmapError::AlreadyClaimed { .. }
            | RoadmapError::Blocked { .. }
            | RoadmapError::NoUnblockedWork => ErrorClass::Contention,
            RoadmapError::NotInitialized
            | RoadmapError::NotFound(_)
            | RoadmapError::PhaseExists(_)
            | RoadmapError::NotOwner { .. }
            | RoadmapError::InvalidPhaseId(_)
            | RoadmapError::InvalidAgentId(_) => ErrorClass::Caller,
            RoadmapError::Parse(_)
            | RoadmapError::Conflict { .. }
            | RoadmapError::LockTimeout { .. }
            | RoadmapError::Io(_)
            | RoadmapError::Yaml(_)
            | RoadmapError::Json(_) => ErrorClass::Integrity,
        }
    }

    /// Short outcome label recorded in the audit log.
    pub fn outcome(&self) -> &'static str {
        match self {
            RoadmapError::NotInitialized => "not_initialized",
            RoadmapError::NotFound(_) => "not_found",
            RoadmapError::PhaseExists(_) => "phase_exists",
            RoadmapError::AlreadyClaimed { .. } => "already_claimed",
            RoadmapError::Blocked { .. } => "blocked",
            RoadmapError::NoUnblockedWork => "no_work",
            RoadmapError::NotOwner { .. } => "not_owner",
            RoadmapError::InvalidPhaseId(_) => "invalid_phase_id",
            RoadmapError::InvalidAgentId(_) => "invalid_agent_id",
            RoadmapError::Parse(_) => "parse_error",
            RoadmapError::Conflict { .. } => "conflict",
            RoadmapError::LockTimeout { .. } => "lock_timeout",
            RoadmapError::Io(_) | RoadmapError::Yaml(_) | RoadmapError::Json(_) => "io_error",
        }
    }
}
