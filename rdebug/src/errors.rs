//! Error types for the deployment server

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for a deployment session and its components
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid deployment request: {0}")]
    InvalidRequest(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Resolution error: {0}")]
    Resolution(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Preemption timed out: {0}")]
    PreemptTimeout(String),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}

/// Coarse failure class carried by a failed session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Protocol,
    InvalidRequest,
    Transport,
    Workspace,
    Build,
    Parse,
    Resolution,
    Launch,
    PreemptTimeout,
    Internal,
}

impl DeployError {
    /// Project the error onto the failure class reported by the session
    pub fn kind(&self) -> FailureKind {
        match self {
            DeployError::Protocol(_) | DeployError::Json(_) => FailureKind::Protocol,
            DeployError::InvalidRequest(_) => FailureKind::InvalidRequest,
            DeployError::Io(_) => FailureKind::Transport,
            DeployError::Workspace(_) | DeployError::Archive(_) => FailureKind::Workspace,
            DeployError::Build(_) => FailureKind::Build,
            DeployError::Parse(_) => FailureKind::Parse,
            DeployError::Resolution(_) => FailureKind::Resolution,
            DeployError::Launch(_) => FailureKind::Launch,
            DeployError::PreemptTimeout(_) => FailureKind::PreemptTimeout,
            DeployError::Config(_) | DeployError::Internal(_) => FailureKind::Internal,
        }
    }
}
