//! Finite State Machine for one deployment session

use serde::{Deserialize, Serialize};

use crate::errors::FailureKind;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the deployment request
    AwaitMetadata,

    /// Stopping the previous process of the same project
    Preempting,

    /// Waiting for the archive payload
    AwaitArchive,

    /// Materializing the workspace
    Unpacking,

    /// Building and resolving dependencies
    Resolving,

    /// Spawning the process
    Launching,

    /// Sending the result to the client
    Reporting,

    /// Waiting for the launched process to exit
    Supervising,

    /// Session finished
    Closed,

    /// Session aborted
    Failed(FailureKind),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed(_))
    }
}

/// Session event
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Request fully read and validated
    RequestReceived,

    /// No conflicting process remains
    Preempted,

    /// Archive payload received
    ArchiveReceived,

    /// Workspace ready
    Unpacked,

    /// Dependencies resolved
    Resolved,

    /// Process spawned
    Launched { pid: u32 },

    /// Success result delivered
    Reported,

    /// Supervised process exited
    ProcessExited,

    /// A step failed
    Fail { kind: FailureKind, message: String },
}

/// Session FSM
#[derive(Debug, Clone)]
pub struct SessionFsm {
    state: SessionState,
    error: Option<String>,
    pid: Option<u32>,
}

impl SessionFsm {
    /// Create a new FSM waiting for metadata
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitMetadata,
            error: None,
            pid: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Pid reported by the launch step
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: SessionEvent) -> Result<SessionState, String> {
        let new_state = match (self.state, event) {
            (SessionState::AwaitMetadata, SessionEvent::RequestReceived) => SessionState::Preempting,
            (SessionState::Preempting, SessionEvent::Preempted) => SessionState::AwaitArchive,
            (SessionState::AwaitArchive, SessionEvent::ArchiveReceived) => SessionState::Unpacking,
            (SessionState::Unpacking, SessionEvent::Unpacked) => SessionState::Resolving,
            (SessionState::Resolving, SessionEvent::Resolved) => SessionState::Launching,
            (SessionState::Launching, SessionEvent::Launched { pid }) => {
                self.pid = Some(pid);
                SessionState::Reporting
            }
            (SessionState::Reporting, SessionEvent::Reported) => SessionState::Supervising,
            (SessionState::Supervising, SessionEvent::ProcessExited) => SessionState::Closed,

            // Failed absorbs from every non-terminal state
            (state, SessionEvent::Fail { kind, message }) if !state.is_terminal() => {
                self.error = Some(message);
                SessionState::Failed(kind)
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for SessionFsm {
    fn default() -> Self {
        Self::new()
    }
}
