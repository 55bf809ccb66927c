use serde::{Deserialize, Serialize};

/// Lifecycle states for one voice session.
///
/// `Failed` and a user-initiated stop both pass through `Closing` before
/// settling on `Closed`; all resources are released by then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    RequestingPermission,
    AcquiringLocation,
    Connecting,
    Live,
    Closing,
    Closed,
    Failed(String),
}

impl SessionState {
    /// Short human-readable status line for the UI.
    pub fn status_line(&self) -> String {
        match self {
            SessionState::Idle => "Idle".to_string(),
            SessionState::RequestingPermission => "Requesting permissions…".to_string(),
            SessionState::AcquiringLocation => "Getting your location…".to_string(),
            SessionState::Connecting => "Connecting…".to_string(),
            SessionState::Live => "Live".to_string(),
            SessionState::Closing => "Ending session…".to_string(),
            SessionState::Closed => "Session ended".to_string(),
            SessionState::Failed(reason) => format!("Error: {}", reason),
        }
    }

    /// Whether the session has fully released its resources.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

/// A state plus the status line shown to the user; published on the session's
/// watch channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub message: String,
}

impl SessionStatus {
    pub fn from_state(state: SessionState) -> Self {
        let message = state.status_line();
        Self { state, message }
    }
}
