use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::session::{SessionDeps, SessionHandle, VoiceSession};
use crate::config::Config;

/// Serializes session ownership for the process.
///
/// The microphone and both audio contexts are exclusive resources, so only
/// one session may be live at a time; starting a new one first fully closes
/// the previous one.
pub struct SessionManager {
    current: Mutex<Option<Arc<SessionHandle>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Start a session, closing any previous one first.
    pub async fn start(&self, deps: SessionDeps, config: Config) -> Arc<SessionHandle> {
        let mut current = self.current.lock().await;

        if let Some(previous) = current.take() {
            info!(
                "Closing previous session {} before starting a new one",
                previous.session_id()
            );
            previous.stop().await;
        }

        let handle = Arc::new(VoiceSession::start(deps, config));
        *current = Some(handle.clone());
        handle
    }

    /// Stop the active session, if any.
    pub async fn stop(&self) {
        if let Some(handle) = self.current.lock().await.take() {
            handle.stop().await;
        }
    }

    /// Handle to the active session, if one exists.
    pub async fn active(&self) -> Option<Arc<SessionHandle>> {
        self.current.lock().await.clone()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
