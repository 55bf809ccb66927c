//! Voice session lifecycle.
//!
//! This module provides the `VoiceSession` state machine that owns:
//! - Microphone capture and outbound audio framing
//! - Inbound playback scheduling and interruption
//! - Transcript assembly and tool-call correlation
//! - The closing sequence that releases every resource exactly once

mod manager;
mod session;
mod state;

pub use manager::SessionManager;
pub use session::{SessionDeps, SessionHandle, SessionStats, VoiceSession};
pub use state::{SessionState, SessionStatus};
