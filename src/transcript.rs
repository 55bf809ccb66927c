//! Turn reconstruction from streamed transcript fragments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Who produced a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Agent,
    /// Session-generated notices (e.g. the failure message appended when a
    /// live session dies). Never produced from streamed fragments.
    System,
}

/// One complete utterance, immutable once appended to the transcript log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    /// When the turn was completed
    pub timestamp: DateTime<Utc>,
}

/// Shared, append-only transcript log for one session.
pub type TranscriptLog = Arc<Mutex<Vec<TranscriptTurn>>>;

/// Accumulates streamed partial-text fragments per speaker and flushes
/// completed turns into the session transcript log.
///
/// Fragments are appended in arrival order, so the assembled turn is
/// deterministic regardless of how finely the remote side fragments text.
pub struct TranscriptAssembler {
    log: TranscriptLog,
    user_buffer: String,
    agent_buffer: String,
}

impl TranscriptAssembler {
    pub fn new(log: TranscriptLog) -> Self {
        Self {
            log,
            user_buffer: String::new(),
            agent_buffer: String::new(),
        }
    }

    /// Append a partial fragment to the speaker's accumulator.
    pub fn apply_partial(&mut self, speaker: Speaker, text: &str) {
        match speaker {
            Speaker::User => self.user_buffer.push_str(text),
            Speaker::Agent => self.agent_buffer.push_str(text),
            Speaker::System => debug!("Ignoring partial fragment for system speaker"),
        }
    }

    /// Flush both accumulators as completed turns, user before agent.
    ///
    /// Whitespace-only accumulators produce no turn. Both accumulators are
    /// reset afterwards.
    pub fn complete_turn(&mut self) {
        let user = std::mem::take(&mut self.user_buffer);
        let agent = std::mem::take(&mut self.agent_buffer);

        let mut log = self.log.lock().unwrap();
        for (speaker, text) in [(Speaker::User, user), (Speaker::Agent, agent)] {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                log.push(TranscriptTurn {
                    speaker,
                    text: trimmed.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Append a session-generated notice directly to the log.
    pub fn append_notice(&self, text: &str) {
        self.log.lock().unwrap().push(TranscriptTurn {
            speaker: Speaker::System,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Clear both accumulators without emitting turns (closing sequence).
    pub fn reset(&mut self) {
        self.user_buffer.clear();
        self.agent_buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> (TranscriptAssembler, TranscriptLog) {
        let log: TranscriptLog = Arc::new(Mutex::new(Vec::new()));
        (TranscriptAssembler::new(log.clone()), log)
    }

    #[test]
    fn test_fragments_assemble_into_one_turn() {
        let (mut asm, log) = assembler();

        asm.apply_partial(Speaker::User, "I");
        asm.apply_partial(Speaker::User, " need");
        asm.apply_partial(Speaker::User, " help");
        asm.complete_turn();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].speaker, Speaker::User);
        assert_eq!(log[0].text, "I need help");
    }

    #[test]
    fn test_user_turn_precedes_agent_turn() {
        let (mut asm, log) = assembler();

        asm.apply_partial(Speaker::Agent, "How can I help?");
        asm.apply_partial(Speaker::User, "Hello");
        asm.complete_turn();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].speaker, Speaker::User);
        assert_eq!(log[1].speaker, Speaker::Agent);
    }

    #[test]
    fn test_whitespace_only_accumulator_emits_nothing() {
        let (mut asm, log) = assembler();

        asm.apply_partial(Speaker::User, "  \n ");
        asm.complete_turn();

        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_accumulators_reset_between_turns() {
        let (mut asm, log) = assembler();

        asm.apply_partial(Speaker::User, "first");
        asm.complete_turn();
        asm.apply_partial(Speaker::User, "second");
        asm.complete_turn();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].text, "first");
        assert_eq!(log[1].text, "second");
    }

    #[test]
    fn test_reset_discards_pending_fragments() {
        let (mut asm, log) = assembler();

        asm.apply_partial(Speaker::Agent, "half a sent");
        asm.reset();
        asm.complete_turn();

        assert!(log.lock().unwrap().is_empty());
    }
}
