//! Transport collaborator contracts.
//!
//! The remote conversational agent is an opaque service behind a
//! bidirectional channel: the session sends encoded microphone audio and tool
//! results, and receives a stream of tagged events. Concrete transports
//! (WebSocket, WebRTC) live in the embedding application.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio::OutboundChunk;
use crate::error::SessionError;
use crate::transcript::Speaker;

/// Events produced by the transport, consumed exactly once by the session
/// dispatch loop.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Handshake completed; the session may go live.
    Opened,
    /// A streamed fragment of one speaker's utterance.
    PartialTranscript { speaker: Speaker, text: String },
    /// Both speakers' pending fragments form completed turns.
    TurnComplete,
    /// Agent speech: base64-encoded PCM16 at the output sample rate.
    AudioChunk { pcm_base64: String },
    /// The user started speaking over queued agent audio (barge-in).
    Interrupted,
    /// The agent asks the session to run a named local action.
    ToolCallRequest {
        id: String,
        name: String,
        args: Value,
    },
    /// Transport-level runtime error; the session survives unless the
    /// transport itself closes.
    Error { message: String },
    /// The remote side ended the conversation.
    Closed,
}

/// Result payload sent back for a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultPayload {
    pub result: String,
}

/// A tool the remote agent may invoke, declared at connect time.
///
/// The description carries ambient context (dominant local vibe, nearby alert
/// counts) so the agent can judge when invocation is warranted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments
    pub parameters: Value,
}

/// Connection parameters handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub endpoint: String,
    pub voice: String,
    /// System instructions for the remote agent
    pub instructions: String,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://localhost:8443/live".to_string(),
            voice: "default".to_string(),
            instructions: String::new(),
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            tools: Vec::new(),
        }
    }
}

/// An open bidirectional channel to the remote agent.
#[async_trait::async_trait]
pub trait TransportSession: Send + Sync {
    /// Send one encoded microphone chunk, in capture order.
    async fn send_audio(&self, chunk: OutboundChunk) -> anyhow::Result<()>;

    /// Report the outcome of a tool call under its correlation id.
    async fn send_tool_result(&self, id: &str, payload: ToolResultPayload) -> anyhow::Result<()>;

    /// Best-effort close; errors are swallowed by implementations.
    async fn close(&self);
}

/// Opens transport sessions.
#[async_trait::async_trait]
pub trait TransportConnector: Send + Sync {
    /// Connect and return the session plus its inbound event stream.
    async fn connect(
        &self,
        config: &TransportConfig,
    ) -> Result<(Arc<dyn TransportSession>, mpsc::Receiver<InboundEvent>), SessionError>;
}
