pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod transport;

pub use audio::{AudioCaptureSource, AudioFrame, MockCapture, OutboundChunk};
pub use config::{AudioConfig, Config, SessionConfig};
pub use error::{CaptureError, LocationError, SessionError, ToolError};
pub use playback::{AudioSink, PlaybackScheduler, SourceId};
pub use session::{
    SessionDeps, SessionHandle, SessionManager, SessionState, SessionStats, SessionStatus,
    VoiceSession,
};
pub use tools::{
    AlertAck, AlertDispatcher, AlertRequest, AmbientContext, GeoPoint, LocationProvider,
    ReverseGeocoder, SosAlertTool, ToolCallDispatcher, ToolHandler,
};
pub use transcript::{Speaker, TranscriptAssembler, TranscriptLog, TranscriptTurn};
pub use transport::{
    InboundEvent, ToolDeclaration, ToolResultPayload, TransportConfig, TransportConnector,
    TransportSession,
};
