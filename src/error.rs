use thiserror::Error;

/// Terminal session errors.
///
/// Every variant here funnels into `SessionState::Failed` and triggers the
/// unconditional closing sequence. Per-chunk and per-tool-call failures are
/// handled at their origin and never surface through this type.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to open transport: {0}")]
    TransportOpen(String),

    #[error("transport closed: {0}")]
    TransportClosed(String),
}

/// Errors raised while acquiring or running the capture device.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no capture device available: {0}")]
    DeviceUnavailable(String),
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => SessionError::PermissionDenied,
            CaptureError::DeviceUnavailable(msg) => SessionError::DeviceUnavailable(msg),
        }
    }
}

/// Failures local to a single tool call.
///
/// These are always converted into a human-readable result string and sent
/// back over the transport; they never abort the session.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("device location unavailable")]
    LocationUnavailable,

    #[error("{0}")]
    Dispatch(String),
}

/// Failures resolving the device's current location.
#[derive(Error, Debug)]
pub enum LocationError {
    #[error("location permission denied")]
    Denied,

    #[error("location request timed out")]
    Timeout,
}
