use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transport::TransportConfig;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Per-session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier
    pub session_id: String,

    /// Best-effort geolocation timeout in milliseconds; expiry is non-fatal
    pub location_timeout_ms: u64,

    /// Capacity of the internal session event queue
    pub event_queue_depth: usize,
}

impl SessionConfig {
    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("voice-{}", uuid::Uuid::new_v4()),
            location_timeout_ms: 5000,
            event_queue_depth: 256,
        }
    }
}

/// Audio format settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Microphone capture rate (the remote agent expects 16kHz mono)
    pub input_sample_rate: u32,

    /// Agent speech arrives at this rate
    pub output_sample_rate: u32,

    /// Capture frame size in milliseconds
    pub frame_duration_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_duration_ms: 100,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
