//! Tool-call dispatch.
//!
//! The remote agent can ask the session to perform named local actions. Each
//! request carries an opaque correlation id, and every id receives exactly
//! one result: success, handler failure, unknown tool and location timeout
//! all funnel into a result string sent back over the transport.

mod sos;

pub use sos::{AmbientContext, SosAlertTool};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{LocationError, ToolError};
use crate::transport::{ToolDeclaration, ToolResultPayload, TransportSession};

/// A device location fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Resolves the device's current location.
#[async_trait::async_trait]
pub trait LocationProvider: Send + Sync {
    /// Get a location fix, giving up after `timeout`.
    async fn current_location(&self, timeout: Duration) -> Result<GeoPoint, LocationError>;
}

/// An emergency alert submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRequest {
    pub details: String,
    pub location: Option<GeoPoint>,
}

/// Acknowledgement from the alert backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertAck {
    pub alert_id: String,
}

/// Submits emergency alerts; how they are persisted or fanned out is the
/// embedding application's concern.
#[async_trait::async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn submit(&self, alert: AlertRequest) -> anyhow::Result<AlertAck>;
}

/// Optional address lookup for context enrichment.
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn lookup(&self, point: GeoPoint) -> anyhow::Result<String>;
}

/// A locally registered tool the agent may invoke.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Natural-language description shown to the remote agent.
    fn description(&self) -> String;

    /// JSON schema of the accepted arguments.
    fn parameters(&self) -> Value;

    /// Run the tool. `location` is absent when the provider timed out or was
    /// denied; handlers must degrade gracefully rather than block.
    async fn execute(&self, args: Value, location: Option<GeoPoint>)
        -> Result<String, ToolError>;
}

/// Matches tool-call requests to registered handlers and reports results
/// back through the same correlation id.
pub struct ToolCallDispatcher {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    location: Arc<dyn LocationProvider>,
    location_timeout: Duration,
}

impl ToolCallDispatcher {
    pub fn new(location: Arc<dyn LocationProvider>, location_timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            location,
            location_timeout,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Declarations for every registered tool, passed to the transport at
    /// connect time.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.handlers
            .values()
            .map(|h| ToolDeclaration {
                name: h.name().to_string(),
                description: h.description(),
                parameters: h.parameters(),
            })
            .collect()
    }

    /// Execute one tool-call request and send exactly one result.
    ///
    /// Never returns an error: every failure path becomes a result string so
    /// the correlation id is always answered.
    pub async fn dispatch(
        &self,
        id: &str,
        name: &str,
        args: Value,
        transport: &Arc<dyn TransportSession>,
    ) {
        let result = match self.handlers.get(name) {
            None => {
                warn!("Tool call for unregistered tool '{}'", name);
                format!("Failed: {}", ToolError::UnknownTool(name.to_string()))
            }
            Some(handler) => {
                let location = self.resolve_location().await;
                match handler.execute(args, location).await {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Tool '{}' failed: {}", name, e);
                        format!("Failed: {}", e)
                    }
                }
            }
        };

        info!("Tool call {} ({}) -> {}", id, name, result);

        if let Err(e) = transport
            .send_tool_result(id, ToolResultPayload { result })
            .await
        {
            error!("Failed to send tool result for call {}: {}", id, e);
        }
    }

    /// Best-effort location fix, bounded both by the provider's own timeout
    /// and a hard outer timeout so a misbehaving provider cannot stall the
    /// call.
    async fn resolve_location(&self) -> Option<GeoPoint> {
        let outer = self.location_timeout + Duration::from_millis(500);
        match tokio::time::timeout(outer, self.location.current_location(self.location_timeout))
            .await
        {
            Ok(Ok(point)) => Some(point),
            Ok(Err(e)) => {
                warn!("Location unavailable for tool call: {}", e);
                None
            }
            Err(_) => {
                warn!("Location provider exceeded its timeout");
                None
            }
        }
    }
}
