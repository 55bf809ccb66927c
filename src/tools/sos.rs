//! The `sendSOSAlert` tool handler.

use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::{AlertDispatcher, AlertRequest, GeoPoint, ReverseGeocoder, ToolHandler};
use crate::error::ToolError;

/// Ambient context embedded in the tool description so the remote agent can
/// judge when an SOS is warranted.
#[derive(Debug, Clone, Default)]
pub struct AmbientContext {
    /// Dominant local vibe reported by the surrounding app, if any
    pub dominant_vibe: Option<String>,
    /// Number of recent alerts near the user
    pub nearby_alert_count: usize,
}

#[derive(Debug, Deserialize)]
struct SosArgs {
    details: String,
}

/// Dispatches an emergency alert on behalf of the agent.
pub struct SosAlertTool {
    alerts: Arc<dyn AlertDispatcher>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    context: AmbientContext,
}

impl SosAlertTool {
    pub fn new(
        alerts: Arc<dyn AlertDispatcher>,
        geocoder: Option<Arc<dyn ReverseGeocoder>>,
        context: AmbientContext,
    ) -> Self {
        Self {
            alerts,
            geocoder,
            context,
        }
    }

    async fn location_label(&self, point: GeoPoint) -> String {
        if let Some(geocoder) = &self.geocoder {
            match geocoder.lookup(point).await {
                Ok(address) => return address,
                Err(e) => warn!("Reverse geocode failed, falling back to coordinates: {}", e),
            }
        }
        format!("{:.5}, {:.5}", point.lat, point.lng)
    }
}

#[async_trait::async_trait]
impl ToolHandler for SosAlertTool {
    fn name(&self) -> &str {
        "sendSOSAlert"
    }

    fn description(&self) -> String {
        let vibe = self
            .context
            .dominant_vibe
            .as_deref()
            .unwrap_or("unknown");
        format!(
            "Dispatch an emergency SOS alert with the user's description and current \
             location. Use this when the user is in danger or asks for emergency help. \
             Ambient context: dominant local vibe is '{}', {} recent alert(s) nearby.",
            vibe, self.context.nearby_alert_count
        )
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "details": {
                    "type": "string",
                    "description": "Short description of the emergency"
                }
            },
            "required": ["details"]
        })
    }

    async fn execute(
        &self,
        args: Value,
        location: Option<GeoPoint>,
    ) -> Result<String, ToolError> {
        let args: SosArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if args.details.trim().is_empty() {
            return Err(ToolError::InvalidArguments("details must not be empty".into()));
        }

        let label = match location {
            Some(point) => Some(self.location_label(point).await),
            None => None,
        };

        let details = match &label {
            Some(label) => format!("{} (near {})", args.details.trim(), label),
            None => args.details.trim().to_string(),
        };

        let ack = self
            .alerts
            .submit(AlertRequest { details, location })
            .await
            .map_err(|e| ToolError::Dispatch(format!("could not submit SOS alert: {}", e)))?;

        info!("SOS alert submitted: {}", ack.alert_id);

        // The alert still goes out without a fix, but the agent is told the
        // location could not be obtained so it can relay that to the user.
        Ok(match label {
            Some(label) => format!("SOS alert sent from near {}.", label),
            None => {
                "SOS alert sent, but the device location could not be obtained.".to_string()
            }
        })
    }
}
