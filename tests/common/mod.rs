#![allow(dead_code)] // not every test binary uses every mock

// Mock collaborators shared by the integration tests.
//
// No real device or network is involved anywhere: capture frames are
// scripted, the transport records what the session sends and replays a
// scripted inbound event stream, and location/alert backends are
// programmable fakes.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use haven_voice::{
    AlertAck, AlertDispatcher, AlertRequest, AudioSink, GeoPoint, InboundEvent, LocationError,
    LocationProvider, OutboundChunk, ReverseGeocoder, SessionError, SourceId, ToolResultPayload,
    TransportConfig, TransportConnector, TransportSession,
};

/// Route tracing output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Transport double: records outbound audio and tool results.
#[derive(Default)]
pub struct MockTransport {
    pub sent_bytes: AtomicUsize,
    pub sent_chunks: AtomicUsize,
    pub tool_results: Mutex<Vec<(String, String)>>,
    pub closed: AtomicBool,
    pub fail_sends: AtomicBool,
}

impl MockTransport {
    pub fn results(&self) -> Vec<(String, String)> {
        self.tool_results.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TransportSession for MockTransport {
    async fn send_audio(&self, chunk: OutboundChunk) -> anyhow::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("simulated send failure");
        }
        self.sent_bytes.fetch_add(chunk.bytes.len(), Ordering::SeqCst);
        self.sent_chunks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_tool_result(&self, id: &str, payload: ToolResultPayload) -> anyhow::Result<()> {
        self.tool_results
            .lock()
            .unwrap()
            .push((id.to_string(), payload.result));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector double handing out one prepared transport + event stream.
pub struct MockConnector {
    transport: Arc<MockTransport>,
    events: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    fail: bool,
}

impl MockConnector {
    /// Returns (connector, scripted event sender, transport for inspection).
    pub fn new() -> (Arc<Self>, mpsc::Sender<InboundEvent>, Arc<MockTransport>) {
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(MockTransport::default());
        let connector = Arc::new(Self {
            transport: transport.clone(),
            events: Mutex::new(Some(rx)),
            fail: false,
        });
        (connector, tx, transport)
    }

    /// Whether `connect` has been called.
    pub fn connected(&self) -> bool {
        self.events.lock().unwrap().is_none()
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            transport: Arc::new(MockTransport::default()),
            events: Mutex::new(None),
            fail: true,
        })
    }
}

#[async_trait::async_trait]
impl TransportConnector for MockConnector {
    async fn connect(
        &self,
        _config: &TransportConfig,
    ) -> Result<(Arc<dyn TransportSession>, mpsc::Receiver<InboundEvent>), SessionError> {
        if self.fail {
            return Err(SessionError::TransportOpen("connection refused".into()));
        }
        let events = self
            .events
            .lock()
            .unwrap()
            .take()
            .expect("mock connector supports a single connect");
        Ok((self.transport.clone(), events))
    }
}

/// Location double with three behaviors: fix, denial, or hang-until-timeout.
pub enum MockLocation {
    Fix(GeoPoint),
    Denied,
    Hangs,
}

#[async_trait::async_trait]
impl LocationProvider for MockLocation {
    async fn current_location(&self, timeout: Duration) -> Result<GeoPoint, LocationError> {
        match self {
            MockLocation::Fix(point) => Ok(*point),
            MockLocation::Denied => Err(LocationError::Denied),
            MockLocation::Hangs => {
                tokio::time::sleep(timeout + Duration::from_secs(60)).await;
                Err(LocationError::Timeout)
            }
        }
    }
}

/// Alert backend double recording submissions.
#[derive(Default)]
pub struct MockAlerts {
    pub submitted: Mutex<Vec<AlertRequest>>,
    pub fail: AtomicBool,
}

#[async_trait::async_trait]
impl AlertDispatcher for MockAlerts {
    async fn submit(&self, alert: AlertRequest) -> anyhow::Result<AlertAck> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("alert backend unavailable");
        }
        self.submitted.lock().unwrap().push(alert);
        Ok(AlertAck {
            alert_id: "alert-1".to_string(),
        })
    }
}

/// Geocoder double returning a fixed address.
pub struct MockGeocoder(pub String);

#[async_trait::async_trait]
impl ReverseGeocoder for MockGeocoder {
    async fn lookup(&self, _point: GeoPoint) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

/// Output sink double with a manually advanced clock.
#[derive(Default)]
pub struct SharedSinkState {
    pub now: f64,
    pub next_id: SourceId,
    pub enqueued: Vec<(SourceId, f64)>,
    pub stopped: Vec<SourceId>,
}

#[derive(Clone, Default)]
pub struct SharedSink(pub Arc<Mutex<SharedSinkState>>);

impl AudioSink for SharedSink {
    fn now(&self) -> f64 {
        self.0.lock().unwrap().now
    }

    fn enqueue(&mut self, _samples: Vec<f32>, start_at: f64) -> SourceId {
        let mut state = self.0.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.enqueued.push((id, start_at));
        id
    }

    fn stop(&mut self, id: SourceId) {
        self.0.lock().unwrap().stopped.push(id);
    }
}

/// base64-encode `samples` PCM16 zero samples, the inbound chunk format.
pub fn pcm_chunk_b64(samples: usize) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(vec![0u8; samples * 2])
}
