use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{SessionState, SessionStatus};
use crate::audio::{encode_frame, AudioCaptureSource, AudioFrame};
use crate::config::Config;
use crate::error::SessionError;
use crate::playback::{AudioSink, PlaybackScheduler};
use crate::tools::{
    AlertDispatcher, AmbientContext, LocationProvider, ReverseGeocoder, SosAlertTool,
    ToolCallDispatcher,
};
use crate::transcript::{TranscriptAssembler, TranscriptLog, TranscriptTurn};
use crate::transport::{InboundEvent, TransportConnector, TransportSession};

/// Collaborators injected by the embedding application.
///
/// The microphone, the output sink and the scheduled-buffer set are owned
/// exclusively by the one session built from these; nothing here is a
/// process-wide singleton.
pub struct SessionDeps {
    pub capture: Box<dyn AudioCaptureSource>,
    pub sink: Box<dyn AudioSink>,
    pub connector: Arc<dyn TransportConnector>,
    pub location: Arc<dyn LocationProvider>,
    pub alerts: Arc<dyn AlertDispatcher>,
    pub geocoder: Option<Arc<dyn ReverseGeocoder>>,
    pub ambient: AmbientContext,
}

/// Counters shared between the session task and its handle.
#[derive(Default)]
struct SessionCounters {
    frames_captured: AtomicUsize,
    bytes_encoded: AtomicUsize,
    bytes_sent: AtomicUsize,
}

/// Snapshot of session statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub is_live: bool,
    pub started_at: DateTime<Utc>,
    pub frames_captured: usize,
    pub bytes_encoded: usize,
    pub bytes_sent: usize,
    pub transcript_turns: usize,
}

/// Both producers (capture callback, transport callback) feed this single
/// ordered queue; one dispatch loop consumes it, which keeps event handling
/// deterministic.
enum SessionEvent {
    Frame(AudioFrame),
    Inbound(InboundEvent),
}

/// Why the live loop ended without a terminal error.
enum EndReason {
    Stopped,
    RemoteClosed,
}

/// Caller-facing handle to a running session.
///
/// Observed through the status stream and the append-only transcript log;
/// controlled through `stop()`.
pub struct SessionHandle {
    session_id: String,
    status_rx: watch::Receiver<SessionStatus>,
    transcript: TranscriptLog,
    counters: Arc<SessionCounters>,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stream of `SessionStatus` updates, starting from the current one.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    pub fn state(&self) -> SessionState {
        self.status_rx.borrow().state.clone()
    }

    /// Snapshot of the append-only transcript log.
    pub fn transcript(&self) -> Vec<TranscriptTurn> {
        self.transcript.lock().unwrap().clone()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            is_live: self.state() == SessionState::Live,
            started_at: self.started_at,
            frames_captured: self.counters.frames_captured.load(Ordering::SeqCst),
            bytes_encoded: self.counters.bytes_encoded.load(Ordering::SeqCst),
            bytes_sent: self.counters.bytes_sent.load(Ordering::SeqCst),
            transcript_turns: self.transcript.lock().unwrap().len(),
        }
    }

    /// Cancel any pending wait (permission, location, handshake) and drive
    /// the session through `Closing` to `Closed`. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Session task panicked: {}", e);
            }
        }
    }

    /// Wait until the session reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.status_rx.clone();
        let _ = rx.wait_for(|status| status.state.is_terminal()).await;
    }
}

/// The live voice session engine: owns microphone capture, outbound framing,
/// inbound playback scheduling, transcript assembly and tool-call
/// correlation for one conversation.
pub struct VoiceSession {
    config: Config,
    capture: Box<dyn AudioCaptureSource>,
    connector: Arc<dyn TransportConnector>,
    location: Arc<dyn LocationProvider>,
    dispatcher: Arc<ToolCallDispatcher>,
    scheduler: PlaybackScheduler<Box<dyn AudioSink>>,
    assembler: TranscriptAssembler,
    transport: Option<Arc<dyn TransportSession>>,
    pumps: Vec<JoinHandle<()>>,
    counters: Arc<SessionCounters>,
    status_tx: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
}

impl VoiceSession {
    /// Spawn a session and return its handle.
    ///
    /// The session advances through
    /// `RequestingPermission → AcquiringLocation → Connecting → Live` on its
    /// own task; any terminal error lands in `Failed(reason)` and the
    /// unconditional closing sequence.
    pub fn start(deps: SessionDeps, config: Config) -> SessionHandle {
        let session_id = config.session.session_id.clone();
        let transcript: TranscriptLog = Arc::new(Mutex::new(Vec::new()));
        let counters = Arc::new(SessionCounters::default());
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) =
            watch::channel(SessionStatus::from_state(SessionState::Idle));

        let mut dispatcher = ToolCallDispatcher::new(
            deps.location.clone(),
            config.session.location_timeout(),
        );
        dispatcher.register(Arc::new(SosAlertTool::new(
            deps.alerts,
            deps.geocoder,
            deps.ambient,
        )));

        let session = VoiceSession {
            scheduler: PlaybackScheduler::new(deps.sink, config.audio.output_sample_rate),
            assembler: TranscriptAssembler::new(transcript.clone()),
            capture: deps.capture,
            connector: deps.connector,
            location: deps.location,
            dispatcher: Arc::new(dispatcher),
            transport: None,
            pumps: Vec::new(),
            counters: counters.clone(),
            status_tx,
            cancel: cancel.clone(),
            config,
        };

        info!("Starting voice session {}", session_id);
        let task = tokio::spawn(session.run());

        SessionHandle {
            session_id,
            status_rx,
            transcript,
            counters,
            started_at: Utc::now(),
            cancel,
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    async fn run(mut self) {
        let outcome = self.run_inner().await;

        let failure = match &outcome {
            Err(e) => Some(e.to_string()),
            Ok(EndReason::RemoteClosed) => {
                info!("Session ended by remote");
                None
            }
            Ok(EndReason::Stopped) => None,
        };

        if let Some(reason) = &failure {
            error!("Session failed: {}", reason);
            self.set_state(SessionState::Failed(reason.clone()));
            self.assembler
                .append_notice(&format!("Session failed: {}", reason));
        }

        self.set_state(SessionState::Closing);
        self.shutdown().await;

        // Closed always wins, but a failure keeps its error text visible.
        let status = match failure {
            Some(reason) => SessionStatus {
                state: SessionState::Closed,
                message: format!("Error: {}", reason),
            },
            None => SessionStatus::from_state(SessionState::Closed),
        };
        let _ = self.status_tx.send(status);

        info!("Voice session {} closed", self.config.session.session_id);
    }

    async fn run_inner(&mut self) -> Result<EndReason, SessionError> {
        let cancel = self.cancel.clone();

        self.set_state(SessionState::RequestingPermission);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(EndReason::Stopped),
            res = self.capture.request_permission() => res?,
        }

        // Best-effort location warm-up; expiry or denial is non-fatal.
        self.set_state(SessionState::AcquiringLocation);
        let timeout = self.config.session.location_timeout();
        tokio::select! {
            _ = cancel.cancelled() => return Ok(EndReason::Stopped),
            res = tokio::time::timeout(timeout, self.location.current_location(timeout)) => {
                match res {
                    Ok(Ok(point)) => info!("Location fix: {:.5}, {:.5}", point.lat, point.lng),
                    Ok(Err(e)) => warn!("Proceeding without location: {}", e),
                    Err(_) => warn!("Location request timed out after {:?}", timeout),
                }
            }
        }

        self.set_state(SessionState::Connecting);
        let mut transport_config = self.config.transport.clone();
        transport_config.tools = self.dispatcher.declarations();
        let (transport, events_rx) = tokio::select! {
            _ = cancel.cancelled() => return Ok(EndReason::Stopped),
            res = self.connector.connect(&transport_config) => res?,
        };
        self.transport = Some(transport.clone());

        // Both producers feed the same ordered queue; one dispatch loop
        // consumes it, which keeps event handling deterministic.
        let (queue_tx, mut queue_rx) =
            mpsc::channel(self.config.session.event_queue_depth);
        self.pump_events(events_rx, queue_tx.clone());
        if !self.await_opened(&mut queue_rx).await? {
            return Ok(EndReason::Stopped);
        }

        // The device is acquired only once the conversation can actually
        // start, so no capture frame ever precedes the handshake.
        let frames_rx = tokio::select! {
            _ = cancel.cancelled() => return Ok(EndReason::Stopped),
            res = self.capture.open() => res?,
        };
        info!("Capture open on '{}'", self.capture.name());
        self.pump_frames(frames_rx, queue_tx);

        self.set_state(SessionState::Live);
        self.live_loop(&mut queue_rx, transport).await
    }

    fn pump_frames(
        &mut self,
        mut frames_rx: mpsc::Receiver<AudioFrame>,
        queue_tx: mpsc::Sender<SessionEvent>,
    ) {
        self.pumps.push(tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                if queue_tx.send(SessionEvent::Frame(frame)).await.is_err() {
                    break;
                }
            }
            debug!("Capture pump stopped");
        }));
    }

    fn pump_events(
        &mut self,
        mut events_rx: mpsc::Receiver<InboundEvent>,
        queue_tx: mpsc::Sender<SessionEvent>,
    ) {
        self.pumps.push(tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if queue_tx.send(SessionEvent::Inbound(event)).await.is_err() {
                    break;
                }
            }
            // The transport dropping its stream counts as closure.
            let _ = queue_tx
                .send(SessionEvent::Inbound(InboundEvent::Closed))
                .await;
            debug!("Transport pump stopped");
        }));
    }

    /// Hold in `Connecting` until the transport reports its handshake done.
    ///
    /// Returns `Ok(false)` when the session was stopped while waiting, so the
    /// caller closes without ever acquiring the capture device.
    async fn await_opened(
        &mut self,
        queue_rx: &mut mpsc::Receiver<SessionEvent>,
    ) -> Result<bool, SessionError> {
        let cancel = self.cancel.clone();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                event = queue_rx.recv() => match event {
                    Some(SessionEvent::Inbound(InboundEvent::Opened)) => return Ok(true),
                    Some(SessionEvent::Inbound(InboundEvent::Error { message })) => {
                        return Err(SessionError::TransportOpen(message));
                    }
                    Some(SessionEvent::Inbound(InboundEvent::Closed)) => {
                        return Err(SessionError::TransportOpen("transport closed during handshake".into()));
                    }
                    Some(SessionEvent::Frame(_)) => {
                        // Capture starts after the handshake; nothing to do.
                    }
                    Some(SessionEvent::Inbound(other)) => {
                        debug!("Ignoring {:?} before handshake completion", other);
                    }
                    None => {
                        return Err(SessionError::TransportOpen("event stream ended during handshake".into()));
                    }
                },
            }
        }
    }

    async fn live_loop(
        &mut self,
        queue_rx: &mut mpsc::Receiver<SessionEvent>,
        transport: Arc<dyn TransportSession>,
    ) -> Result<EndReason, SessionError> {
        let cancel = self.cancel.clone();
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Ok(EndReason::Stopped),
                event = queue_rx.recv() => event,
            };

            let Some(event) = event else {
                return Err(SessionError::TransportClosed(
                    "event stream ended unexpectedly".into(),
                ));
            };

            match event {
                SessionEvent::Frame(frame) => self.send_frame(frame, &transport).await,
                SessionEvent::Inbound(inbound) => {
                    if let Some(end) = self.handle_inbound(inbound, &transport) {
                        return end;
                    }
                }
            }
        }
    }

    /// Encode one capture frame and forward it in capture order.
    ///
    /// A send failure surfaces as a status update; the session keeps running
    /// unless the transport itself signals closure.
    async fn send_frame(&mut self, frame: AudioFrame, transport: &Arc<dyn TransportSession>) {
        let chunk = encode_frame(&frame);
        let bytes = chunk.bytes.len();
        self.counters.frames_captured.fetch_add(1, Ordering::SeqCst);
        self.counters.bytes_encoded.fetch_add(bytes, Ordering::SeqCst);

        match transport.send_audio(chunk).await {
            Ok(()) => {
                self.counters.bytes_sent.fetch_add(bytes, Ordering::SeqCst);
            }
            Err(e) => {
                warn!("Failed to send audio chunk: {}", e);
                self.set_message(format!("Transport error: {}", e));
            }
        }
    }

    /// Demultiplex one inbound event. Returns `Some` when the loop must end.
    fn handle_inbound(
        &mut self,
        event: InboundEvent,
        transport: &Arc<dyn TransportSession>,
    ) -> Option<Result<EndReason, SessionError>> {
        match event {
            InboundEvent::Opened => {
                debug!("Duplicate opened event ignored");
                None
            }
            InboundEvent::PartialTranscript { speaker, text } => {
                self.assembler.apply_partial(speaker, &text);
                None
            }
            InboundEvent::TurnComplete => {
                self.assembler.complete_turn();
                None
            }
            InboundEvent::AudioChunk { pcm_base64 } => {
                self.scheduler.handle_chunk(&pcm_base64);
                None
            }
            InboundEvent::Interrupted => {
                self.scheduler.interrupt();
                None
            }
            InboundEvent::ToolCallRequest { id, name, args } => {
                // Handlers run on their own task so a slow external call
                // never blocks audio dispatch.
                let dispatcher = self.dispatcher.clone();
                let transport = transport.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(&id, &name, args, &transport).await;
                });
                None
            }
            InboundEvent::Error { message } => {
                warn!("Transport error event: {}", message);
                self.set_message(format!("Transport error: {}", message));
                None
            }
            InboundEvent::Closed => Some(Ok(EndReason::RemoteClosed)),
        }
    }

    /// The unconditional closing sequence.
    ///
    /// Runs regardless of which state triggered it, and every step releases
    /// through take-style guards, so a second invocation is a no-op rather
    /// than a double release.
    async fn shutdown(&mut self) {
        self.capture.close().await;
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
        self.scheduler.reset();
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        self.assembler.reset();
    }

    fn set_state(&self, state: SessionState) {
        debug!("Session state -> {:?}", state);
        let _ = self.status_tx.send(SessionStatus::from_state(state));
    }

    fn set_message(&self, message: String) {
        self.status_tx.send_modify(|status| status.message = message);
    }
}
