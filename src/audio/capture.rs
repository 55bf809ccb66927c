use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::CaptureError;

/// A fixed-size buffer of normalized mono samples from the microphone.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Normalized samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels (always 1 for capture)
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Frame duration in seconds, derived from sample count and rate.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Microphone capture source.
///
/// Implementations wrap a physical device and exclusively acquire it for the
/// process while open. The frame stream is infinite and non-restartable;
/// `close()` must release the device deterministically and be safe to call
/// more than once.
#[async_trait::async_trait]
pub trait AudioCaptureSource: Send {
    /// Prompt for (or verify) microphone permission.
    ///
    /// Resolves before `open()`; a denial is terminal for the session.
    async fn request_permission(&mut self) -> Result<(), CaptureError>;

    /// Acquire the device and start producing frames.
    ///
    /// Returns a channel receiver that yields frames in capture order.
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing and release the device.
    async fn close(&mut self);

    /// Whether the device is currently held open.
    fn is_capturing(&self) -> bool;

    /// Capture source name for logging.
    fn name(&self) -> &str;
}

/// Scripted capture source for tests: plays back a fixed set of frames,
/// optionally failing the permission or open step.
pub struct MockCapture {
    frames: Vec<AudioFrame>,
    feed: Option<mpsc::Receiver<AudioFrame>>,
    deny_permission: bool,
    no_device: bool,
    capturing: bool,
    opened: Arc<AtomicBool>,
}

impl MockCapture {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            feed: None,
            deny_permission: false,
            no_device: false,
            capturing: false,
            opened: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Capture whose frames the test feeds in while the session runs, instead
    /// of a pre-scripted set.
    pub fn live_feed(capacity: usize) -> (Self, mpsc::Sender<AudioFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let mut capture = Self::new(Vec::new());
        capture.feed = Some(rx);
        (capture, tx)
    }

    /// Shared flag set once `open()` has acquired the device; clone before
    /// handing the capture to a session.
    pub fn opened_flag(&self) -> Arc<AtomicBool> {
        self.opened.clone()
    }

    /// Build a capture that produces `count` frames of `samples_per_frame`
    /// zero samples at the given rate.
    pub fn silence(count: usize, samples_per_frame: usize, sample_rate: u32) -> Self {
        let frame_ms = (samples_per_frame as u64 * 1000) / sample_rate as u64;
        let frames = (0..count)
            .map(|i| AudioFrame {
                samples: vec![0.0; samples_per_frame],
                sample_rate,
                channels: 1,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect();
        Self::new(frames)
    }

    pub fn deny_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }

    pub fn without_device(mut self) -> Self {
        self.no_device = true;
        self
    }
}

#[async_trait::async_trait]
impl AudioCaptureSource for MockCapture {
    async fn request_permission(&mut self) -> Result<(), CaptureError> {
        if self.deny_permission {
            return Err(CaptureError::PermissionDenied);
        }
        Ok(())
    }

    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.no_device {
            return Err(CaptureError::DeviceUnavailable("no input device".into()));
        }

        self.opened.store(true, Ordering::SeqCst);
        self.capturing = true;

        if let Some(rx) = self.feed.take() {
            return Ok(rx);
        }

        let (tx, rx) = mpsc::channel(self.frames.len().max(1));
        for frame in self.frames.drain(..) {
            // Buffered ahead of time; the receiver drains at its own pace.
            let _ = tx.try_send(frame);
        }
        Ok(rx)
    }

    async fn close(&mut self) {
        self.capturing = false;
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "mock"
    }
}
