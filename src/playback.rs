//! Playback scheduling for inbound agent audio.
//!
//! Chunks arrive as base64 PCM16 and must play gaplessly: each decoded buffer
//! is enqueued at `max(cursor, now)` and the cursor advances by the buffer's
//! duration. A barge-in interruption stops everything in flight and resets
//! the cursor so the next chunk re-anchors to the live clock.

use base64::Engine;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::audio::decode_pcm16;

/// Identifier for a buffer handed to the sink.
pub type SourceId = u64;

/// Output-side audio abstraction: a clock plus a buffer queue.
///
/// The real implementation wraps the platform output device; tests drive the
/// scheduler with a fake clock.
pub trait AudioSink: Send {
    /// Current time on the output clock, in seconds.
    fn now(&self) -> f64;

    /// Enqueue normalized samples to begin playing at `start_at`.
    fn enqueue(&mut self, samples: Vec<f32>, start_at: f64) -> SourceId;

    /// Forcibly stop a previously enqueued buffer, even mid-playback.
    fn stop(&mut self, id: SourceId);
}

impl AudioSink for Box<dyn AudioSink> {
    fn now(&self) -> f64 {
        (**self).now()
    }

    fn enqueue(&mut self, samples: Vec<f32>, start_at: f64) -> SourceId {
        (**self).enqueue(samples, start_at)
    }

    fn stop(&mut self, id: SourceId) {
        (**self).stop(id)
    }
}

/// An actively scheduled buffer and when it will finish.
#[derive(Debug, Clone, Copy)]
struct ScheduledSource {
    ends_at: f64,
}

/// Schedules decoded agent audio for gapless, interruption-aware output.
pub struct PlaybackScheduler<S: AudioSink> {
    sink: S,
    sample_rate: u32,
    /// Next playback start time; 0.0 means re-anchor to the live clock.
    cursor: f64,
    active: HashMap<SourceId, ScheduledSource>,
}

impl<S: AudioSink> PlaybackScheduler<S> {
    pub fn new(sink: S, sample_rate: u32) -> Self {
        Self {
            sink,
            sample_rate,
            cursor: 0.0,
            active: HashMap::new(),
        }
    }

    /// Decode and enqueue one inbound audio chunk.
    ///
    /// A chunk that fails to decode is dropped with a warning; it never
    /// aborts the scheduler or the session.
    pub fn handle_chunk(&mut self, pcm_base64: &str) {
        let bytes = match base64::engine::general_purpose::STANDARD.decode(pcm_base64) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Dropping undecodable audio chunk: {}", e);
                return;
            }
        };

        let samples = decode_pcm16(&bytes);
        if samples.is_empty() {
            warn!("Dropping empty audio chunk ({} bytes)", bytes.len());
            return;
        }

        let duration = samples.len() as f64 / self.sample_rate as f64;
        let now = self.sink.now();
        self.prune_completed(now);

        let start_at = self.cursor.max(now);
        let id = self.sink.enqueue(samples, start_at);
        self.cursor = start_at + duration;
        self.active.insert(
            id,
            ScheduledSource {
                ends_at: self.cursor,
            },
        );

        debug!(
            "Scheduled chunk {} at {:.3}s ({:.3}s long, {} active)",
            id,
            start_at,
            duration,
            self.active.len()
        );
    }

    /// Barge-in: stop every scheduled buffer immediately and reset the cursor
    /// so the next chunk anchors to the live clock instead of a stale future
    /// time.
    pub fn interrupt(&mut self) {
        let stopped = self.active.len();
        for (id, _) in self.active.drain() {
            self.sink.stop(id);
        }
        self.cursor = 0.0;

        if stopped > 0 {
            debug!("Interrupted playback: stopped {} active buffers", stopped);
        }
    }

    /// Full teardown for the closing sequence. Idempotent.
    pub fn reset(&mut self) {
        self.interrupt();
    }

    /// Next playback start time on the output clock.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Number of buffers currently scheduled or playing.
    pub fn active_count(&mut self) -> usize {
        let now = self.sink.now();
        self.prune_completed(now);
        self.active.len()
    }

    fn prune_completed(&mut self, now: f64) {
        self.active.retain(|_, source| source.ends_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeSinkState {
        now: f64,
        next_id: SourceId,
        enqueued: Vec<(SourceId, usize, f64)>,
        stopped: Vec<SourceId>,
    }

    #[derive(Clone, Default)]
    struct FakeSink(Arc<Mutex<FakeSinkState>>);

    impl FakeSink {
        fn set_now(&self, now: f64) {
            self.0.lock().unwrap().now = now;
        }
    }

    impl AudioSink for FakeSink {
        fn now(&self) -> f64 {
            self.0.lock().unwrap().now
        }

        fn enqueue(&mut self, samples: Vec<f32>, start_at: f64) -> SourceId {
            let mut state = self.0.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.enqueued.push((id, samples.len(), start_at));
            id
        }

        fn stop(&mut self, id: SourceId) {
            self.0.lock().unwrap().stopped.push(id);
        }
    }

    fn chunk_b64(samples: usize) -> String {
        let bytes = vec![0u8; samples * 2];
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_cursor_advances_gaplessly() {
        let sink = FakeSink::default();
        sink.set_now(10.0);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), 24000);

        // 24000 samples = 1s at 24kHz
        scheduler.handle_chunk(&chunk_b64(24000));
        assert_eq!(scheduler.cursor(), 11.0);

        scheduler.handle_chunk(&chunk_b64(12000));
        assert_eq!(scheduler.cursor(), 11.5);

        // Second chunk starts back-to-back at the first chunk's end, not at now
        let state = sink.0.lock().unwrap();
        assert_eq!(state.enqueued[0].2, 10.0);
        assert_eq!(state.enqueued[1].2, 11.0);
    }

    #[test]
    fn test_cursor_is_non_decreasing() {
        let sink = FakeSink::default();
        let mut scheduler = PlaybackScheduler::new(sink.clone(), 24000);

        let mut last = scheduler.cursor();
        for i in 0..10 {
            sink.set_now(i as f64 * 0.3);
            scheduler.handle_chunk(&chunk_b64(2400));
            assert!(scheduler.cursor() >= last);
            last = scheduler.cursor();
        }
    }

    #[test]
    fn test_interrupt_stops_all_and_resets_cursor() {
        let sink = FakeSink::default();
        sink.set_now(5.0);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), 24000);

        scheduler.handle_chunk(&chunk_b64(24000));
        scheduler.handle_chunk(&chunk_b64(24000));
        assert_eq!(scheduler.active_count(), 2);

        scheduler.interrupt();

        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.cursor(), 0.0);
        assert_eq!(sink.0.lock().unwrap().stopped.len(), 2);
    }

    #[test]
    fn test_chunk_after_interrupt_anchors_to_live_clock() {
        let sink = FakeSink::default();
        sink.set_now(5.0);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), 24000);

        scheduler.handle_chunk(&chunk_b64(24000 * 10)); // queued well into the future
        scheduler.interrupt();

        sink.set_now(6.0);
        scheduler.handle_chunk(&chunk_b64(24000));

        // Starts at the live clock, not at the stale 15.0s cursor
        let state = sink.0.lock().unwrap();
        assert_eq!(state.enqueued.last().unwrap().2, 6.0);
    }

    #[test]
    fn test_bad_chunk_is_dropped_not_fatal() {
        let sink = FakeSink::default();
        let mut scheduler = PlaybackScheduler::new(sink.clone(), 24000);

        scheduler.handle_chunk("not base64 !!!");
        assert_eq!(scheduler.active_count(), 0);

        // Scheduler still works afterwards
        scheduler.handle_chunk(&chunk_b64(2400));
        assert_eq!(scheduler.active_count(), 1);
    }

    #[test]
    fn test_completed_buffers_leave_active_set() {
        let sink = FakeSink::default();
        sink.set_now(0.0);
        let mut scheduler = PlaybackScheduler::new(sink.clone(), 24000);

        scheduler.handle_chunk(&chunk_b64(24000)); // ends at 1.0
        assert_eq!(scheduler.active_count(), 1);

        sink.set_now(1.5);
        assert_eq!(scheduler.active_count(), 0);
    }
}
