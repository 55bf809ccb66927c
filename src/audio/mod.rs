pub mod capture;
pub mod encode;

pub use capture::{AudioCaptureSource, AudioFrame, MockCapture};
pub use encode::{decode_pcm16, encode_frame, encode_sample, OutboundChunk};
