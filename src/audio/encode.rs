use super::capture::AudioFrame;

/// A single encoded audio payload bound for the transport.
///
/// Ephemeral: created per frame and handed to the transport immediately,
/// never retained by the session.
#[derive(Debug, Clone)]
pub struct OutboundChunk {
    /// Little-endian 16-bit signed PCM bytes
    pub bytes: Vec<u8>,
    /// Sample rate of the encoded samples, passed as a format hint
    pub sample_rate: u32,
}

/// Convert a normalized float frame into the PCM16 wire format.
///
/// Each sample maps by `round(s * 32767)` clamped to the i16 range. The
/// conversion is stateless, so it can be unit tested without a device.
pub fn encode_frame(frame: &AudioFrame) -> OutboundChunk {
    let mut bytes = Vec::with_capacity(frame.samples.len() * 2);
    for &sample in &frame.samples {
        bytes.extend_from_slice(&encode_sample(sample).to_le_bytes());
    }

    OutboundChunk {
        bytes,
        sample_rate: frame.sample_rate,
    }
}

/// Encode one normalized sample to PCM16.
pub fn encode_sample(sample: f32) -> i16 {
    let scaled = (sample * 32767.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Decode little-endian PCM16 bytes back to normalized floats.
///
/// Inverse of `encode_frame`; used by playback on inbound agent audio. A
/// trailing odd byte is ignored.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32767.0)
        .collect()
}
