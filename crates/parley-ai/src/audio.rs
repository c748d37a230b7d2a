//! PCM16 audio helpers.
//!
//! Audio crosses every boundary as base64-encoded 16-bit little-endian mono
//! PCM. Durations are derived from the decoded byte length.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::AiError;

const BYTES_PER_SAMPLE: u64 = 2;

/// Decode a base64 PCM16 payload, rejecting empty or odd-length audio.
pub fn decode_pcm16(b64: &str) -> Result<Vec<u8>, AiError> {
    let bytes = STANDARD
        .decode(b64.trim())
        .map_err(|e| AiError::ParseError(format!("invalid base64 audio: {e}")))?;
    if bytes.is_empty() || bytes.len() as u64 % BYTES_PER_SAMPLE != 0 {
        return Err(AiError::ParseError(format!(
            "invalid pcm16 length: {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

pub fn byte_len_duration_ms(len: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    let samples = len as u64 / BYTES_PER_SAMPLE;
    samples * 1000 / u64::from(sample_rate)
}

/// Playback length of a base64 PCM16 chunk in milliseconds.
pub fn pcm16_duration_ms(b64: &str, sample_rate: u32) -> Result<u64, AiError> {
    let bytes = decode_pcm16(b64)?;
    Ok(byte_len_duration_ms(bytes.len(), sample_rate))
}
