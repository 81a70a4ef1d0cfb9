//! Fixtures shared by the engine's unit tests.

use std::sync::Arc;

use crate::audio_engine::constants::PAD_LABELS;
use crate::audio_engine::sample_library::MemoryProvider;
use crate::messages::SampleBuffer;

/// Builds a PCM16 WAV file in memory.
pub fn pcm16_wav_bytes(channels: u16, sample_rate_hz: u32, samples: &[i16]) -> Vec<u8> {
    let bits_per_sample = 16u16;
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate_hz * u32::from(block_align);
    let data_len_bytes = u32::try_from(samples.len() * 2).expect("sample data too large");
    let chunk_size = 36 + data_len_bytes;

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&chunk_size.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate_hz.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&bits_per_sample.to_le_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len_bytes.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    bytes
}

/// A provider holding a short mono loop for every pad label.
pub fn pad_provider() -> MemoryProvider {
    let mut provider = MemoryProvider::new();
    for label in PAD_LABELS {
        provider.insert(
            label,
            pcm16_wav_bytes(1, 44_100, &[0, 8_192, 16_384, 8_192, 0, -8_192]),
        );
    }
    provider
}

pub fn constant_sample(channels: usize, frames: usize, value: f32) -> SampleBuffer {
    SampleBuffer {
        channels,
        sample_rate: 44_100,
        samples: Arc::from(vec![value; channels * frames].into_boxed_slice()),
    }
}
