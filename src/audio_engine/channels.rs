use std::sync::Arc;

use crate::audio_engine::errors::SampleLoadError;
use crate::messages::SampleBuffer;

/// Re-lays interleaved samples from `from` channels to `to` channels.
///
/// Only mono and stereo are convertible: mono is duplicated into both sides, stereo is
/// folded down to the mean of its two channels. Any other pair fails with
/// [`SampleLoadError::UnsupportedChannels`].
pub fn map_channels(samples: &[f32], from: usize, to: usize) -> Result<Vec<f32>, SampleLoadError> {
    match (from, to) {
        _ if from == to => Ok(samples.to_vec()),
        (1, 2) => Ok(samples.iter().flat_map(|&s| [s, s]).collect()),
        (2, 1) => Ok(samples
            .chunks_exact(2)
            .map(|pair| 0.5 * (pair[0] + pair[1]))
            .collect()),
        _ => Err(SampleLoadError::UnsupportedChannels {
            file_channels: from,
            output_channels: to,
        }),
    }
}

/// Returns a buffer laid out for `output_channels`.
///
/// Buffers that already match are returned as the same shared handle; anything else is
/// converted into a new allocation, so call this on the control thread only.
pub fn conform_to_output(
    sample: &SampleBuffer,
    output_channels: usize,
) -> Result<SampleBuffer, SampleLoadError> {
    if sample.channels == output_channels {
        return Ok(sample.clone());
    }

    let mapped = map_channels(&sample.samples, sample.channels, output_channels)?;
    Ok(SampleBuffer {
        channels: output_channels,
        sample_rate: sample.sample_rate,
        samples: Arc::from(mapped.into_boxed_slice()),
    })
}
