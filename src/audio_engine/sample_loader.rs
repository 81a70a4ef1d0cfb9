//! Audio decoding.
//!
//! This module turns raw resource bytes into sample buffers the render path can play.
//! Buffers keep the channel count and sample rate of the source; conversion to the output
//! layout happens when a voice is routed to the device.

use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::{
    audio::SampleBuffer as SymphoniaSampleBuffer, codecs::DecoderOptions,
    errors::Error as SymphoniaError, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};
use symphonia::default::{get_codecs, get_probe};

use crate::audio_engine::errors::SampleLoadError;
use crate::messages::SampleBuffer;

/// Decodes an in-memory audio resource into a sample buffer.
///
/// # Parameters
///
/// - `bytes`: Raw contents of the resource (WAV or any other format symphonia can read)
/// - `extension`: Optional file extension used as a format hint
///
/// # Errors
///
/// - Format not recognized or corrupted data
/// - Missing track, sample rate or channel information
/// - Data that decodes to zero frames
pub fn decode_audio_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
) -> Result<SampleBuffer, SampleLoadError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or(SampleLoadError::NoDefaultTrack)?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or(SampleLoadError::MissingSampleRate)?;
    let channels = track
        .codec_params
        .channels
        .ok_or(SampleLoadError::MissingChannels)?
        .count();

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut decoded: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(SampleLoadError::Decode(err)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let audio_buf = decoder.decode(&packet)?;
        let spec = *audio_buf.spec();
        let duration = audio_buf.capacity() as u64;

        let mut sample_buf = SymphoniaSampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        decoded.extend_from_slice(sample_buf.samples());
    }

    if channels == 0 || decoded.len() < channels {
        return Err(SampleLoadError::EmptySample);
    }

    Ok(SampleBuffer {
        channels,
        sample_rate,
        samples: Arc::from(decoded.into_boxed_slice()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::test_support::pcm16_wav_bytes;

    #[test]
    fn test_decode_wav_to_f32_buffer() {
        let samples = [0i16, 16_384i16, -16_384i16, 32_767i16];
        let bytes = pcm16_wav_bytes(1, 44_100, &samples);

        let decoded = decode_audio_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.samples.len(), samples.len());
        assert!(decoded.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn test_decode_keeps_source_layout() {
        let samples = [0i16, 16_384i16, -16_384i16, 8_192i16];
        let bytes = pcm16_wav_bytes(2, 48_000, &samples);

        let decoded = decode_audio_bytes(bytes, None).unwrap();
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.sample_rate, 48_000);
        assert_eq!(decoded.frames(), 2);
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let result = decode_audio_bytes(b"definitely not audio".to_vec(), Some("wav"));
        let err = result.unwrap_err();
        assert!(err.is_decode_error(), "unexpected error: {err}");
    }

    #[test]
    fn test_decode_empty_data_is_rejected() {
        let bytes = pcm16_wav_bytes(1, 44_100, &[]);
        let result = decode_audio_bytes(bytes, Some("wav"));
        assert!(result.unwrap_err().is_decode_error());
    }
}
