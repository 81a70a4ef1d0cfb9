//! Message definitions for communication between the control side and the real-time audio thread.
//!
//! [`ControlMessage`] and [`AudioMessage`] are the wire format of the ring buffers between the
//! control thread and the render callback. [`EngineEvent`] is what the engine reports back to the
//! UI layer.

use std::sync::Arc;

use crate::audio_engine::{PadId, PadState, StreamFormat};

/// Immutable decoded PCM data, shared by every voice playing it.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub channels: usize,
    pub sample_rate: u32,
    /// Interleaved samples.
    pub samples: Arc<[f32]>,
}

impl SampleBuffer {
    /// Number of frames in the buffer.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Returns true if both handles point at the same decoded data.
    pub fn shares_data_with(&self, other: &SampleBuffer) -> bool {
        Arc::ptr_eq(&self.samples, &other.samples)
    }
}

/// Message that is emitted from the control side.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    /// Start looping a buffer in a render slot.
    ///
    /// # Parameters
    /// * `slot` - Render slot index (0..MAX_VOICES)
    /// * `sample` - Buffer already mapped to the output channel count
    /// * `rate_scale` - Buffer sample rate divided by output sample rate
    StartVoice {
        slot: usize,
        sample: SampleBuffer,
        rate_scale: f64,
    },

    /// Stop the voice in a render slot and hand its buffer back.
    StopVoice { slot: usize },
}

/// Message that is emitted from the audio thread.
#[derive(Debug, Clone)]
pub enum AudioMessage {
    /// A render slot stopped and is free again. The buffer handle is returned so it is
    /// released on the control side.
    VoiceReleased { slot: usize, sample: SampleBuffer },
}

/// Events reported to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A pad started looping at the given rate.
    PadStarted { pad: PadId, rate: f32 },

    /// A pad stopped.
    PadStopped { pad: PadId },

    /// A toggle was aborted; the pad stays stopped.
    PadError { pad: PadId, error: String },

    /// The global tempo changed.
    TempoChanged { bpm: u16, rate: f32 },

    /// The master gain changed.
    GainChanged { db: f64, linear: f64 },

    /// The output device could not be started; pads stay silent for the session.
    EngineUnavailable { error: String },
}

impl EngineEvent {
    /// Resulting pad state, for pad events.
    pub fn pad_state(&self) -> Option<(PadId, PadState)> {
        match self {
            EngineEvent::PadStarted { pad, .. } => Some((*pad, PadState::Playing)),
            EngineEvent::PadStopped { pad } | EngineEvent::PadError { pad, .. } => {
                Some((*pad, PadState::Stopped))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_frames() {
        let sample = SampleBuffer {
            channels: 2,
            sample_rate: 44_100,
            samples: Arc::from(vec![0.0; 8].into_boxed_slice()),
        };
        assert_eq!(sample.frames(), 4);
        assert_eq!(sample.format().channels, 2);
        assert!(sample.shares_data_with(&sample.clone()));
    }

    #[test]
    fn test_sample_buffer_zero_channels() {
        let sample = SampleBuffer {
            channels: 0,
            sample_rate: 44_100,
            samples: Arc::from(vec![0.0; 4].into_boxed_slice()),
        };
        assert_eq!(sample.frames(), 0);
    }

    #[test]
    fn test_event_pad_state() {
        let pad = PadId::new(3).unwrap();
        assert_eq!(
            EngineEvent::PadStarted { pad, rate: 1.0 }.pad_state(),
            Some((pad, PadState::Playing))
        );
        assert_eq!(
            EngineEvent::PadError {
                pad,
                error: "missing".to_string()
            }
            .pad_state(),
            Some((pad, PadState::Stopped))
        );
        assert_eq!(
            EngineEvent::TempoChanged { bpm: 90, rate: 1.5 }.pad_state(),
            None
        );
    }
}
