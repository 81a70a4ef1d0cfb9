//! Real-time audio mixer implementation.
//!
//! This module provides the [`RtMixer`] struct which sums every active
//! [`VoiceSlot`](crate::audio_engine::voice_slot::VoiceSlot) into the output buffer, and the
//! [`SharedParams`] the control side writes to steer it.
//!
//! Topology changes arrive as [`ControlMessage`]s drained at the start of each callback.
//! Parameters (per-slot rate, master level) are plain atomics, so changing them never queues
//! behind topology work and never blocks the callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::audio_engine::constants::MAX_VOICES;
use crate::audio_engine::voice_slot::VoiceSlot;
use crate::messages::{AudioMessage, ControlMessage, SampleBuffer};
use cpal::Sample;

/// Parameters shared between the control side and the audio thread.
///
/// Values are `f32` bit patterns stored in `AtomicU32`.
pub struct SharedParams {
    output_level: AtomicU32,
    rates: [AtomicU32; MAX_VOICES],
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedParams {
    pub fn new() -> Self {
        Self {
            output_level: AtomicU32::new(1.0_f32.to_bits()),
            rates: std::array::from_fn(|_| AtomicU32::new(1.0_f32.to_bits())),
        }
    }

    pub fn set_output_level(&self, linear: f32) {
        self.output_level.store(linear.to_bits(), Ordering::Release);
    }

    pub fn output_level(&self) -> f32 {
        f32::from_bits(self.output_level.load(Ordering::Acquire))
    }

    /// Sets the target rate of a render slot. Out-of-range slots are ignored.
    pub fn set_rate(&self, slot: usize, rate: f32) {
        if let Some(cell) = self.rates.get(slot) {
            cell.store(rate.to_bits(), Ordering::Release);
        }
    }

    pub fn rate(&self, slot: usize) -> f32 {
        self.rates
            .get(slot)
            .map_or(1.0, |cell| f32::from_bits(cell.load(Ordering::Acquire)))
    }
}

/// Real-time mixer that renders the looping voices.
///
/// All operations are lock-free and allocation-free once constructed.
pub struct RtMixer {
    /// Number of output channels.
    channels: usize,

    params: Arc<SharedParams>,

    /// Render slots with MAX_VOICES entries.
    voices: [VoiceSlot; MAX_VOICES],
}

impl RtMixer {
    /// Creates a new RtMixer with the specified number of channels.
    pub fn new(channels: usize, params: Arc<SharedParams>) -> Self {
        Self {
            channels,
            params,
            voices: std::array::from_fn(|_| VoiceSlot::new()),
        }
    }

    /// Applies one control message. Returns the reply for the control side, if any.
    pub fn handle_message(&mut self, message: ControlMessage) -> Option<AudioMessage> {
        match message {
            ControlMessage::StartVoice {
                slot,
                sample,
                rate_scale,
            } => {
                self.start_voice(slot, sample, rate_scale);
                None
            }
            ControlMessage::StopVoice { slot } => self
                .stop_voice(slot)
                .map(|sample| AudioMessage::VoiceReleased { slot, sample }),
        }
    }

    /// Starts looping `sample` in a slot.
    ///
    /// Buffers whose channel count does not match the mixer are ignored.
    pub fn start_voice(&mut self, slot: usize, sample: SampleBuffer, rate_scale: f64) {
        if sample.channels != self.channels {
            return;
        }
        let rate = self.params.rate(slot);
        if let Some(voice) = self.voices.get_mut(slot) {
            voice.start(sample, rate_scale, rate);
        }
    }

    /// Stops a slot and returns its buffer.
    pub fn stop_voice(&mut self, slot: usize) -> Option<SampleBuffer> {
        self.voices.get_mut(slot).and_then(VoiceSlot::stop)
    }

    /// Renders audio frames to the output buffer.
    ///
    /// The output buffer must contain interleaved audio samples with `channels` per frame.
    /// The master level is applied once to the summed voices.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(Sample::EQUILIBRIUM);

        if self.channels == 0 {
            return;
        }

        let level = self.params.output_level();
        for (slot, voice) in self.voices.iter_mut().enumerate() {
            if !voice.active {
                continue;
            }
            let rate = voice.smooth_rate(self.params.rate(slot));
            voice.render_into(output, self.channels, rate, 1.0);
        }

        if level != 1.0 {
            for sample in output.iter_mut() {
                *sample *= level;
            }
        }
    }

    /// Gets the number of channels configured for this mixer.
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|voice| voice.active).count()
    }

    pub fn frame_pos(&self, slot: usize) -> Option<f64> {
        self.voices.get(slot).map(VoiceSlot::frame_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::test_support::constant_sample;

    fn mixer(channels: usize) -> (RtMixer, Arc<SharedParams>) {
        let params = Arc::new(SharedParams::new());
        (RtMixer::new(channels, params.clone()), params)
    }

    #[test]
    fn test_mixer_creation() {
        let (mixer, _) = mixer(2);
        assert_eq!(mixer.channels(), 2);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_render_silence() {
        let (mut mixer, _) = mixer(2);
        let mut output = vec![0.3; 200];

        mixer.render(&mut output);

        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_start_voice_wrong_channels() {
        let (mut mixer, _) = mixer(2);

        mixer.start_voice(0, constant_sample(1, 10, 0.5), 1.0);

        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_start_voice_invalid_slot() {
        let (mut mixer, _) = mixer(1);

        mixer.start_voice(MAX_VOICES + 3, constant_sample(1, 10, 0.5), 1.0);

        assert_eq!(mixer.active_voices(), 0);
        assert!(mixer.stop_voice(MAX_VOICES + 3).is_none());
    }

    #[test]
    fn test_multiple_voices_mixing() {
        let (mut mixer, _) = mixer(2);
        mixer.start_voice(0, constant_sample(2, 10, 0.3), 1.0);
        mixer.start_voice(5, constant_sample(2, 10, 0.2), 1.0);

        let mut output = vec![0.0; 20];
        mixer.render(&mut output);

        assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_master_level_applied_once() {
        let (mut mixer, params) = mixer(1);
        mixer.start_voice(0, constant_sample(1, 10, 0.4), 1.0);
        mixer.start_voice(1, constant_sample(1, 10, 0.4), 1.0);
        params.set_output_level(0.5);

        let mut output = vec![0.0; 10];
        mixer.render(&mut output);

        assert!(output.iter().all(|&s| (s - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_rate_param_changes_speed_without_restart() {
        let (mut mixer, params) = mixer(1);
        mixer.start_voice(2, constant_sample(1, 1_000, 0.1), 1.0);

        let mut output = vec![0.0; 100];
        mixer.render(&mut output);
        let before = mixer.frame_pos(2).unwrap();

        params.set_rate(2, 2.0);
        mixer.render(&mut output);
        let after = mixer.frame_pos(2).unwrap();

        assert!((before - 100.0).abs() < 1e-9);
        // One glide step toward the new rate, continuing from the old position.
        assert!((after - before - 105.0).abs() < 1e-3);
    }

    #[test]
    fn test_stop_message_returns_buffer() {
        let (mut mixer, _) = mixer(1);
        let sample = constant_sample(1, 10, 0.5);
        mixer.handle_message(ControlMessage::StartVoice {
            slot: 3,
            sample: sample.clone(),
            rate_scale: 1.0,
        });
        assert_eq!(mixer.active_voices(), 1);

        let reply = mixer.handle_message(ControlMessage::StopVoice { slot: 3 });

        match reply {
            Some(AudioMessage::VoiceReleased { slot, sample: released }) => {
                assert_eq!(slot, 3);
                assert!(released.shares_data_with(&sample));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        assert_eq!(mixer.active_voices(), 0);
        assert!(mixer.handle_message(ControlMessage::StopVoice { slot: 3 }).is_none());
    }

    #[test]
    fn test_shared_params_defaults() {
        let params = SharedParams::new();
        assert_eq!(params.output_level(), 1.0);
        assert_eq!(params.rate(0), 1.0);
        assert_eq!(params.rate(MAX_VOICES), 1.0);

        params.set_rate(4, 1.75);
        assert_eq!(params.rate(4), 1.75);
    }
}
