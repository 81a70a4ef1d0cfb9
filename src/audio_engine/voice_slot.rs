use crate::audio_engine::constants::{RATE_GLIDE_PER_BLOCK, RATE_MAX, RATE_MIN};
use crate::messages::SampleBuffer;

/// Render-side state of one looping voice.
///
/// Reads its buffer at a fractional position that advances by `rate × rate_scale` frames per
/// output frame and wraps to frame 0 at the end, interpolating across the wrap so the loop
/// has no gap.
pub struct VoiceSlot {
    pub active: bool,
    sample: Option<SampleBuffer>,
    frame_pos: f64,
    rate_scale: f64,
    rate_smoothed: f32,
}

impl Default for VoiceSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceSlot {
    pub fn new() -> Self {
        Self {
            active: false,
            sample: None,
            frame_pos: 0.0,
            rate_scale: 1.0,
            rate_smoothed: 1.0,
        }
    }

    pub fn start(&mut self, sample: SampleBuffer, rate_scale: f64, initial_rate: f32) {
        self.active = true;
        self.sample = Some(sample);
        self.frame_pos = 0.0;
        self.rate_scale = if rate_scale.is_finite() && rate_scale > 0.0 {
            rate_scale
        } else {
            1.0
        };
        self.rate_smoothed = initial_rate.clamp(RATE_MIN, RATE_MAX);
    }

    /// Deactivates the slot and hands back its buffer.
    pub fn stop(&mut self) -> Option<SampleBuffer> {
        self.active = false;
        self.frame_pos = 0.0;
        self.rate_smoothed = 1.0;
        self.sample.take()
    }

    /// Moves the effective rate toward `target` by at most one glide step.
    pub fn smooth_rate(&mut self, target: f32) -> f32 {
        if !target.is_finite() {
            return self.rate_smoothed;
        }

        let target = target.clamp(RATE_MIN, RATE_MAX);
        if !self.rate_smoothed.is_finite() {
            self.rate_smoothed = target;
            return self.rate_smoothed;
        }

        let delta =
            (target - self.rate_smoothed).clamp(-RATE_GLIDE_PER_BLOCK, RATE_GLIDE_PER_BLOCK);
        self.rate_smoothed = (self.rate_smoothed + delta).clamp(RATE_MIN, RATE_MAX);
        self.rate_smoothed
    }

    pub fn frame_pos(&self) -> f64 {
        self.frame_pos
    }

    /// Adds this voice into `output` (interleaved, `channels` per frame).
    pub fn render_into(&mut self, output: &mut [f32], channels: usize, rate: f32, gain: f32) {
        let Some(sample) = self.sample.as_ref() else {
            self.active = false;
            return;
        };
        if sample.channels != channels || channels == 0 {
            return;
        }

        let frames = sample.frames();
        if frames == 0 {
            self.active = false;
            return;
        }

        let len = frames as f64;
        let step = f64::from(rate) * self.rate_scale;
        for out_frame in output.chunks_exact_mut(channels) {
            let index = (self.frame_pos as usize).min(frames - 1);
            let next = (index + 1) % frames;
            let frac = (self.frame_pos - index as f64) as f32;

            let current = &sample.samples[index * channels..(index + 1) * channels];
            let following = &sample.samples[next * channels..(next + 1) * channels];
            for ((out, a), b) in out_frame.iter_mut().zip(current).zip(following) {
                *out += (a + (b - a) * frac) * gain;
            }

            self.frame_pos += step;
            if self.frame_pos >= len {
                self.frame_pos %= len;
            }
        }
    }
}
