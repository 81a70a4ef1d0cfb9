//! Global tempo.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::audio_engine::constants::{BASELINE_BPM, BPM_DEFAULT, BPM_MAX, BPM_MIN};
use crate::audio_engine::graph::AudioGraphEngine;
use crate::audio_engine::registry::VoiceRegistry;

/// Clamps a requested tempo into the supported range.
pub fn clamp_bpm(value: i32) -> u16 {
    // Clamped into u16 range, so the cast is lossless.
    value.clamp(i32::from(BPM_MIN), i32::from(BPM_MAX)) as u16
}

/// Playback rate for a tempo. Samples are authored at [`BASELINE_BPM`].
pub fn rate_for_bpm(bpm: u16) -> f32 {
    f32::from(bpm) / BASELINE_BPM
}

/// Holds the global BPM and pushes the derived rate to every live voice.
pub struct TempoController {
    bpm: AtomicU16,
    broadcast: Mutex<()>,
}

impl Default for TempoController {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoController {
    pub fn new() -> Self {
        Self {
            bpm: AtomicU16::new(BPM_DEFAULT),
            broadcast: Mutex::new(()),
        }
    }

    pub fn bpm(&self) -> u16 {
        self.bpm.load(Ordering::Acquire)
    }

    /// Rate every voice should currently play at.
    pub fn rate(&self) -> f32 {
        rate_for_bpm(self.bpm())
    }

    /// Clamps and stores `value`, then sets the new rate on every live voice.
    ///
    /// Returns the stored BPM. Nothing is broadcast when the clamped value equals the current
    /// one. Broadcasts are serialized, so the last stored BPM is also the last rate written to
    /// each voice.
    pub fn set_bpm(&self, value: i32, registry: &VoiceRegistry, graph: &AudioGraphEngine) -> u16 {
        let bpm = clamp_bpm(value);
        let _broadcast = self.broadcast.lock().unwrap_or_else(PoisonError::into_inner);

        if self.bpm.swap(bpm, Ordering::AcqRel) == bpm {
            return bpm;
        }

        let rate = rate_for_bpm(bpm);
        let updated = registry.broadcast_rate(graph, rate);
        log::info!("Tempo set to {bpm} BPM (rate {rate}, {updated} voices updated)");
        bpm
    }
}
