//! Master gain.
//!
//! The gain is applied once, at the main mixer. No voice carries its own gain.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio_engine::constants::{GAIN_DB_DEFAULT, GAIN_DB_MAX, GAIN_DB_MIN};
use crate::audio_engine::graph::AudioGraphEngine;

/// Clamps a requested gain into the supported range. NaN yields `None`.
pub fn clamp_db(value: f64) -> Option<f64> {
    if value.is_nan() {
        return None;
    }
    Some(value.clamp(GAIN_DB_MIN, GAIN_DB_MAX))
}

/// Linear amplitude factor for a dB value.
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

pub struct GainController {
    db: Mutex<f64>,
}

impl GainController {
    /// Creates the controller and applies the default gain to the graph.
    pub fn new(graph: &AudioGraphEngine) -> Self {
        graph.set_output_level(db_to_linear(GAIN_DB_DEFAULT) as f32);
        Self {
            db: Mutex::new(GAIN_DB_DEFAULT),
        }
    }

    pub fn db(&self) -> f64 {
        *self.lock()
    }

    pub fn linear(&self) -> f64 {
        db_to_linear(self.db())
    }

    /// Clamps and stores `value`, then applies its linear factor to the main mixer.
    ///
    /// Returns the stored dB value. NaN is ignored.
    pub fn set_db(&self, value: f64, graph: &AudioGraphEngine) -> f64 {
        let mut db = self.lock();
        let Some(clamped) = clamp_db(value) else {
            log::warn!("Ignoring NaN gain");
            return *db;
        };
        if *db == clamped {
            return clamped;
        }

        *db = clamped;
        let linear = db_to_linear(clamped);
        graph.set_output_level(linear as f32);
        log::info!("Master gain set to {clamped} dB (x{linear:.4})");
        clamped
    }

    fn lock(&self) -> MutexGuard<'_, f64> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
