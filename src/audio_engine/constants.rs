//! Audio engine configuration constants and limits.

/// Number of pads in the grid.
pub const NUM_PADS: usize = 8;

/// Pad labels in index order. Each label is also the name of the pad's sample.
pub const PAD_LABELS: [&str; NUM_PADS] = ["A1", "A2", "B1", "B2", "C1", "C2", "D1", "D2"];

/// Number of render-side voice slots.
///
/// Twice the pad count, so slots still waiting for the audio thread to release
/// them never block a new start.
pub const MAX_VOICES: usize = NUM_PADS * 2;

/// Minimum tempo in beats per minute.
pub const BPM_MIN: u16 = 30;

/// Maximum tempo in beats per minute.
pub const BPM_MAX: u16 = 200;

/// Tempo on engine construction.
pub const BPM_DEFAULT: u16 = 60;

/// Tempo the samples were authored at. Playing at this tempo means rate 1.0.
pub const BASELINE_BPM: f32 = 60.0;

/// Slowest playback rate reachable from the tempo range.
pub const RATE_MIN: f32 = BPM_MIN as f32 / BASELINE_BPM;

/// Fastest playback rate reachable from the tempo range.
pub const RATE_MAX: f32 = BPM_MAX as f32 / BASELINE_BPM;

/// Largest rate change applied by a voice in one render block.
pub const RATE_GLIDE_PER_BLOCK: f32 = 0.05;

/// Minimum master gain in dB.
pub const GAIN_DB_MIN: f64 = -12.0;

/// Maximum master gain in dB.
pub const GAIN_DB_MAX: f64 = 12.0;

/// Master gain on engine construction.
pub const GAIN_DB_DEFAULT: f64 = 0.0;

/// Device start attempts before the engine is disabled for the session.
pub const START_ATTEMPTS: usize = 2;
