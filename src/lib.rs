pub mod audio_engine;
pub mod messages;

#[cfg(feature = "python")]
mod python;

pub use audio_engine::{EngineConfig, EngineError, PadEngine, PadId, PadState};
pub use messages::EngineEvent;

/// The Python module implemented in Rust.
#[cfg(feature = "python")]
#[pyo3::pymodule]
mod ambient_pads_audio {
    #[pymodule_export]
    use super::python::AudioEngine;
}
