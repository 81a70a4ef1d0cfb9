//! Python binding of [`PadEngine`]. Pads are addressed by label.

use std::path::PathBuf;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::audio_engine::{EngineConfig, EngineError, OutputDevice, PadEngine, PadId};
use crate::messages::EngineEvent;

fn to_py_err(err: EngineError) -> PyErr {
    match err {
        EngineError::UnknownPad(_) => PyValueError::new_err(err.to_string()),
        _ => PyRuntimeError::new_err(err.to_string()),
    }
}

#[pyclass]
pub struct AudioEngine {
    engine: PadEngine,
}

#[pymethods]
impl AudioEngine {
    #[new]
    #[pyo3(signature = (sample_dir = None, device = "default"))]
    pub fn new(sample_dir: Option<PathBuf>, device: &str) -> PyResult<Self> {
        let device = OutputDevice::from_name(device).ok_or_else(|| {
            PyValueError::new_err(format!("unknown device {device:?} (expected default or mock)"))
        })?;
        let mut config = EngineConfig {
            device,
            ..EngineConfig::default()
        };
        if let Some(dir) = sample_dir {
            config.sample_dir = dir;
        }

        Ok(Self {
            engine: PadEngine::from_config(&config),
        })
    }

    /// Toggle a pad. Returns `"playing"` or `"stopped"`.
    pub fn toggle(&self, label: &str) -> PyResult<&'static str> {
        self.engine
            .toggle_label(label)
            .map(|state| state.as_str())
            .map_err(to_py_err)
    }

    /// Set the tempo in BPM. Returns the clamped value.
    pub fn set_tempo(&self, bpm: i32) -> u16 {
        self.engine.set_tempo(bpm)
    }

    pub fn tempo(&self) -> u16 {
        self.engine.tempo()
    }

    /// Set the master gain in dB. Returns the clamped value.
    pub fn set_gain(&self, db: f64) -> f64 {
        self.engine.set_gain(db)
    }

    pub fn gain_db(&self) -> f64 {
        self.engine.gain_db()
    }

    /// Map of pad label to `"playing"` / `"stopped"`.
    pub fn pad_states(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        let dict = PyDict::new(py);
        for (pad, state) in PadId::all().zip(self.engine.pad_states()) {
            dict.set_item(pad.label(), state.as_str())?;
        }
        Ok(dict.into_any().unbind())
    }

    pub fn stop_all(&self) {
        self.engine.stop_all();
    }

    pub fn shut_down(&self) {
        self.engine.shut_down();
    }

    /// Poll for the next engine event.
    ///
    /// Returns `None` when no events are available.
    pub fn poll_event(&self, py: Python<'_>) -> PyResult<Option<Py<PyAny>>> {
        let Some(event) = self.engine.poll_event() else {
            return Ok(None);
        };

        let dict = PyDict::new(py);
        match event {
            EngineEvent::PadStarted { pad, rate } => {
                dict.set_item("type", "pad_started")?;
                dict.set_item("pad", pad.label())?;
                dict.set_item("rate", rate)?;
            }
            EngineEvent::PadStopped { pad } => {
                dict.set_item("type", "pad_stopped")?;
                dict.set_item("pad", pad.label())?;
            }
            EngineEvent::PadError { pad, error } => {
                dict.set_item("type", "pad_error")?;
                dict.set_item("pad", pad.label())?;
                dict.set_item("msg", error)?;
            }
            EngineEvent::TempoChanged { bpm, rate } => {
                dict.set_item("type", "tempo")?;
                dict.set_item("bpm", bpm)?;
                dict.set_item("rate", rate)?;
            }
            EngineEvent::GainChanged { db, linear } => {
                dict.set_item("type", "gain")?;
                dict.set_item("db", db)?;
                dict.set_item("linear", linear)?;
            }
            EngineEvent::EngineUnavailable { error } => {
                dict.set_item("type", "engine_unavailable")?;
                dict.set_item("msg", error)?;
            }
        }

        Ok(Some(dict.into_any().unbind()))
    }
}
