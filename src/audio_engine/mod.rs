//! Audio Engine Module
//!
//! This module turns pad toggles, a global tempo and a master gain into looping voices on an
//! audio graph. It is organized into sub-modules, each with a specific responsibility:
//!
//! - [`graph`]: Host graph API and the lock that owns it
//! - [`host`]: cpal-backed graph
//! - [`mock`]: Silent graph for headless runs and tests
//! - [`audio_stream`]: CPAL audio stream management and real-time callback
//! - [`mixer`], [`voice_slot`]: Render side of the voices
//! - [`voice`], [`registry`]: Control side voice lifecycle, keyed by pad
//! - [`tempo`], [`gain`]: Global tempo and master gain
//! - [`sample_library`], [`sample_loader`], [`channels`]: Sample resolution and decoding
//!
//! The main [`PadEngine`] struct orchestrates these components.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Mutex, PoisonError};

use crate::messages::EngineEvent;

pub mod audio_stream;
pub mod channels;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gain;
pub mod graph;
pub mod host;
pub mod mixer;
pub mod mock;
pub mod pad;
pub mod registry;
pub mod sample_library;
pub mod sample_loader;
pub mod tempo;
pub mod voice;
pub mod voice_slot;

#[cfg(test)]
mod test_support;

pub use audio_stream::setup_logger;
pub use config::{EngineConfig, OutputDevice};
pub use constants::NUM_PADS;
pub use errors::{EngineError, GraphError, SampleLoadError};
pub use gain::GainController;
pub use graph::{AudioGraph, AudioGraphEngine, NodeId, NodeKind, StreamFormat};
pub use host::CpalGraph;
pub use pad::{PadId, PadState};
pub use registry::VoiceRegistry;
pub use sample_library::{DirectoryProvider, MemoryProvider, ResourceProvider, SampleLibrary};
pub use tempo::TempoController;

/// Engine context: every pad, the tempo, the gain and the graph they play on.
///
/// All operations take `&self`; the engine can be shared between threads.
pub struct PadEngine {
    graph: AudioGraphEngine,
    library: SampleLibrary,
    registry: VoiceRegistry,
    tempo: TempoController,
    gain: GainController,
    events_tx: Sender<EngineEvent>,
    events_rx: Mutex<Receiver<EngineEvent>>,
}

impl PadEngine {
    /// Creates an engine on `graph`, loading pad samples from `provider`.
    ///
    /// The output device is not started until the first pad plays.
    pub fn new(graph: Box<dyn AudioGraph>, provider: Box<dyn ResourceProvider>) -> Self {
        setup_logger();

        let graph = AudioGraphEngine::new(graph);
        let gain = GainController::new(&graph);
        let (events_tx, events_rx) = mpsc::channel();

        Self {
            graph,
            library: SampleLibrary::new(provider),
            registry: VoiceRegistry::new(),
            tempo: TempoController::new(),
            gain,
            events_tx,
            events_rx: Mutex::new(events_rx),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let graph: Box<dyn AudioGraph> = match config.device {
            OutputDevice::Default => {
                Box::new(CpalGraph::new(config.buffer_frames, config.ring_capacity))
            }
            OutputDevice::Mock => Box::new(mock::Graph::new()),
        };
        let provider =
            DirectoryProvider::new(config.sample_dir.clone(), config.sample_extension.clone());
        log::info!(
            "Pad samples from {} ({:?} output)",
            provider.dir().display(),
            config.device
        );
        Self::new(graph, Box::new(provider))
    }

    /// Starts the pad if it is stopped, stops it if it is playing.
    ///
    /// A sample that cannot be loaded leaves the pad stopped: the failure is logged, reported
    /// as [`EngineEvent::PadError`], and `Ok(PadState::Stopped)` is returned. Graph failures
    /// and an unavailable engine are returned as errors.
    pub fn toggle(&self, pad: PadId) -> Result<PadState, EngineError> {
        match self
            .registry
            .toggle(pad, &self.graph, &self.library, &self.tempo)
        {
            Ok(PadState::Playing) => {
                let rate = self
                    .registry
                    .voice_rate(pad)
                    .unwrap_or_else(|| self.tempo.rate());
                log::info!("Pad {pad} playing (rate {rate})");
                self.emit(EngineEvent::PadStarted { pad, rate });
                Ok(PadState::Playing)
            }
            Ok(PadState::Stopped) => {
                log::info!("Pad {pad} stopped");
                self.emit(EngineEvent::PadStopped { pad });
                Ok(PadState::Stopped)
            }
            Err(EngineError::SampleLoad(err)) => {
                log::error!("Failed to load sample for pad {pad}: {err}");
                self.emit(EngineEvent::PadError {
                    pad,
                    error: err.to_string(),
                });
                Ok(PadState::Stopped)
            }
            Err(EngineError::EngineUnavailable(reason)) => {
                self.emit(EngineEvent::EngineUnavailable {
                    error: reason.clone(),
                });
                Err(EngineError::EngineUnavailable(reason))
            }
            Err(err) => {
                log::error!("Failed to start pad {pad}: {err}");
                self.emit(EngineEvent::PadError {
                    pad,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// [`toggle`](Self::toggle) addressed by grid label, e.g. `"B2"`.
    pub fn toggle_label(&self, label: &str) -> Result<PadState, EngineError> {
        self.toggle(label.parse()?)
    }

    /// Sets the global tempo, clamped to the supported range. Returns the stored BPM.
    pub fn set_tempo(&self, bpm: i32) -> u16 {
        let previous = self.tempo.bpm();
        let stored = self.tempo.set_bpm(bpm, &self.registry, &self.graph);
        if stored != previous {
            self.emit(EngineEvent::TempoChanged {
                bpm: stored,
                rate: tempo::rate_for_bpm(stored),
            });
        }
        stored
    }

    pub fn tempo(&self) -> u16 {
        self.tempo.bpm()
    }

    /// Playback rate derived from the current tempo.
    pub fn rate(&self) -> f32 {
        self.tempo.rate()
    }

    /// Sets the master gain in dB, clamped to the supported range. Returns the stored value.
    pub fn set_gain(&self, db: f64) -> f64 {
        let previous = self.gain.db();
        let stored = self.gain.set_db(db, &self.graph);
        if stored != previous {
            self.emit(EngineEvent::GainChanged {
                db: stored,
                linear: gain::db_to_linear(stored),
            });
        }
        stored
    }

    pub fn gain_db(&self) -> f64 {
        self.gain.db()
    }

    pub fn gain_linear(&self) -> f64 {
        self.gain.linear()
    }

    pub fn pad_state(&self, pad: PadId) -> PadState {
        self.registry.state(pad)
    }

    /// State of every pad, in pad index order.
    pub fn pad_states(&self) -> [PadState; NUM_PADS] {
        self.registry.states()
    }

    /// Rate the pad's voice currently plays at, if the pad is playing.
    pub fn voice_rate(&self, pad: PadId) -> Option<f32> {
        self.registry.voice_rate(pad)
    }

    /// Stops every playing pad. Returns the pads that were stopped.
    pub fn stop_all(&self) -> Vec<PadId> {
        let stopped = self.registry.stop_all(&self.graph);
        for pad in &stopped {
            self.emit(EngineEvent::PadStopped { pad: *pad });
        }
        if !stopped.is_empty() {
            log::info!("Stopped {} pads", stopped.len());
        }
        stopped
    }

    /// Stops the output device, then every pad. A later toggle starts the device again.
    ///
    /// A toggle racing the shutdown either fails against the stopped device or lands after
    /// the device restarts, so no pad is left reported as playing on a stopped device.
    pub fn shut_down(&self) {
        self.graph.shut_down();
        self.stop_all();
        log::info!("Audio engine shut down");
    }

    /// Returns the next pending event, or `None` when there is none.
    pub fn poll_event(&self) -> Option<EngineEvent> {
        let events_rx = self.events_rx.lock().unwrap_or_else(PoisonError::into_inner);
        match events_rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn emit(&self, event: EngineEvent) {
        // The receiver lives as long as `self`, so sending cannot fail.
        let _ = self.events_tx.send(event);
    }
}
