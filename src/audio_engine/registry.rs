//! Live voices keyed by pad.
//!
//! Every pad has its own lock. A toggle holds it for the whole start or stop transition, so a
//! second toggle of the same pad waits until the first one has finished and then toggles
//! again. Toggles of different pads never wait on each other here; they only meet at the
//! graph lock inside [`AudioGraphEngine`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio_engine::constants::NUM_PADS;
use crate::audio_engine::errors::EngineError;
use crate::audio_engine::graph::AudioGraphEngine;
use crate::audio_engine::pad::{PadId, PadState};
use crate::audio_engine::sample_library::SampleLibrary;
use crate::audio_engine::tempo::TempoController;
use crate::audio_engine::voice::Voice;

pub struct VoiceRegistry {
    pads: [Mutex<Option<Voice>>; NUM_PADS],
    published: [AtomicBool; NUM_PADS],
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self {
            pads: std::array::from_fn(|_| Mutex::new(None)),
            published: std::array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    /// Starts the pad if it has no live voice, otherwise stops it.
    ///
    /// Returns the pad's resulting state. When a start fails the pad is left stopped with no
    /// registry entry and the error is returned.
    pub fn toggle(
        &self,
        pad: PadId,
        graph: &AudioGraphEngine,
        library: &SampleLibrary,
        tempo: &TempoController,
    ) -> Result<PadState, EngineError> {
        let mut entry = self.lock_pad(pad);

        if let Some(voice) = entry.as_mut() {
            voice.stop(graph);
            *entry = None;
            self.publish(pad, PadState::Stopped);
            return Ok(PadState::Stopped);
        }

        graph.check_available()?;
        let sample = library.load(pad.sample_name())?;
        let rate = tempo.rate();

        let voice = entry.insert(Voice::new(pad, graph.allocate_node(), graph.allocate_node()));
        if let Err(err) = voice.start(graph, sample, rate) {
            *entry = None;
            return Err(err);
        }

        self.publish(pad, PadState::Playing);
        Ok(PadState::Playing)
    }

    /// Sets `rate` on every starting or playing voice. Returns how many voices took it.
    ///
    /// Failures are logged per voice and do not stop the broadcast.
    pub fn broadcast_rate(&self, graph: &AudioGraphEngine, rate: f32) -> usize {
        let mut updated = 0;
        for pad in PadId::all() {
            let mut entry = self.lock_pad(pad);
            let Some(voice) = entry.as_mut().filter(|voice| voice.is_live()) else {
                continue;
            };
            match voice.set_rate(graph, rate) {
                Ok(()) => updated += 1,
                Err(err) => log::warn!("Failed to set rate {rate} on pad {pad}: {err}"),
            }
        }
        updated
    }

    /// Stops every live voice. Returns the pads that were stopped.
    pub fn stop_all(&self, graph: &AudioGraphEngine) -> Vec<PadId> {
        let mut stopped = Vec::new();
        for pad in PadId::all() {
            let mut entry = self.lock_pad(pad);
            if let Some(voice) = entry.as_mut() {
                voice.stop(graph);
                *entry = None;
                self.publish(pad, PadState::Stopped);
                stopped.push(pad);
            }
        }
        stopped
    }

    /// Published state of a pad. Never waits on an in-flight toggle.
    pub fn state(&self, pad: PadId) -> PadState {
        self.published_state(pad.index())
    }

    /// Published state of every pad, in pad index order.
    pub fn states(&self) -> [PadState; NUM_PADS] {
        std::array::from_fn(|index| self.published_state(index))
    }

    /// Current rate of the pad's voice, if it has one.
    pub fn voice_rate(&self, pad: PadId) -> Option<f32> {
        self.lock_pad(pad).as_ref().map(Voice::rate)
    }

    /// Returns true if the pad has a registry entry.
    pub fn has_entry(&self, pad: PadId) -> bool {
        self.lock_pad(pad).is_some()
    }

    /// Number of pads with a registry entry.
    pub fn live_voices(&self) -> usize {
        PadId::all().filter(|pad| self.has_entry(*pad)).count()
    }

    fn published_state(&self, index: usize) -> PadState {
        if self.published[index].load(Ordering::Acquire) {
            PadState::Playing
        } else {
            PadState::Stopped
        }
    }

    fn publish(&self, pad: PadId, state: PadState) {
        self.published[pad.index()].store(state == PadState::Playing, Ordering::Release);
    }

    fn lock_pad(&self, pad: PadId) -> MutexGuard<'_, Option<Voice>> {
        self.pads[pad.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::graph::NodeKind;
    use crate::audio_engine::mock;
    use crate::audio_engine::sample_library::MemoryProvider;
    use crate::audio_engine::test_support::pad_provider;

    struct Fixture {
        graph: mock::Graph,
        engine: AudioGraphEngine,
        library: SampleLibrary,
        tempo: TempoController,
        registry: VoiceRegistry,
    }

    impl Fixture {
        fn new(provider: MemoryProvider) -> Self {
            let graph = mock::Graph::new();
            Self {
                engine: AudioGraphEngine::new(Box::new(graph.clone())),
                graph,
                library: SampleLibrary::new(Box::new(provider)),
                tempo: TempoController::new(),
                registry: VoiceRegistry::new(),
            }
        }

        fn toggle(&self, pad: PadId) -> Result<PadState, EngineError> {
            self.registry
                .toggle(pad, &self.engine, &self.library, &self.tempo)
        }
    }

    fn pad(label: &str) -> PadId {
        label.parse().unwrap()
    }

    #[test]
    fn test_toggle_twice_returns_every_pad_to_stopped() {
        let fixture = Fixture::new(pad_provider());

        for pad in PadId::all() {
            assert_eq!(fixture.toggle(pad).unwrap(), PadState::Playing);
            assert_eq!(fixture.toggle(pad).unwrap(), PadState::Stopped);
            assert!(!fixture.registry.has_entry(pad));
            assert_eq!(fixture.registry.state(pad), PadState::Stopped);
        }
        assert_eq!(fixture.graph.attached_count(NodeKind::Player), 0);
    }

    #[test]
    fn test_missing_sample_leaves_pad_stopped() {
        let fixture = Fixture::new(MemoryProvider::new());

        let result = fixture.toggle(pad("B2"));

        assert!(matches!(result, Err(EngineError::SampleLoad(_))));
        assert!(!fixture.registry.has_entry(pad("B2")));
        assert_eq!(fixture.registry.state(pad("B2")), PadState::Stopped);
        assert_eq!(fixture.graph.attached_count(NodeKind::Player), 0);
    }

    #[test]
    fn test_toggle_uses_current_tempo() {
        let fixture = Fixture::new(pad_provider());
        fixture
            .tempo
            .set_bpm(90, &fixture.registry, &fixture.engine);

        fixture.toggle(pad("C1")).unwrap();

        assert_eq!(fixture.registry.voice_rate(pad("C1")), Some(1.5));
    }

    #[test]
    fn test_pads_are_independent() {
        let fixture = Fixture::new(pad_provider());

        fixture.toggle(pad("A1")).unwrap();
        fixture.toggle(pad("B1")).unwrap();
        fixture.toggle(pad("A1")).unwrap();

        assert_eq!(fixture.registry.state(pad("A1")), PadState::Stopped);
        assert_eq!(fixture.registry.state(pad("B1")), PadState::Playing);
        assert_eq!(fixture.registry.live_voices(), 1);
    }

    #[test]
    fn test_concurrent_toggles_on_different_pads() {
        let fixture = Fixture::new(pad_provider());

        std::thread::scope(|scope| {
            for pad in PadId::all() {
                let fixture = &fixture;
                scope.spawn(move || fixture.toggle(pad).unwrap());
            }
        });

        assert!(
            fixture
                .registry
                .states()
                .iter()
                .all(|state| *state == PadState::Playing)
        );
        assert_eq!(fixture.graph.attached_count(NodeKind::Player), PadId::all().count());
    }

    #[test]
    fn test_concurrent_toggles_on_same_pad_are_serialized() {
        let fixture = Fixture::new(pad_provider());
        let target = pad("D1");

        std::thread::scope(|scope| {
            for _ in 0..2 {
                let fixture = &fixture;
                scope.spawn(move || fixture.toggle(target).unwrap());
            }
        });

        assert_eq!(fixture.registry.state(target), PadState::Stopped);
        assert!(!fixture.registry.has_entry(target));
        assert_eq!(fixture.graph.attached_count(NodeKind::Player), 0);
        assert_eq!(fixture.graph.attached_count(NodeKind::RateStage), 0);
    }

    #[test]
    fn test_broadcast_skips_stopped_pads() {
        let fixture = Fixture::new(pad_provider());
        fixture.toggle(pad("A2")).unwrap();

        let updated = fixture.registry.broadcast_rate(&fixture.engine, 2.5);

        assert_eq!(updated, 1);
        assert_eq!(fixture.registry.voice_rate(pad("A2")), Some(2.5));
        assert_eq!(fixture.registry.voice_rate(pad("A1")), None);
    }

    #[test]
    fn test_stop_all() {
        let fixture = Fixture::new(pad_provider());
        fixture.toggle(pad("A1")).unwrap();
        fixture.toggle(pad("D2")).unwrap();

        let stopped = fixture.registry.stop_all(&fixture.engine);

        assert_eq!(stopped, vec![pad("A1"), pad("D2")]);
        assert_eq!(fixture.registry.live_voices(), 0);
        assert_eq!(fixture.graph.attached_count(NodeKind::Player), 0);
    }
}
