//! Voice lifecycle.
//!
//! A [`Voice`] is the playback unit behind one playing pad: a player node looping a sample
//! buffer, routed through a rate stage into the main mixer. The voice owns both nodes; nothing
//! else attaches, rewires or detaches them.
//!
//! ```text
//! Stopped -> Starting -> Playing -> Stopping -> Stopped
//! ```

use crate::audio_engine::errors::{EngineError, GraphError};
use crate::audio_engine::graph::{AudioGraphEngine, NodeId, NodeKind};
use crate::audio_engine::pad::PadId;
use crate::messages::SampleBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Starting,
    Playing,
    Stopping,
}

/// A looping player plus its rate stage.
#[derive(Debug)]
pub struct Voice {
    pad: PadId,
    player: NodeId,
    rate_stage: NodeId,
    sample: Option<SampleBuffer>,
    state: PlaybackState,
    rate: f32,
    player_attached: bool,
    rate_stage_attached: bool,
}

impl Voice {
    /// Creates a stopped voice that will use the given node identifiers.
    pub fn new(pad: PadId, player: NodeId, rate_stage: NodeId) -> Self {
        Self {
            pad,
            player,
            rate_stage,
            sample: None,
            state: PlaybackState::Stopped,
            rate: 1.0,
            player_attached: false,
            rate_stage_attached: false,
        }
    }

    pub fn pad(&self) -> PadId {
        self.pad
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn sample(&self) -> Option<&SampleBuffer> {
        self.sample.as_ref()
    }

    /// Returns true while the voice is starting or playing.
    pub fn is_live(&self) -> bool {
        matches!(self.state, PlaybackState::Starting | PlaybackState::Playing)
    }

    /// Routes the voice into the graph and starts looping `sample` at `rate`.
    ///
    /// A no-op unless the voice is stopped. On failure every node attached so far is removed
    /// again and the voice is back to stopped.
    pub fn start(
        &mut self,
        graph: &AudioGraphEngine,
        sample: SampleBuffer,
        rate: f32,
    ) -> Result<(), EngineError> {
        if self.state != PlaybackState::Stopped {
            return Ok(());
        }

        self.state = PlaybackState::Starting;
        self.rate = rate;
        if let Err(err) = self.build_route(graph, &sample) {
            self.release_nodes(graph);
            self.state = PlaybackState::Stopped;
            return Err(err);
        }

        self.sample = Some(sample);
        self.state = PlaybackState::Playing;
        Ok(())
    }

    fn build_route(
        &mut self,
        graph: &AudioGraphEngine,
        sample: &SampleBuffer,
    ) -> Result<(), EngineError> {
        let format = sample.format();

        graph.attach(self.player, NodeKind::Player)?;
        self.player_attached = true;
        graph.attach(self.rate_stage, NodeKind::RateStage)?;
        self.rate_stage_attached = true;

        graph.set_rate(self.rate_stage, self.rate)?;
        graph.connect(self.player, self.rate_stage, format)?;
        graph.connect(self.rate_stage, graph.main_mixer(), format)?;
        graph.schedule_looping(self.player, sample.clone())?;

        graph.ensure_running()?;
        graph.play(self.player)?;
        Ok(())
    }

    /// Halts playback and removes both nodes from the graph.
    ///
    /// Host failures are logged and the voice is marked stopped regardless, so a node the host
    /// refuses to remove never leaves the pad stuck.
    pub fn stop(&mut self, graph: &AudioGraphEngine) {
        if !self.is_live() {
            return;
        }

        self.state = PlaybackState::Stopping;
        if let Err(err) = graph.stop(self.player) {
            log::warn!("Failed to stop player for pad {}: {err}", self.pad);
        }
        if !self.release_nodes(graph) {
            log::warn!("Pad {} force-marked stopped after detach failure", self.pad);
        }

        self.sample = None;
        self.state = PlaybackState::Stopped;
    }

    /// Changes the playback rate in place.
    ///
    /// Only the rate stage coefficient changes; the loop keeps its position and is not
    /// rescheduled. Ignored unless the voice is starting or playing.
    pub fn set_rate(&mut self, graph: &AudioGraphEngine, rate: f32) -> Result<(), GraphError> {
        if !self.is_live() {
            return Ok(());
        }

        graph.set_rate(self.rate_stage, rate)?;
        self.rate = rate;
        Ok(())
    }

    /// Detaches whatever this voice attached. Returns false if the host refused a detach.
    fn release_nodes(&mut self, graph: &AudioGraphEngine) -> bool {
        let mut clean = true;
        for (node, attached) in [
            (self.player, &mut self.player_attached),
            (self.rate_stage, &mut self.rate_stage_attached),
        ] {
            if !*attached {
                continue;
            }
            if let Err(err) = graph.detach(node) {
                log::warn!("Failed to detach {node} for pad {}: {err}", self.pad);
                clean = false;
            }
            *attached = false;
        }
        clean
    }
}
