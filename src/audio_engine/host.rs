//! Audio graph backed by a cpal output stream.
//!
//! The node table lives on the control side. Every playing player owns one render slot in the
//! [`RtMixer`](crate::audio_engine::mixer::RtMixer) running inside the stream callback, and
//! the player's rate stage writes that slot's rate atomic. Buffers go to the audio thread with
//! [`ControlMessage::StartVoice`] and come back with [`AudioMessage::VoiceReleased`], so they
//! are always freed here and never in the callback.

use std::collections::HashMap;
use std::sync::Arc;

use cpal::Stream;

use crate::audio_engine::audio_stream::{
    AudioStreamHandle, RenderLink, create_audio_stream, start_stream,
};
use crate::audio_engine::channels::conform_to_output;
use crate::audio_engine::constants::MAX_VOICES;
use crate::audio_engine::errors::GraphError;
use crate::audio_engine::graph::{AudioGraph, NodeId, NodeKind, StreamFormat, check_connection};
use crate::audio_engine::mixer::SharedParams;
use crate::messages::{AudioMessage, ControlMessage, SampleBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Busy(NodeId),
    /// Stop sent; waiting for the audio thread to hand the buffer back.
    Releasing,
}

struct HostNode {
    kind: NodeKind,
    output: Option<NodeId>,
    scheduled: Option<SampleBuffer>,
    /// Rate stages only.
    rate: f32,
    /// Players only: render slot while playing.
    slot: Option<usize>,
}

impl HostNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            output: None,
            scheduled: None,
            rate: 1.0,
            slot: None,
        }
    }
}

pub struct CpalGraph {
    buffer_frames: u32,
    ring_capacity: usize,
    params: Arc<SharedParams>,
    nodes: HashMap<NodeId, HostNode>,
    slots: [SlotState; MAX_VOICES],
    /// Present while the device runs. Dropped together with `stream`.
    link: Option<RenderLink>,
    stream: Option<Stream>,
}

impl CpalGraph {
    pub fn new(buffer_frames: u32, ring_capacity: usize) -> Self {
        Self {
            buffer_frames,
            ring_capacity,
            params: Arc::new(SharedParams::new()),
            nodes: HashMap::new(),
            slots: [SlotState::Free; MAX_VOICES],
            link: None,
            stream: None,
        }
    }

    /// A graph whose render side is whoever holds the other ends of `link`.
    #[cfg(test)]
    fn with_link(link: RenderLink) -> Self {
        let mut graph = Self::new(512, 64);
        graph.link = Some(link);
        graph
    }

    /// Frees the slots the audio thread has released since the last call.
    fn drain_released(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        while let Ok(AudioMessage::VoiceReleased { slot, sample }) = link.consumer.pop() {
            if let Some(state) = self.slots.get_mut(slot) {
                *state = SlotState::Free;
            }
            drop(sample);
        }
    }

    fn node(&self, node: NodeId) -> Result<&HostNode, GraphError> {
        self.nodes.get(&node).ok_or(GraphError::UnknownNode(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut HostNode, GraphError> {
        self.nodes.get_mut(&node).ok_or(GraphError::UnknownNode(node))
    }

    /// Rate stage a player feeds, if the whole route down to the main mixer is wired.
    fn routed_rate_stage(&self, player: NodeId) -> Result<NodeId, GraphError> {
        let unrouted = GraphError::InvalidConnection {
            from: player,
            to: NodeId::MAIN_MIXER,
            reason: "player is not routed to the main mixer",
        };
        let Some(rate_stage) = self.node(player)?.output else {
            return Err(unrouted);
        };
        match self.node(rate_stage)?.output {
            Some(NodeId::MAIN_MIXER) => Ok(rate_stage),
            _ => Err(unrouted),
        }
    }

    /// Players currently routed into `rate_stage`.
    fn players_feeding(&self, rate_stage: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, entry)| entry.kind == NodeKind::Player && entry.output == Some(rate_stage))
            .map(|(id, _)| *id)
            .collect()
    }

    fn release_slot(&mut self, player: NodeId) -> Result<(), GraphError> {
        let Some(slot) = self.node(player)?.slot else {
            return Ok(());
        };

        let next = match self.link.as_mut() {
            Some(link) => {
                link.producer
                    .push(ControlMessage::StopVoice { slot })
                    .map_err(|_| GraphError::QueueFull)?;
                SlotState::Releasing
            }
            None => SlotState::Free,
        };
        self.slots[slot] = next;
        self.node_mut(player)?.slot = None;
        Ok(())
    }
}

impl AudioGraph for CpalGraph {
    fn attach(&mut self, node: NodeId, kind: NodeKind) -> Result<(), GraphError> {
        if node == NodeId::MAIN_MIXER || self.nodes.contains_key(&node) {
            return Err(GraphError::AlreadyAttached(node));
        }
        self.nodes.insert(node, HostNode::new(kind));
        Ok(())
    }

    fn detach(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.drain_released();
        let kind = self.node(node)?.kind;

        let players = match kind {
            NodeKind::Player => vec![node],
            NodeKind::RateStage => self.players_feeding(node),
        };
        for player in players {
            self.release_slot(player)?;
        }

        self.nodes.remove(&node);
        for entry in self.nodes.values_mut() {
            if entry.output == Some(node) {
                entry.output = None;
            }
        }
        Ok(())
    }

    fn connect(&mut self, from: NodeId, to: NodeId, _: StreamFormat) -> Result<(), GraphError> {
        let from_kind = self.node(from)?.kind;
        let to_kind = if to == NodeId::MAIN_MIXER {
            None
        } else {
            Some(self.node(to)?.kind)
        };
        check_connection(from, from_kind, to, to_kind)?;
        self.node_mut(from)?.output = Some(to);
        Ok(())
    }

    fn schedule_looping(&mut self, player: NodeId, buffer: SampleBuffer) -> Result<(), GraphError> {
        let entry = self.node_mut(player)?;
        if entry.kind != NodeKind::Player {
            return Err(GraphError::UnknownNode(player));
        }
        entry.scheduled = Some(buffer);
        Ok(())
    }

    fn play(&mut self, player: NodeId) -> Result<(), GraphError> {
        self.drain_released();

        let entry = self.node(player)?;
        if entry.slot.is_some() {
            return Ok(());
        }
        let sample = entry
            .scheduled
            .clone()
            .ok_or(GraphError::NothingScheduled(player))?;
        let rate = self.node(self.routed_rate_stage(player)?)?.rate;

        let link = self.link.as_mut().ok_or(GraphError::NotRunning)?;
        let sample =
            conform_to_output(&sample, link.output_channels).map_err(GraphError::ChannelLayout)?;
        let rate_scale = f64::from(sample.sample_rate) / f64::from(link.output_sample_rate);

        let slot = self
            .slots
            .iter()
            .position(|state| *state == SlotState::Free)
            .ok_or(GraphError::NoFreeVoice)?;

        self.params.set_rate(slot, rate);
        link.producer
            .push(ControlMessage::StartVoice {
                slot,
                sample,
                rate_scale,
            })
            .map_err(|_| GraphError::QueueFull)?;

        self.slots[slot] = SlotState::Busy(player);
        self.node_mut(player)?.slot = Some(slot);
        log::debug!("{player} playing in slot {slot} (rate {rate}, scale {rate_scale:.4})");
        Ok(())
    }

    fn stop(&mut self, player: NodeId) -> Result<(), GraphError> {
        self.drain_released();
        self.release_slot(player)
    }

    fn set_rate(&mut self, rate_stage: NodeId, rate: f32) -> Result<(), GraphError> {
        let entry = self.node_mut(rate_stage)?;
        if entry.kind != NodeKind::RateStage {
            return Err(GraphError::UnknownNode(rate_stage));
        }
        entry.rate = rate;

        for player in self.players_feeding(rate_stage) {
            if let Some(slot) = self.node(player)?.slot {
                self.params.set_rate(slot, rate);
            }
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), GraphError> {
        if self.link.is_some() {
            return Ok(());
        }

        let AudioStreamHandle { stream, link } =
            create_audio_stream(self.params.clone(), self.buffer_frames, self.ring_capacity)
                .map_err(|e| GraphError::Device(e.to_string()))?;
        start_stream(&stream).map_err(|e| GraphError::Device(e.to_string()))?;

        self.slots = [SlotState::Free; MAX_VOICES];
        self.link = Some(link);
        self.stream = Some(stream);
        Ok(())
    }

    fn stop_device(&mut self) {
        // Dropping the stream drops the mixer along with every buffer it still holds.
        self.stream = None;
        self.link = None;
        self.slots = [SlotState::Free; MAX_VOICES];
        for entry in self.nodes.values_mut() {
            entry.slot = None;
        }
    }

    fn is_running(&self) -> bool {
        self.link.is_some()
    }

    fn set_output_level(&mut self, linear: f32) {
        self.params.set_output_level(linear);
    }

    fn output_level(&self) -> f32 {
        self.params.output_level()
    }
}

#[cfg(test)]
mod tests {
    use rtrb::{Consumer, Producer, RingBuffer};

    use super::*;
    use crate::audio_engine::mixer::RtMixer;
    use crate::audio_engine::test_support::constant_sample;

    const FORMAT: StreamFormat = StreamFormat {
        sample_rate: 44_100,
        channels: 1,
    };

    fn routed() -> (CpalGraph, NodeId, NodeId) {
        let mut graph = CpalGraph::new(512, 64);
        let player = NodeId(1);
        let rate = NodeId(2);
        graph.attach(player, NodeKind::Player).unwrap();
        graph.attach(rate, NodeKind::RateStage).unwrap();
        graph.connect(player, rate, FORMAT).unwrap();
        graph.connect(rate, NodeId::MAIN_MIXER, FORMAT).unwrap();
        (graph, player, rate)
    }

    /// Audio-thread side of a [`RenderLink`], driven by hand.
    struct RenderSide {
        mixer: RtMixer,
        from_control: Consumer<ControlMessage>,
        to_control: Producer<AudioMessage>,
    }

    impl RenderSide {
        /// Handles every queued message, then renders one block.
        fn pump(&mut self) {
            while let Ok(message) = self.from_control.pop() {
                if let Some(reply) = self.mixer.handle_message(message) {
                    self.to_control.push(reply).unwrap();
                }
            }
            let mut block = [0.0f32; 64];
            self.mixer.render(&mut block);
        }
    }

    fn routed_with_render_side() -> (CpalGraph, RenderSide, NodeId, NodeId) {
        let (producer, from_control) = RingBuffer::new(64);
        let (to_control, consumer) = RingBuffer::new(64);
        let mut graph = CpalGraph::with_link(RenderLink {
            producer,
            consumer,
            output_channels: 1,
            output_sample_rate: 44_100,
        });
        let side = RenderSide {
            mixer: RtMixer::new(1, graph.params.clone()),
            from_control,
            to_control,
        };

        let player = NodeId(1);
        let rate = NodeId(2);
        graph.attach(player, NodeKind::Player).unwrap();
        graph.attach(rate, NodeKind::RateStage).unwrap();
        graph.connect(player, rate, FORMAT).unwrap();
        graph.connect(rate, NodeId::MAIN_MIXER, FORMAT).unwrap();
        graph
            .schedule_looping(player, constant_sample(1, 32, 0.5))
            .unwrap();
        (graph, side, player, rate)
    }

    #[test]
    fn test_slots_recycle_across_many_cycles() {
        let (mut graph, mut side, player, _) = routed_with_render_side();

        for _ in 0..MAX_VOICES * 3 {
            graph.play(player).unwrap();
            side.pump();
            assert_eq!(side.mixer.active_voices(), 1);
            graph.stop(player).unwrap();
            side.pump();
            assert_eq!(side.mixer.active_voices(), 0);
        }
        graph.play(player).unwrap();
        assert_eq!(graph.node(player).unwrap().slot, Some(0));
    }

    #[test]
    fn test_releasing_slot_not_reused_before_release() {
        let (mut graph, mut side, player, _) = routed_with_render_side();

        graph.play(player).unwrap();
        graph.stop(player).unwrap();
        assert_eq!(graph.slots[0], SlotState::Releasing);

        // The buffer has not come back yet, so slot 0 stays out of rotation.
        graph.play(player).unwrap();
        assert_eq!(graph.node(player).unwrap().slot, Some(1));

        side.pump();
        graph.stop(player).unwrap();
        side.pump();
        graph.play(player).unwrap();
        assert_eq!(graph.node(player).unwrap().slot, Some(0));
    }

    #[test]
    fn test_set_rate_reaches_playing_slot() {
        let (mut graph, mut side, player, rate) = routed_with_render_side();

        graph.set_rate(rate, 1.25).unwrap();
        graph.play(player).unwrap();
        side.pump();
        let slot = graph.node(player).unwrap().slot.unwrap();
        assert_eq!(graph.params.rate(slot), 1.25);

        graph.set_rate(rate, 1.75).unwrap();
        assert_eq!(graph.params.rate(slot), 1.75);
        assert_eq!(side.mixer.active_voices(), 1);
    }

    #[test]
    fn test_wiring_rules() {
        let (mut graph, player, rate) = routed();

        assert!(graph.connect(player, NodeId::MAIN_MIXER, FORMAT).is_err());
        assert!(graph.connect(rate, player, FORMAT).is_err());
        assert!(matches!(
            graph.attach(NodeId::MAIN_MIXER, NodeKind::Player),
            Err(GraphError::AlreadyAttached(_))
        ));
        assert!(matches!(
            graph.connect(NodeId(9), rate, FORMAT),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_play_requires_schedule_and_stream() {
        let (mut graph, player, _) = routed();

        assert!(matches!(
            graph.play(player),
            Err(GraphError::NothingScheduled(_))
        ));

        graph
            .schedule_looping(player, constant_sample(1, 8, 0.5))
            .unwrap();
        assert!(matches!(graph.play(player), Err(GraphError::NotRunning)));
        assert!(!graph.is_running());
    }

    #[test]
    fn test_play_requires_full_route() {
        let mut graph = CpalGraph::new(512, 64);
        let player = NodeId(1);
        graph.attach(player, NodeKind::Player).unwrap();
        graph
            .schedule_looping(player, constant_sample(1, 8, 0.5))
            .unwrap();

        assert!(matches!(
            graph.play(player),
            Err(GraphError::InvalidConnection { .. })
        ));
    }

    #[test]
    fn test_set_rate_only_on_rate_stage() {
        let (mut graph, player, rate) = routed();

        graph.set_rate(rate, 1.5).unwrap();
        assert_eq!(graph.node(rate).unwrap().rate, 1.5);
        assert!(graph.set_rate(player, 1.5).is_err());
    }

    #[test]
    fn test_detach_unlinks_upstream() {
        let (mut graph, player, rate) = routed();

        graph.detach(rate).unwrap();

        assert_eq!(graph.node(player).unwrap().output, None);
        assert!(matches!(graph.detach(rate), Err(GraphError::UnknownNode(_))));
        graph.detach(player).unwrap();
        assert!(graph.nodes.is_empty());
    }

    #[test]
    fn test_output_level_survives_device_restart() {
        let mut graph = CpalGraph::new(512, 64);
        graph.set_output_level(0.25);
        graph.stop_device();

        assert_eq!(graph.output_level(), 0.25);
        assert!(!graph.is_running());
    }
}
