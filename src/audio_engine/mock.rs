//! A mock audio graph. Doesn't actually play anything.
//!
//! It enforces the same wiring rules as the cpal backend and records every call, so it backs
//! headless runs (`device = "mock"`) as well as the engine tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::audio_engine::errors::GraphError;
use crate::audio_engine::graph::{AudioGraph, NodeId, NodeKind, StreamFormat, check_connection};
use crate::messages::SampleBuffer;

#[derive(Debug, Default)]
struct MockNode {
    kind: Option<NodeKind>,
    output: Option<NodeId>,
    scheduled: Option<SampleBuffer>,
    rate: f32,
    playing: bool,
}

#[derive(Debug)]
struct MockState {
    running: bool,
    output_level: f32,
    nodes: HashMap<NodeId, MockNode>,
    start_calls: usize,
    schedule_calls: usize,
    play_calls: usize,
    stop_calls: usize,
    failing_starts: usize,
    fail_detach: bool,
}

/// Mock graph handle. Clones share the same state.
#[derive(Clone)]
pub struct Graph {
    state: Arc<Mutex<MockState>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                running: false,
                output_level: 1.0,
                nodes: HashMap::new(),
                start_calls: 0,
                schedule_calls: 0,
                play_calls: 0,
                stop_calls: 0,
                failing_starts: 0,
                fail_detach: false,
            })),
        }
    }

    /// Makes the next `count` device starts fail.
    pub fn fail_next_starts(&self, count: usize) {
        self.lock().failing_starts = count;
    }

    /// Makes every detach fail while leaving the node attached.
    pub fn fail_detaches(&self, fail: bool) {
        self.lock().fail_detach = fail;
    }

    pub fn attached_count(&self, kind: NodeKind) -> usize {
        self.lock()
            .nodes
            .values()
            .filter(|node| node.kind == Some(kind))
            .count()
    }

    /// Number of players currently playing.
    pub fn playing_count(&self) -> usize {
        self.lock().nodes.values().filter(|node| node.playing).count()
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.lock().nodes.contains_key(&node)
    }

    /// Rates of every attached rate stage.
    pub fn rates(&self) -> Vec<f32> {
        self.lock()
            .nodes
            .values()
            .filter(|node| node.kind == Some(NodeKind::RateStage))
            .map(|node| node.rate)
            .collect()
    }

    pub fn start_calls(&self) -> usize {
        self.lock().start_calls
    }

    pub fn schedule_calls(&self) -> usize {
        self.lock().schedule_calls
    }

    pub fn play_calls(&self) -> usize {
        self.lock().play_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.lock().stop_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockState {
    fn node_mut(&mut self, node: NodeId) -> Result<&mut MockNode, GraphError> {
        self.nodes
            .get_mut(&node)
            .ok_or(GraphError::UnknownNode(node))
    }

    fn kind_of(&self, node: NodeId) -> Result<NodeKind, GraphError> {
        self.nodes
            .get(&node)
            .and_then(|entry| entry.kind)
            .ok_or(GraphError::UnknownNode(node))
    }
}

impl AudioGraph for Graph {
    fn attach(&mut self, node: NodeId, kind: NodeKind) -> Result<(), GraphError> {
        let mut state = self.lock();
        if node == NodeId::MAIN_MIXER || state.nodes.contains_key(&node) {
            return Err(GraphError::AlreadyAttached(node));
        }
        state.nodes.insert(
            node,
            MockNode {
                kind: Some(kind),
                rate: 1.0,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn detach(&mut self, node: NodeId) -> Result<(), GraphError> {
        let mut state = self.lock();
        if !state.nodes.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        if state.fail_detach {
            return Err(GraphError::Device(format!("mock refused to detach {node}")));
        }
        state.nodes.remove(&node);
        for entry in state.nodes.values_mut() {
            if entry.output == Some(node) {
                entry.output = None;
                entry.playing = false;
            }
        }
        Ok(())
    }

    fn connect(&mut self, from: NodeId, to: NodeId, _: StreamFormat) -> Result<(), GraphError> {
        let mut state = self.lock();
        let from_kind = state.kind_of(from)?;
        let to_kind = if to == NodeId::MAIN_MIXER {
            None
        } else {
            Some(state.kind_of(to)?)
        };
        check_connection(from, from_kind, to, to_kind)?;
        state.node_mut(from)?.output = Some(to);
        Ok(())
    }

    fn schedule_looping(&mut self, player: NodeId, buffer: SampleBuffer) -> Result<(), GraphError> {
        let mut state = self.lock();
        state.schedule_calls += 1;
        state.node_mut(player)?.scheduled = Some(buffer);
        Ok(())
    }

    fn play(&mut self, player: NodeId) -> Result<(), GraphError> {
        let mut state = self.lock();
        state.play_calls += 1;
        if !state.running {
            return Err(GraphError::NotRunning);
        }
        let entry = state.node_mut(player)?;
        if entry.scheduled.is_none() {
            return Err(GraphError::NothingScheduled(player));
        }
        entry.playing = true;
        Ok(())
    }

    fn stop(&mut self, player: NodeId) -> Result<(), GraphError> {
        let mut state = self.lock();
        state.stop_calls += 1;
        state.node_mut(player)?.playing = false;
        Ok(())
    }

    fn set_rate(&mut self, rate_stage: NodeId, rate: f32) -> Result<(), GraphError> {
        let mut state = self.lock();
        if state.kind_of(rate_stage)? != NodeKind::RateStage {
            return Err(GraphError::UnknownNode(rate_stage));
        }
        state.node_mut(rate_stage)?.rate = rate;
        Ok(())
    }

    fn start(&mut self) -> Result<(), GraphError> {
        let mut state = self.lock();
        state.start_calls += 1;
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(GraphError::Device("mock device failed to start".to_string()));
        }
        state.running = true;
        Ok(())
    }

    fn stop_device(&mut self) {
        let mut state = self.lock();
        state.running = false;
        for entry in state.nodes.values_mut() {
            entry.playing = false;
        }
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }

    fn set_output_level(&mut self, linear: f32) {
        self.lock().output_level = linear;
    }

    fn output_level(&self) -> f32 {
        self.lock().output_level
    }
}
