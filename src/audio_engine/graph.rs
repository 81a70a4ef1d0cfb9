//! Audio graph abstraction.
//!
//! [`AudioGraph`] is the host API the engine drives: nodes are attached, wired
//! player → rate stage → main mixer, and fed looping buffers. [`AudioGraphEngine`] owns one
//! graph behind a single lock, so topology changes from different pads never race on the
//! device connection, and it owns the lazy start policy of the output device.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::audio_engine::constants::START_ATTEMPTS;
use crate::audio_engine::errors::{EngineError, GraphError};
use crate::messages::SampleBuffer;

/// Identifier of a node in the audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// The shared mix point every voice routes into.
    pub const MAIN_MIXER: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::MAIN_MIXER {
            f.write_str("#main-mixer")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Plays a scheduled buffer.
    Player,
    /// Changes playback speed (and pitch) by a factor.
    RateStage,
}

/// Format of the audio flowing over a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

/// Checks that `from -> to` is one of the two hops of a voice route: player into a rate
/// stage, or rate stage into the main mixer. `to_kind` is `None` for the main mixer.
pub(crate) fn check_connection(
    from: NodeId,
    from_kind: NodeKind,
    to: NodeId,
    to_kind: Option<NodeKind>,
) -> Result<(), GraphError> {
    let valid = match from_kind {
        NodeKind::Player => to_kind == Some(NodeKind::RateStage),
        NodeKind::RateStage => to == NodeId::MAIN_MIXER,
    };
    if valid {
        Ok(())
    } else {
        Err(GraphError::InvalidConnection {
            from,
            to,
            reason: "voices route player -> rate stage -> main mixer",
        })
    }
}

/// Host audio graph API.
///
/// Implementations are driven from the control thread only. Anything they share with a
/// render callback must be exchanged without blocking that callback.
pub trait AudioGraph: Send {
    fn attach(&mut self, node: NodeId, kind: NodeKind) -> Result<(), GraphError>;

    /// Removes a node. A player that is still playing is stopped first.
    fn detach(&mut self, node: NodeId) -> Result<(), GraphError>;

    fn connect(&mut self, from: NodeId, to: NodeId, format: StreamFormat)
    -> Result<(), GraphError>;

    /// Schedules `buffer` on `player`, looping from frame 0 whenever it reaches its end.
    fn schedule_looping(&mut self, player: NodeId, buffer: SampleBuffer)
    -> Result<(), GraphError>;

    fn play(&mut self, player: NodeId) -> Result<(), GraphError>;

    fn stop(&mut self, player: NodeId) -> Result<(), GraphError>;

    /// Sets the rate coefficient of a rate stage without touching playback position.
    fn set_rate(&mut self, rate_stage: NodeId, rate: f32) -> Result<(), GraphError>;

    /// Starts the output device.
    fn start(&mut self) -> Result<(), GraphError>;

    fn stop_device(&mut self);

    fn is_running(&self) -> bool;

    /// Sets the main mixer output level (linear).
    fn set_output_level(&mut self, linear: f32);

    fn output_level(&self) -> f32;
}

struct GraphState {
    graph: Box<dyn AudioGraph>,
    unavailable: Option<String>,
}

/// Owner of the audio graph and its output device connection.
pub struct AudioGraphEngine {
    state: Mutex<GraphState>,
    next_node: AtomicU64,
}

impl AudioGraphEngine {
    pub fn new(graph: Box<dyn AudioGraph>) -> Self {
        Self {
            state: Mutex::new(GraphState {
                graph,
                unavailable: None,
            }),
            next_node: AtomicU64::new(NodeId::MAIN_MIXER.0 + 1),
        }
    }

    /// Hands out a fresh node identifier.
    pub fn allocate_node(&self) -> NodeId {
        NodeId(self.next_node.fetch_add(1, Ordering::Relaxed))
    }

    pub fn main_mixer(&self) -> NodeId {
        NodeId::MAIN_MIXER
    }

    pub fn attach(&self, node: NodeId, kind: NodeKind) -> Result<(), GraphError> {
        log::debug!("attach {node} ({kind:?})");
        self.lock().graph.attach(node, kind)
    }

    pub fn detach(&self, node: NodeId) -> Result<(), GraphError> {
        log::debug!("detach {node}");
        self.lock().graph.detach(node)
    }

    pub fn connect(
        &self,
        from: NodeId,
        to: NodeId,
        format: StreamFormat,
    ) -> Result<(), GraphError> {
        log::debug!(
            "connect {from} -> {to} ({} ch@{} Hz)",
            format.channels,
            format.sample_rate
        );
        self.lock().graph.connect(from, to, format)
    }

    pub fn schedule_looping(&self, player: NodeId, buffer: SampleBuffer) -> Result<(), GraphError> {
        self.lock().graph.schedule_looping(player, buffer)
    }

    pub fn play(&self, player: NodeId) -> Result<(), GraphError> {
        self.lock().graph.play(player)
    }

    pub fn stop(&self, player: NodeId) -> Result<(), GraphError> {
        self.lock().graph.stop(player)
    }

    pub fn set_rate(&self, rate_stage: NodeId, rate: f32) -> Result<(), GraphError> {
        self.lock().graph.set_rate(rate_stage, rate)
    }

    /// Starts the output device unless it is already running.
    ///
    /// A failed start is retried once. If the retry fails too, the engine is disabled for the
    /// rest of the session and every later call returns the same
    /// [`EngineError::EngineUnavailable`] without touching the device.
    pub fn ensure_running(&self) -> Result<(), EngineError> {
        let mut state = self.lock();
        if let Some(reason) = &state.unavailable {
            return Err(EngineError::EngineUnavailable(reason.clone()));
        }
        if state.graph.is_running() {
            return Ok(());
        }

        let mut last_error = None;
        for attempt in 1..=START_ATTEMPTS {
            match state.graph.start() {
                Ok(()) => {
                    log::info!("Audio graph running (attempt {attempt})");
                    return Ok(());
                }
                Err(err) => {
                    log::warn!("Failed to start audio graph (attempt {attempt}): {err}");
                    last_error = Some(err);
                }
            }
        }

        let reason = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "device did not start".to_string());
        log::error!("Audio engine disabled for this session: {reason}");
        state.unavailable = Some(reason.clone());
        Err(EngineError::EngineUnavailable(reason))
    }

    /// Fails fast when an earlier start already disabled the engine.
    pub fn check_available(&self) -> Result<(), EngineError> {
        match &self.lock().unavailable {
            Some(reason) => Err(EngineError::EngineUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().graph.is_running()
    }

    /// Sets the main mixer level. Only the gain controller calls this.
    pub(crate) fn set_output_level(&self, linear: f32) {
        self.lock().graph.set_output_level(linear);
    }

    pub fn output_level(&self) -> f32 {
        self.lock().graph.output_level()
    }

    /// Stops the output device. The next [`ensure_running`](Self::ensure_running) restarts it.
    pub fn shut_down(&self) {
        self.lock().graph.stop_device();
    }

    fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
