//! Audio-specific error types.

use thiserror::Error;

use crate::audio_engine::graph::NodeId;

/// Errors that can occur while loading samples.
#[derive(Debug, Error)]
pub enum SampleLoadError {
    /// No resource is registered under the requested name.
    #[error("sample resource not found: {name}")]
    ResourceNotFound {
        /// The requested sample name.
        name: String,
    },

    /// Failed to read the resource.
    #[error("failed to read sample resource: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the audio data.
    #[error("failed to decode audio data: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Audio data has no default track.
    #[error("audio data has no default track")]
    NoDefaultTrack,

    /// Audio data is missing sample rate information.
    #[error("audio data is missing a sample rate")]
    MissingSampleRate,

    /// Audio data is missing channel information.
    #[error("audio data is missing channel information")]
    MissingChannels,

    /// Audio data decoded to zero frames.
    #[error("audio data contains no frames")]
    EmptySample,

    /// Unsupported channel mapping configuration.
    #[error(
        "unsupported channel mapping: file has {file_channels} channels, output has {output_channels} channels (only mono↔stereo supported)"
    )]
    UnsupportedChannels {
        /// Number of channels in the source file.
        file_channels: usize,
        /// Number of channels expected for output.
        output_channels: usize,
    },
}

impl SampleLoadError {
    /// Returns true if the resource was malformed rather than missing.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::NoDefaultTrack
                | Self::MissingSampleRate
                | Self::MissingChannels
                | Self::EmptySample
        )
    }
}

/// Errors reported by a host audio graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node {0} is not attached")]
    UnknownNode(NodeId),

    #[error("node {0} is already attached")]
    AlreadyAttached(NodeId),

    #[error("cannot connect {from} to {to}: {reason}")]
    InvalidConnection {
        from: NodeId,
        to: NodeId,
        reason: &'static str,
    },

    #[error("no buffer scheduled on player {0}")]
    NothingScheduled(NodeId),

    #[error("audio graph is not running")]
    NotRunning,

    #[error("no free render voice")]
    NoFreeVoice,

    #[error("render queue is full")]
    QueueFull,

    #[error("unsupported channel layout: {0}")]
    ChannelLayout(SampleLoadError),

    #[error("audio device error: {0}")]
    Device(String),
}

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The output device could not be started and the engine is disabled for
    /// the rest of the session.
    #[error("audio engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    SampleLoad(#[from] SampleLoadError),

    #[error("unknown pad: {0}")]
    UnknownPad(String),
}
