//! Audio Stream Module
//!
//! This module handles CPAL audio stream management including:
//! - Stream initialization and configuration
//! - Audio callback setup
//! - Real-time message processing

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use env_logger::{Builder, Env};
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;

use crate::audio_engine::constants::MAX_VOICES;
use crate::audio_engine::mixer::{RtMixer, SharedParams};
use crate::messages::{AudioMessage, ControlMessage};

/// Control-side ends of the message rings and the format the render side runs at.
pub struct RenderLink {
    pub producer: Producer<ControlMessage>,
    pub consumer: Consumer<AudioMessage>,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Handle to the audio stream with associated message channels
pub struct AudioStreamHandle {
    pub stream: Stream,
    pub link: RenderLink,
}

/// Setup and configure the logger for audio operations
pub fn setup_logger() {
    // Users can override via `RUST_LOG`, e.g. `RUST_LOG=debug` to trace graph operations.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init()
        .unwrap_or(()); // Ignore initialization errors
}

/// Create and configure the audio stream
///
/// This function:
/// 1. Sets up the default audio device
/// 2. Creates ring buffers for message passing
/// 3. Initializes the mixer on top of `params`
/// 4. Builds and returns the (paused) audio stream
pub fn create_audio_stream(
    params: Arc<SharedParams>,
    buffer_frames: u32,
    ring_capacity: usize,
) -> Result<AudioStreamHandle, Box<dyn std::error::Error>> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or("No audio device found")?;

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate();
    let channels = config.channels();

    log::info!("Opening output stream ({channels} ch@{sample_rate} Hz, {buffer_frames} frames)");

    // Each slot has at most one reply in flight, so the return ring never fills.
    let ring_capacity = ring_capacity.max(MAX_VOICES);

    // Control -> render
    let (producer_in, mut consumer_in) = RingBuffer::new(ring_capacity);

    // Render -> control
    let (mut producer_out, consumer_out) = RingBuffer::new(ring_capacity);

    let mut mixer = RtMixer::new(channels as usize, params);

    let stream_config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: BufferSize::Fixed(buffer_frames),
    };

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            while let Ok(message) = consumer_in.pop() {
                if let Some(reply) = mixer.handle_message(message) {
                    let _ = producer_out.push(reply);
                }
            }

            mixer.render(data);
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )?;

    Ok(AudioStreamHandle {
        stream,
        link: RenderLink {
            producer: producer_in,
            consumer: consumer_out,
            output_channels: channels as usize,
            output_sample_rate: sample_rate,
        },
    })
}

/// Start playing the audio stream
pub fn start_stream(stream: &Stream) -> Result<(), Box<dyn std::error::Error>> {
    stream.play()?;
    Ok(())
}
