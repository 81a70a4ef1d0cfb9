//! Engine configuration.

use std::path::PathBuf;

/// Output backend the engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputDevice {
    /// The host's default output device, through cpal.
    #[default]
    Default,
    /// The mock graph. Nothing is audible.
    Mock,
}

impl OutputDevice {
    /// Parses `"default"` or `"mock"`, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("default") {
            Some(Self::Default)
        } else if name.eq_ignore_ascii_case("mock") {
            Some(Self::Mock)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Directory holding one `<label>.<sample_extension>` file per pad.
    pub sample_dir: PathBuf,
    pub sample_extension: String,
    pub device: OutputDevice,
    /// Requested callback size in frames.
    pub buffer_frames: u32,
    /// Capacity of each message ring between control and audio thread.
    pub ring_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_dir: PathBuf::from("samples"),
            sample_extension: "wav".to_string(),
            device: OutputDevice::Default,
            buffer_frames: 512,
            ring_capacity: 1024,
        }
    }
}
