//! Pad identifiers and the published pad state.

use std::fmt;
use std::str::FromStr;

use crate::audio_engine::constants::{NUM_PADS, PAD_LABELS};
use crate::audio_engine::errors::EngineError;

/// Stable identifier for one of the fixed pads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadId(usize);

impl PadId {
    /// Returns the pad at `index`, or `None` when out of range.
    pub fn new(index: usize) -> Option<Self> {
        (index < NUM_PADS).then_some(Self(index))
    }

    /// Iterates over every pad in index order.
    pub fn all() -> impl Iterator<Item = PadId> {
        (0..NUM_PADS).map(Self)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// Grid label, e.g. `"A1"`.
    pub fn label(self) -> &'static str {
        PAD_LABELS[self.0]
    }

    /// Name of the sample resource backing this pad.
    pub fn sample_name(self) -> &'static str {
        self.label()
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PadId {
    type Err = EngineError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        PAD_LABELS
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(label.trim()))
            .map(Self)
            .ok_or_else(|| EngineError::UnknownPad(label.to_string()))
    }
}

/// Pad state as observed by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadState {
    #[default]
    Stopped,
    Playing,
}

impl PadState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Playing => "playing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_in_index_order() {
        let labels: Vec<String> = PadId::all().map(|pad| pad.to_string()).collect();
        assert_eq!(labels, PAD_LABELS);

        for pad in PadId::all() {
            assert_eq!(pad.label().parse::<PadId>().unwrap(), pad);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("d2".parse::<PadId>().unwrap().index(), 7);
    }

    #[test]
    fn test_parse_unknown_label() {
        let result = "E1".parse::<PadId>();
        assert!(matches!(result, Err(EngineError::UnknownPad(label)) if label == "E1"));
    }

    #[test]
    fn test_new_out_of_range() {
        assert!(PadId::new(NUM_PADS).is_none());
        assert_eq!(PadId::new(0).unwrap().label(), "A1");
    }
}
