//! MIDI input and pad navigation.

pub mod input;
pub mod navigator;

pub use input::{parse_midi_message, MidiInputManager, MidiMessage, MidiPortInfo};
pub use navigator::{NavigatorOutput, PadNavigator};
