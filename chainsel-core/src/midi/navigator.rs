//! Pad-to-navigation mapping with an interactive learn mode.

use log::info;

use chainsel_types::{LearnTarget, MidiPadConfig};

use super::input::MidiMessage;

/// What the caller should do with a handled hardware event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigatorOutput {
    /// Navigate to the previous chain.
    Previous,
    /// Navigate to the next chain.
    Next,
    /// A learn session captured a new mapping; persist it.
    LearnComplete {
        target: LearnTarget,
        config: MidiPadConfig,
    },
}

/// Maps note-on events to navigation actions.
///
/// Holds up to two (note, channel) pairs; unset slots never match. The
/// navigator returns actions instead of driving the chain manager
/// itself, so it stays a pure mapping.
pub struct PadNavigator {
    config: MidiPadConfig,
    learn_target: Option<LearnTarget>,
}

impl PadNavigator {
    pub fn new(config: MidiPadConfig) -> Self {
        Self {
            config,
            learn_target: None,
        }
    }

    pub fn config(&self) -> MidiPadConfig {
        self.config
    }

    pub fn set_config(&mut self, config: MidiPadConfig) {
        self.config = config;
    }

    pub fn is_learning(&self) -> bool {
        self.learn_target.is_some()
    }

    /// Arm learn mode: the next note-on is captured for `target`.
    /// Starting a new session replaces an unfinished one.
    pub fn start_learn(&mut self, target: LearnTarget) {
        info!(target: "midi", "learn armed: {:?}", target);
        self.learn_target = Some(target);
    }

    /// Disarm without capturing.
    pub fn stop_learn(&mut self) {
        self.learn_target = None;
    }

    /// Feed one hardware event through the mapping.
    ///
    /// Only note-on events participate. While learning the event is
    /// captured and learn mode disarms itself; otherwise the previous
    /// mapping is checked before the next one. Note and channel must
    /// both match exactly; velocity is ignored.
    pub fn handle_message(&mut self, msg: &MidiMessage) -> Option<NavigatorOutput> {
        let MidiMessage::NoteOn { channel, note, .. } = *msg else {
            return None;
        };

        if let Some(target) = self.learn_target.take() {
            match target {
                LearnTarget::Previous => {
                    self.config.prev_note = Some(note);
                    self.config.prev_channel = channel;
                }
                LearnTarget::Next => {
                    self.config.next_note = Some(note);
                    self.config.next_channel = channel;
                }
            }
            info!(
                target: "midi",
                "learn captured note {} channel {} for {:?}",
                note, channel, target
            );
            return Some(NavigatorOutput::LearnComplete {
                target,
                config: self.config,
            });
        }

        if self.config.prev_note == Some(note) && self.config.prev_channel == channel {
            Some(NavigatorOutput::Previous)
        } else if self.config.next_note == Some(note) && self.config.next_channel == channel {
            Some(NavigatorOutput::Next)
        } else {
            None
        }
    }
}
