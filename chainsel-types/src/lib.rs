//! Shared data model for chainsel.
//!
//! Plain serializable types used across the transport, chain, and MIDI
//! crates. No behavior lives here beyond constructors and accessors.

use serde::{Deserialize, Serialize};

/// Liveness of the link to the remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// One chain-capable device on the peer, identified by track and device index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackDevice {
    pub track_id: i32,
    pub track_name: String,
    pub device_id: i32,
    pub device_name: String,
}

impl RackDevice {
    /// A rack reference carrying only the ids, as restored from config.
    pub fn from_ids(track_id: i32, device_id: i32) -> Self {
        Self {
            track_id,
            track_name: String::new(),
            device_id,
            device_name: String::new(),
        }
    }
}

/// One selectable branch inside a rack.
///
/// `index` is assigned by the peer and is the join key for every command
/// and notification; it is never renumbered locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub index: i32,
    pub name: String,
    pub color_index: i32,
    pub is_active: bool,
}

/// Snapshot of the chain mirror for one rack.
///
/// At most one chain carries `is_active`, and `active_chain_index` is -1
/// when none is selected. Consumers treat each snapshot as a full
/// replacement, never a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub chains: Vec<Chain>,
    pub active_chain_index: i32,
    pub rack: Option<RackDevice>,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            chains: Vec::new(),
            active_chain_index: -1,
            rack: None,
        }
    }
}

/// Persisted pad-to-navigation mapping. Unset notes never match.
/// Channels are the raw 0-based MIDI channel nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiPadConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_note: Option<u8>,
    pub prev_channel: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_note: Option<u8>,
    pub next_channel: u8,
}

impl Default for MidiPadConfig {
    fn default() -> Self {
        Self {
            prev_note: None,
            prev_channel: 0,
            next_note: None,
            next_channel: 0,
        }
    }
}

/// Which navigation direction a learn session is armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnTarget {
    Previous,
    Next,
}
