//! Chain switching strategies.
//!
//! Two ways of making one chain audible exist on the peer: enabling and
//! disabling the devices on a chain, or soloing the chain. Both present
//! the same contract to the manager; one is picked at construction.

use rosc::OscType;
use serde::{Deserialize, Serialize};

use chainsel_osc::OscClient;
use chainsel_types::RackDevice;

pub const SET_DEVICES_ENABLED_ADDR: &str = "/live/chain/set/devices_enabled";
pub const SET_SOLO_ADDR: &str = "/live/chain/set/solo";
pub const ENABLED_FLAGS_ADDR: &str = "/live/device/get/chains/devices_enabled";
pub const SOLO_FLAGS_ADDR: &str = "/live/device/get/chains/solo";

/// Which switching strategy to construct. Persisted in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SwitchMode {
    #[default]
    Enable,
    Solo,
}

pub fn make_strategy(mode: SwitchMode) -> Box<dyn ChainSwitching> {
    match mode {
        SwitchMode::Enable => Box::new(DeviceEnableSwitching),
        SwitchMode::Solo => Box::new(SoloSwitching),
    }
}

/// How a chain is made audible and silenced again.
pub trait ChainSwitching {
    /// Query address whose per-chain flags reveal the active chain on
    /// reload.
    fn flags_address(&self) -> &'static str;
    /// Make the chain at `index` audible.
    fn activate(&self, osc: &OscClient, rack: &RackDevice, index: i32);
    /// Silence a previously active chain.
    fn deactivate(&self, osc: &OscClient, rack: &RackDevice, index: i32);
    /// Align every chain's flags with `active` after a reload.
    fn apply_reloaded(&self, osc: &OscClient, rack: &RackDevice, chain_count: usize, active: i32);
}

fn chain_args(rack: &RackDevice, index: i32, value: i32) -> Vec<OscType> {
    vec![
        OscType::Int(rack.track_id),
        OscType::Int(rack.device_id),
        OscType::Int(index),
        OscType::Int(value),
    ]
}

/// Switches by enabling the devices on the target chain and disabling
/// the previous chain's.
pub struct DeviceEnableSwitching;

impl ChainSwitching for DeviceEnableSwitching {
    fn flags_address(&self) -> &'static str {
        ENABLED_FLAGS_ADDR
    }

    fn activate(&self, osc: &OscClient, rack: &RackDevice, index: i32) {
        osc.send(SET_DEVICES_ENABLED_ADDR, chain_args(rack, index, 1));
    }

    fn deactivate(&self, osc: &OscClient, rack: &RackDevice, index: i32) {
        osc.send(SET_DEVICES_ENABLED_ADDR, chain_args(rack, index, 0));
    }

    fn apply_reloaded(&self, osc: &OscClient, rack: &RackDevice, chain_count: usize, active: i32) {
        // Enable only the active chain; clear leftover solo state too.
        for i in 0..chain_count as i32 {
            osc.send(
                SET_DEVICES_ENABLED_ADDR,
                chain_args(rack, i, i32::from(i == active)),
            );
            osc.send(SET_SOLO_ADDR, chain_args(rack, i, 0));
        }
    }
}

/// Switches by soloing the target chain.
pub struct SoloSwitching;

impl ChainSwitching for SoloSwitching {
    fn flags_address(&self) -> &'static str {
        SOLO_FLAGS_ADDR
    }

    fn activate(&self, osc: &OscClient, rack: &RackDevice, index: i32) {
        osc.send(SET_SOLO_ADDR, chain_args(rack, index, 1));
    }

    fn deactivate(&self, osc: &OscClient, rack: &RackDevice, index: i32) {
        osc.send(SET_SOLO_ADDR, chain_args(rack, index, 0));
    }

    fn apply_reloaded(&self, osc: &OscClient, rack: &RackDevice, chain_count: usize, active: i32) {
        // Solo only the active chain; re-enable devices everywhere so
        // the solo flags alone decide audibility.
        for i in 0..chain_count as i32 {
            osc.send(SET_SOLO_ADDR, chain_args(rack, i, i32::from(i == active)));
            osc.send(SET_DEVICES_ENABLED_ADDR, chain_args(rack, i, 1));
        }
    }
}
