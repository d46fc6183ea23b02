//! Chain state management for one rack device.

pub mod discovery;
pub mod manager;
pub mod strategy;

pub use discovery::discover;
pub use manager::ChainManager;
pub use strategy::{make_strategy, ChainSwitching, DeviceEnableSwitching, SoloSwitching, SwitchMode};

use rosc::OscType;

/// Integer view of one reply argument. Malformed values default to 0 so
/// a partially usable peer state survives a ragged reply.
pub(crate) fn int_arg(arg: &OscType) -> i32 {
    match arg {
        OscType::Int(v) => *v,
        OscType::Long(v) => *v as i32,
        OscType::Float(v) => *v as i32,
        OscType::Double(v) => *v as i32,
        OscType::Bool(v) => i32::from(*v),
        _ => 0,
    }
}

/// String view of one reply argument; non-strings default to empty.
pub(crate) fn string_arg(arg: &OscType) -> String {
    match arg {
        OscType::String(s) => s.clone(),
        _ => String::new(),
    }
}
