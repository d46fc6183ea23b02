//! OSC transport for chainsel.
//!
//! A bidirectional UDP client with heartbeat-based liveness detection,
//! and an exact-address router that fans inbound messages out to
//! subscribers.

pub mod client;
pub mod router;

pub use client::{
    OscClient, RequestError, Timing, DEFAULT_RECEIVE_PORT, DEFAULT_SEND_PORT, LISTEN_ADDR,
    TEST_ADDR, UNLISTEN_ADDR,
};
pub use router::{OscRouter, Route};
