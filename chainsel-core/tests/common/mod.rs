#![allow(dead_code)]
//! Test harness utilities for chainsel-core integration tests.
//!
//! `StubLive` is a peer speaking the chain protocol over a real UDP
//! socket: it answers liveness probes, serves chain queries from a
//! mutable rack model, records every command it receives, and can push
//! unsolicited notifications at the client.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rosc::{OscMessage, OscPacket, OscType};

use chainsel_core::chain::discovery::{
    CAN_HAVE_CHAINS_ADDR, DEVICE_NAMES_ADDR, NUM_TRACKS_ADDR, TRACK_NAME_ADDR,
};
use chainsel_core::chain::manager::{
    CHAIN_COLORS_ADDR, CHAIN_NAMES_ADDR, SELECTED_CHAIN_ADDR, SET_SELECTED_CHAIN_ADDR,
};
use chainsel_core::chain::strategy::{
    ENABLED_FLAGS_ADDR, SET_DEVICES_ENABLED_ADDR, SET_SOLO_ADDR, SOLO_FLAGS_ADDR,
};
use chainsel_core::chain::ChainManager;
use chainsel_osc::{OscClient, OscRouter, Timing, LISTEN_ADDR, TEST_ADDR};
use chainsel_types::ConnectionStatus;

/// The peer's picture of one rack, served to queries.
#[derive(Clone)]
pub struct PeerRack {
    pub track_id: i32,
    pub device_id: i32,
    pub names: Vec<String>,
    pub colors: Vec<i32>,
    pub enabled: Vec<i32>,
    pub solo: Vec<i32>,
    pub selected: i32,
}

impl PeerRack {
    pub fn new(track_id: i32, device_id: i32, names: &[&str]) -> Self {
        Self {
            track_id,
            device_id,
            names: names.iter().map(|s| s.to_string()).collect(),
            colors: (0..names.len() as i32).collect(),
            enabled: vec![0; names.len()],
            solo: vec![0; names.len()],
            selected: 0,
        }
    }
}

/// One track served to discovery queries: name plus (device name,
/// can-have-chains) pairs.
#[derive(Clone)]
pub struct PeerTrack {
    pub name: String,
    pub devices: Vec<(String, bool)>,
}

pub struct StubLive {
    pub port: u16,
    pub rack: Arc<Mutex<PeerRack>>,
    pub tracks: Arc<Mutex<Vec<PeerTrack>>>,
    received: Arc<Mutex<Vec<OscMessage>>>,
    last_client: Arc<Mutex<Option<SocketAddr>>>,
    socket: UdpSocket,
    stop: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

impl StubLive {
    pub fn spawn(rack: PeerRack) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();
        let server = socket.try_clone().unwrap();

        let rack = Arc::new(Mutex::new(rack));
        let tracks = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let last_client = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let rack = Arc::clone(&rack);
            let tracks = Arc::clone(&tracks);
            let received = Arc::clone(&received);
            let last_client = Arc::clone(&last_client);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                serve(server, rack, tracks, received, last_client, stop);
            })
        };

        Self {
            port,
            rack,
            tracks,
            received,
            last_client,
            socket,
            stop,
            _thread: thread,
        }
    }

    /// Push an unsolicited notification at the registered client.
    pub fn push(&self, addr: &str, args: Vec<OscType>) {
        let target = *self.last_client.lock().unwrap();
        if let Some(to) = target {
            send_message(&self.socket, to, addr, args);
        }
    }

    /// All messages received so far on `addr`, in arrival order.
    pub fn received_on(&self, addr: &str) -> Vec<OscMessage> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.addr == addr)
            .cloned()
            .collect()
    }

    /// Messages whose address is in `addrs`, in arrival order.
    pub fn received_matching(&self, addrs: &[&str]) -> Vec<OscMessage> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| addrs.contains(&m.addr.as_str()))
            .cloned()
            .collect()
    }

    pub fn clear_received(&self) {
        self.received.lock().unwrap().clear();
    }
}

impl Drop for StubLive {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn serve(
    socket: UdpSocket,
    rack: Arc<Mutex<PeerRack>>,
    tracks: Arc<Mutex<Vec<PeerTrack>>>,
    received: Arc<Mutex<Vec<OscMessage>>>,
    last_client: Arc<Mutex<Option<SocketAddr>>>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 4096];
    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let (n, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(_) => continue,
        };
        let Ok((_, OscPacket::Message(msg))) = rosc::decoder::decode_udp(&buf[..n]) else {
            continue;
        };
        received.lock().unwrap().push(msg.clone());

        let addr = msg.addr.as_str();
        match addr {
            LISTEN_ADDR | TEST_ADDR => {
                *last_client.lock().unwrap() = Some(src);
                send_message(&socket, src, addr, vec![OscType::Int(1)]);
            }
            CHAIN_NAMES_ADDR => {
                let r = rack.lock().unwrap();
                let mut args = ids(&r);
                args.extend(r.names.iter().map(|s| OscType::String(s.clone())));
                send_message(&socket, src, addr, args);
            }
            CHAIN_COLORS_ADDR => {
                let r = rack.lock().unwrap();
                let mut args = ids(&r);
                args.extend(r.colors.iter().map(|&c| OscType::Int(c)));
                send_message(&socket, src, addr, args);
            }
            ENABLED_FLAGS_ADDR => {
                let r = rack.lock().unwrap();
                let mut args = ids(&r);
                args.extend(r.enabled.iter().map(|&f| OscType::Int(f)));
                send_message(&socket, src, addr, args);
            }
            SOLO_FLAGS_ADDR => {
                let r = rack.lock().unwrap();
                let mut args = ids(&r);
                args.extend(r.solo.iter().map(|&f| OscType::Int(f)));
                send_message(&socket, src, addr, args);
            }
            SELECTED_CHAIN_ADDR => {
                let r = rack.lock().unwrap();
                let mut args = ids(&r);
                args.push(OscType::Int(r.selected));
                send_message(&socket, src, addr, args);
            }
            SET_DEVICES_ENABLED_ADDR => {
                let mut r = rack.lock().unwrap();
                let index = int_of(msg.args.get(2)) as usize;
                let value = int_of(msg.args.get(3));
                if index < r.enabled.len() {
                    r.enabled[index] = value;
                }
            }
            SET_SOLO_ADDR => {
                let mut r = rack.lock().unwrap();
                let index = int_of(msg.args.get(2)) as usize;
                let value = int_of(msg.args.get(3));
                if index < r.solo.len() {
                    r.solo[index] = value;
                }
            }
            SET_SELECTED_CHAIN_ADDR => {
                rack.lock().unwrap().selected = int_of(msg.args.get(2));
            }
            NUM_TRACKS_ADDR => {
                let count = tracks.lock().unwrap().len() as i32;
                send_message(&socket, src, addr, vec![OscType::Int(count)]);
            }
            TRACK_NAME_ADDR => {
                let tid = int_of(msg.args.first());
                let name = tracks
                    .lock()
                    .unwrap()
                    .get(tid as usize)
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                send_message(
                    &socket,
                    src,
                    addr,
                    vec![OscType::Int(tid), OscType::String(name)],
                );
            }
            CAN_HAVE_CHAINS_ADDR => {
                let tid = int_of(msg.args.first());
                let mut args = vec![OscType::Int(tid)];
                if let Some(track) = tracks.lock().unwrap().get(tid as usize) {
                    args.extend(track.devices.iter().map(|(_, c)| OscType::Bool(*c)));
                }
                send_message(&socket, src, addr, args);
            }
            DEVICE_NAMES_ADDR => {
                let tid = int_of(msg.args.first());
                let mut args = vec![OscType::Int(tid)];
                if let Some(track) = tracks.lock().unwrap().get(tid as usize) {
                    args.extend(
                        track
                            .devices
                            .iter()
                            .map(|(n, _)| OscType::String(n.clone())),
                    );
                }
                send_message(&socket, src, addr, args);
            }
            _ => {}
        }
    }
}

fn ids(rack: &PeerRack) -> Vec<OscType> {
    vec![OscType::Int(rack.track_id), OscType::Int(rack.device_id)]
}

fn int_of(arg: Option<&OscType>) -> i32 {
    match arg {
        Some(OscType::Int(v)) => *v,
        Some(OscType::Bool(v)) => i32::from(*v),
        _ => 0,
    }
}

fn send_message(socket: &UdpSocket, to: SocketAddr, addr: &str, args: Vec<OscType>) {
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    let buf = rosc::encoder::encode(&packet).unwrap();
    let _ = socket.send_to(&buf, to);
}

pub fn fast_timing() -> Timing {
    Timing {
        heartbeat: Duration::from_millis(50),
        watchdog: Duration::from_millis(300),
        request: Duration::from_millis(300),
    }
}

pub fn client_for(port: u16) -> OscClient {
    OscClient::new("127.0.0.1", port, 0).with_timing(fast_timing())
}

/// Drive the client until it reports connected, or panic.
pub fn wait_connected(osc: &mut OscClient) {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
        osc.tick();
        osc.poll();
        if osc.status() == ConnectionStatus::Connected {
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("Timed out waiting for the client to connect");
}

/// Run the full inbound pump (tick, poll, route, manager poll) for a
/// while, the way the application loop does.
pub fn pump(
    osc: &mut OscClient,
    router: &mut OscRouter,
    manager: &mut ChainManager,
    duration: Duration,
) {
    let start = Instant::now();
    while start.elapsed() < duration {
        osc.tick();
        for msg in osc.poll() {
            router.route(&msg);
        }
        manager.poll(osc);
        thread::sleep(Duration::from_millis(5));
    }
}

/// Block until a reload's fan-out of per-chain flag commands has reached
/// the stub. The commands are fire-and-forget, so a `clear_received`
/// right after `set_rack` would otherwise race with their arrival.
pub fn wait_reload_flags(stub: &StubLive, chain_count: usize) {
    assert!(wait_until(Duration::from_secs(2), || {
        stub.received_on(SET_DEVICES_ENABLED_ADDR).len() >= chain_count
            && stub.received_on(SET_SOLO_ADDR).len() >= chain_count
    }));
}

/// Wait until `cond` holds or the deadline passes.
pub fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}
