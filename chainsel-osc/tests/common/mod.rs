#![allow(dead_code)]
//! Test harness utilities for chainsel-osc integration tests.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rosc::{OscMessage, OscPacket, OscType};

use chainsel_osc::{OscClient, LISTEN_ADDR, TEST_ADDR};

/// A stub peer on an ephemeral UDP port.
///
/// Answers liveness probes while `answering` is set, echoes canned
/// replies for registered query addresses, and records everything it
/// receives.
pub struct StubPeer {
    pub port: u16,
    received: Arc<Mutex<Vec<OscMessage>>>,
    replies: Arc<Mutex<HashMap<String, Vec<OscType>>>>,
    answering: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    _thread: JoinHandle<()>,
}

impl StubPeer {
    pub fn spawn() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();

        let received = Arc::new(Mutex::new(Vec::new()));
        let replies = Arc::new(Mutex::new(HashMap::new()));
        let answering = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(AtomicBool::new(false));

        let recv_log = Arc::clone(&received);
        let reply_table: Arc<Mutex<HashMap<String, Vec<OscType>>>> = Arc::clone(&replies);
        let answer_flag = Arc::clone(&answering);
        let stop_flag = Arc::clone(&stop);
        let thread = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                let (n, src) = match socket.recv_from(&mut buf) {
                    Ok(pair) => pair,
                    Err(_) => continue,
                };
                let Ok((_, OscPacket::Message(msg))) = rosc::decoder::decode_udp(&buf[..n]) else {
                    continue;
                };
                recv_log.lock().unwrap().push(msg.clone());

                if answer_flag.load(Ordering::Relaxed)
                    && (msg.addr == LISTEN_ADDR || msg.addr == TEST_ADDR)
                {
                    reply(&socket, src, &msg.addr, vec![OscType::Int(1)]);
                }
                let canned = reply_table.lock().unwrap().get(&msg.addr).cloned();
                if let Some(args) = canned {
                    reply(&socket, src, &msg.addr, args);
                }
            }
        });

        Self {
            port,
            received,
            replies,
            answering,
            stop,
            _thread: thread,
        }
    }

    /// Echo `args` back on `addr` whenever a message arrives on it.
    pub fn set_reply(&self, addr: &str, args: Vec<OscType>) {
        self.replies
            .lock()
            .unwrap()
            .insert(addr.to_string(), args);
    }

    /// Toggle liveness replies (a "dead" peer still records traffic).
    pub fn set_answering(&self, on: bool) {
        self.answering.store(on, Ordering::Relaxed);
    }

    pub fn received_count(&self, addr: &str) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.addr == addr)
            .count()
    }

    pub fn first_received(&self) -> Option<OscMessage> {
        self.received.lock().unwrap().first().cloned()
    }

    pub fn last_received(&self, addr: &str) -> Option<OscMessage> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.addr == addr)
            .cloned()
    }
}

impl Drop for StubPeer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn reply(socket: &UdpSocket, to: SocketAddr, addr: &str, args: Vec<OscType>) {
    let packet = OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    });
    let buf = rosc::encoder::encode(&packet).unwrap();
    let _ = socket.send_to(&buf, to);
}

/// Tick and poll the client until `done` holds or the deadline passes.
/// Returns whether the condition was met.
pub fn pump_until<F>(client: &mut OscClient, timeout: Duration, mut done: F) -> bool
where
    F: FnMut(&mut OscClient) -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        client.tick();
        client.poll();
        if done(client) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Wait until `cond` holds or the deadline passes, without driving a client.
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
