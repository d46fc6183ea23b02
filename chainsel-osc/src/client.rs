//! Bidirectional UDP OSC client.
//!
//! Sends commands to the peer's receive port and listens for replies and
//! notifications on its own port. UDP gives no connection events, so
//! liveness is detected with a heartbeat: the registration message is
//! re-sent periodically and a watchdog trips when the peer stops
//! answering.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};
use rosc::{OscMessage, OscPacket, OscType};

use chainsel_types::ConnectionStatus;

/// Liveness probe address. Replies count toward liveness.
pub const TEST_ADDR: &str = "/live/test";
/// Registration address; the single argument is this client's receive
/// port, so the peer can address notifications back to it.
pub const LISTEN_ADDR: &str = "/live/api/listen";
/// Polite unregistration on disconnect.
pub const UNLISTEN_ADDR: &str = "/live/api/unlisten";

pub const DEFAULT_SEND_PORT: u16 = 11000;
pub const DEFAULT_RECEIVE_PORT: u16 = 11002;

/// Protocol timing. Production uses the defaults; tests shorten them.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// Interval between heartbeat re-registrations.
    pub heartbeat: Duration,
    /// Silence longer than this while connected trips the watchdog.
    pub watchdog: Duration,
    /// Deadline for a correlated request reply.
    pub request: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(5),
            watchdog: Duration::from_secs(10),
            request: Duration::from_secs(5),
        }
    }
}

/// Failure of a correlated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// No reply with a matching address arrived before the deadline.
    Timeout { address: String },
    /// The socket is not open.
    NotConnected,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Timeout { address } => write!(f, "request timed out: {}", address),
            RequestError::NotConnected => write!(f, "socket is not open"),
        }
    }
}

impl std::error::Error for RequestError {}

/// UDP OSC client with heartbeat liveness.
///
/// Requests are correlated by address only: the first inbound message
/// whose address equals the request's resolves it. Callers must not run
/// two concurrent requests to the same address; replies for other
/// addresses are buffered for `poll`, never dropped.
pub struct OscClient {
    send_host: String,
    send_port: u16,
    receive_port: u16,
    bound_port: u16,
    timing: Timing,
    socket: Option<UdpSocket>,
    inbound: Option<Receiver<OscMessage>>,
    pending: VecDeque<OscMessage>,
    status: ConnectionStatus,
    registered: bool,
    last_seen: Option<Instant>,
    last_beat: Option<Instant>,
    status_subs: Vec<Sender<ConnectionStatus>>,
    stop: Option<Arc<AtomicBool>>,
    recv_thread: Option<JoinHandle<()>>,
}

impl OscClient {
    pub fn new(send_host: &str, send_port: u16, receive_port: u16) -> Self {
        Self {
            send_host: send_host.to_string(),
            send_port,
            receive_port,
            bound_port: receive_port,
            timing: Timing::default(),
            socket: None,
            inbound: None,
            pending: VecDeque::new(),
            status: ConnectionStatus::Disconnected,
            registered: false,
            last_seen: None,
            last_beat: None,
            status_subs: Vec::new(),
            stop: None,
            recv_thread: None,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// The port replies should be addressed to. After `connect` this is
    /// the actually bound port, which matters when configured as 0.
    pub fn receive_port(&self) -> u16 {
        self.bound_port
    }

    /// Typed status-change subscription. Dead receivers are pruned on
    /// the next emit.
    pub fn subscribe_status(&mut self) -> Receiver<ConnectionStatus> {
        let (tx, rx) = mpsc::channel();
        self.status_subs.push(tx);
        rx
    }

    /// Open the socket, register with the peer, and start the heartbeat.
    /// An existing session is torn down first.
    pub fn connect(&mut self) -> io::Result<()> {
        if self.socket.is_some() {
            self.disconnect();
        }
        self.set_status(ConnectionStatus::Connecting);

        let opened = (|| {
            let socket = UdpSocket::bind(("0.0.0.0", self.receive_port))?;
            let bound = socket.local_addr()?.port();
            let reader = socket.try_clone()?;
            reader.set_read_timeout(Some(Duration::from_millis(50)))?;
            Ok::<_, io::Error>((socket, reader, bound))
        })();
        let (socket, reader, bound) = match opened {
            Ok(parts) => parts,
            Err(e) => {
                self.set_status(ConnectionStatus::Disconnected);
                return Err(e);
            }
        };
        self.bound_port = bound;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                match reader.recv(&mut buf) {
                    Ok(n) => {
                        if let Ok((_, packet)) = rosc::decoder::decode_udp(&buf[..n]) {
                            forward_packet(packet, &tx);
                        }
                    }
                    Err(ref e)
                        if e.kind() == io::ErrorKind::WouldBlock
                            || e.kind() == io::ErrorKind::TimedOut =>
                    {
                        continue
                    }
                    Err(_) => break,
                }
            }
        });

        self.socket = Some(socket);
        self.inbound = Some(rx);
        self.stop = Some(stop);
        self.recv_thread = Some(handle);
        self.registered = false;
        self.last_seen = None;

        info!(
            target: "osc",
            "listening on port {}, sending to {}:{}",
            self.bound_port, self.send_host, self.send_port
        );

        self.send_registration();
        self.last_beat = Some(Instant::now());
        Ok(())
    }

    /// Unregister, stop the heartbeat, and close the socket. Safe to
    /// call when already disconnected.
    pub fn disconnect(&mut self) {
        if self.registered {
            self.send(UNLISTEN_ADDR, vec![OscType::Int(i32::from(self.bound_port))]);
        }
        self.registered = false;
        self.last_beat = None;
        self.last_seen = None;
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Relaxed);
        }
        self.socket = None;
        self.inbound = None;
        // Join the reader so its socket clone releases the port before a
        // reconnect tries to bind it again.
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
        }
        self.pending.clear();
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Fire-and-forget send. A closed socket is a silent no-op: callers
    /// cannot tell "not yet connected" from a dropped datagram anyway.
    pub fn send(&self, address: &str, args: Vec<OscType>) {
        let Some(socket) = &self.socket else {
            return;
        };
        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args,
        });
        match rosc::encoder::encode(&packet) {
            Ok(buf) => {
                if let Err(e) = socket.send_to(&buf, (self.send_host.as_str(), self.send_port)) {
                    warn!(target: "osc", "send {} failed: {}", address, e);
                }
            }
            Err(e) => warn!(target: "osc", "encode {} failed: {}", address, e),
        }
    }

    /// Send, then wait for the next inbound message with the same
    /// address.
    pub fn request(
        &mut self,
        address: &str,
        args: Vec<OscType>,
    ) -> Result<OscMessage, RequestError> {
        if self.socket.is_none() {
            return Err(RequestError::NotConnected);
        }
        self.send(address, args);
        self.wait_for(address)
    }

    /// Wait for the next inbound message whose address matches exactly.
    ///
    /// The waiting half of `request`: a caller may fire several
    /// distinct-address queries with `send` and then collect each reply
    /// here in any order. Non-matching messages are buffered for `poll`.
    pub fn wait_for(&mut self, address: &str) -> Result<OscMessage, RequestError> {
        if let Some(pos) = self.pending.iter().position(|m| m.addr == address) {
            if let Some(msg) = self.pending.remove(pos) {
                return Ok(msg);
            }
        }
        let deadline = Instant::now() + self.timing.request;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RequestError::Timeout {
                    address: address.to_string(),
                });
            }
            let received = match &self.inbound {
                Some(rx) => match rx.recv_timeout(remaining) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(RequestError::Timeout {
                            address: address.to_string(),
                        })
                    }
                    Err(RecvTimeoutError::Disconnected) => return Err(RequestError::NotConnected),
                },
                None => return Err(RequestError::NotConnected),
            };
            self.note_liveness(&received);
            if received.addr == address {
                return Ok(received);
            }
            self.pending.push_back(received);
        }
    }

    /// Drain buffered and newly received messages for routing. Liveness
    /// bookkeeping happens as messages are first pulled off the socket.
    pub fn poll(&mut self) -> Vec<OscMessage> {
        let mut out: Vec<OscMessage> = self.pending.drain(..).collect();
        loop {
            let next = match &self.inbound {
                Some(rx) => rx.try_recv().ok(),
                None => None,
            };
            match next {
                Some(msg) => {
                    self.note_liveness(&msg);
                    out.push(msg);
                }
                None => break,
            }
        }
        out
    }

    /// Drive the heartbeat and the liveness watchdog. Call once per
    /// event-loop turn.
    pub fn tick(&mut self) {
        if self.socket.is_none() {
            return;
        }
        if self.status == ConnectionStatus::Connected {
            if let Some(seen) = self.last_seen {
                if seen.elapsed() > self.timing.watchdog {
                    warn!(target: "osc", "no liveness reply for {:?}, peer lost", self.timing.watchdog);
                    self.registered = false;
                    self.last_seen = None;
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }
        }
        let due = self
            .last_beat
            .map_or(true, |t| t.elapsed() >= self.timing.heartbeat);
        if due {
            self.send_registration();
            self.last_beat = Some(Instant::now());
        }
    }

    /// The registration message doubles as the liveness probe.
    fn send_registration(&mut self) {
        self.send(LISTEN_ADDR, vec![OscType::Int(i32::from(self.bound_port))]);
    }

    fn note_liveness(&mut self, msg: &OscMessage) {
        if msg.addr == LISTEN_ADDR || msg.addr == TEST_ADDR {
            self.last_seen = Some(Instant::now());
            self.registered = true;
            if self.status != ConnectionStatus::Connected {
                self.set_status(ConnectionStatus::Connected);
            }
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        info!(target: "osc", "connection status: {:?}", status);
        self.status_subs.retain(|tx| tx.send(status).is_ok());
    }
}

impl Drop for OscClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Flatten a packet into its component messages, bundles included.
fn forward_packet(packet: OscPacket, tx: &Sender<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => {
            let _ = tx.send(msg);
        }
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                forward_packet(inner, tx);
            }
        }
    }
}
