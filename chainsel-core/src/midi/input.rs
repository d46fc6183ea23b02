//! MIDI input via midir.
//!
//! Hardware events arrive on midir's callback thread and are forwarded
//! into a channel the main loop drains.

use std::sync::mpsc::{self, Receiver};

use log::info;
use midir::{MidiInput, MidiInputConnection};

/// Decoded MIDI messages this application reacts to. Anything else on
/// the wire is dropped at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

/// An available MIDI input port.
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// Owns the midir connection and the event channel.
pub struct MidiInputManager {
    midi_in: Option<MidiInput>,
    connection: Option<MidiInputConnection<()>>,
    event_rx: Option<Receiver<MidiMessage>>,
    connected_port_name: Option<String>,
    available_ports: Vec<MidiPortInfo>,
}

impl MidiInputManager {
    pub fn new() -> Self {
        let midi_in = MidiInput::new("chainsel").ok();
        Self {
            midi_in,
            connection: None,
            event_rx: None,
            connected_port_name: None,
            available_ports: Vec::new(),
        }
    }

    /// Refresh the list of available input ports.
    pub fn refresh_ports(&mut self) {
        self.available_ports.clear();
        if let Some(midi_in) = &self.midi_in {
            for (index, port) in midi_in.ports().iter().enumerate() {
                if let Ok(name) = midi_in.port_name(port) {
                    self.available_ports.push(MidiPortInfo { index, name });
                }
            }
        }
    }

    pub fn list_ports(&self) -> &[MidiPortInfo] {
        &self.available_ports
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    /// Connect to an input port by index. Any existing connection is
    /// closed first.
    pub fn connect(&mut self, port_index: usize) -> Result<(), String> {
        self.disconnect();

        // midir consumes the MidiInput on connect; build a fresh one.
        let midi_in = MidiInput::new("chainsel").map_err(|e| e.to_string())?;
        let ports = midi_in.ports();
        if port_index >= ports.len() {
            return Err(format!("invalid port index: {}", port_index));
        }
        let port = &ports[port_index];
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let (tx, rx) = mpsc::channel();
        let connection = midi_in
            .connect(
                port,
                "chainsel-input",
                move |_timestamp, message, _| {
                    if let Some(msg) = parse_midi_message(message) {
                        let _ = tx.send(msg);
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        info!(target: "midi", "connected to input port: {}", port_name);
        self.connection = Some(connection);
        self.event_rx = Some(rx);
        self.connected_port_name = Some(port_name);
        self.midi_in = MidiInput::new("chainsel").ok();
        Ok(())
    }

    /// Connect to an input port by name, the persisted form.
    pub fn connect_by_name(&mut self, name: &str) -> Result<(), String> {
        self.refresh_ports();
        let index = self
            .available_ports
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.index)
            .ok_or_else(|| format!("no MIDI input port named '{}'", name))?;
        self.connect(index)
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.event_rx = None;
        self.connected_port_name = None;
    }

    /// Drain pending events (non-blocking).
    pub fn poll_events(&self) -> Vec<MidiMessage> {
        let mut events = Vec::new();
        if let Some(rx) = &self.event_rx {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }
}

impl Default for MidiInputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Parse a raw MIDI message. Note-on with velocity 0 is a note-off.
pub fn parse_midi_message(data: &[u8]) -> Option<MidiMessage> {
    if data.len() < 3 {
        return None;
    }
    let status = data[0];
    let channel = status & 0x0F;
    match status & 0xF0 {
        0x80 => Some(MidiMessage::NoteOff {
            channel,
            note: data[1],
        }),
        0x90 => {
            if data[2] == 0 {
                Some(MidiMessage::NoteOff {
                    channel,
                    note: data[1],
                })
            } else {
                Some(MidiMessage::NoteOn {
                    channel,
                    note: data[1],
                    velocity: data[2],
                })
            }
        }
        0xB0 => Some(MidiMessage::ControlChange {
            channel,
            controller: data[1],
            value: data[2],
        }),
        _ => None,
    }
}
